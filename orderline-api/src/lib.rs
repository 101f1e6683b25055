//! orderline API - Order Ingestion Service
//!
//! Consumes order messages from a stream, writes each order transactionally
//! to PostgreSQL and serves lookups over HTTP from a process-wide cache that
//! is warmed at startup and filled by write-through and read-through.
//!
//! Startup order:
//! 1. Warm the cache from the store (failure is logged, not fatal).
//! 2. Connect the ingestion store with bounded retry (exhaustion is fatal).
//! 3. Serve HTTP and run the consumer loop side by side.

pub mod config;
pub mod consumer;
pub mod db;
pub mod error;
pub mod ingest;
pub mod query;
pub mod routes;
pub mod state;
pub mod stream;
pub mod telemetry;

pub use config::{DbConfig, ServiceConfig, StreamConfig};
pub use consumer::{ConsumerState, ConsumerStats, MessageConsumer};
pub use db::{PgConnector, PgStore};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use ingest::OrderIngestor;
pub use query::{OrderLookup, QueryService};
pub use routes::create_router;
pub use state::AppState;
pub use stream::{MessageSource, StreamMessage};
