//! orderline Core - Order Aggregate Types
//!
//! Pure data structures shared by every other crate in the workspace:
//! the order aggregate, payload decoding, the error taxonomy and the
//! connection retry policy. No I/O happens here.

pub mod config;
pub mod decode;
pub mod error;
pub mod model;

pub use config::RetryPolicy;
pub use decode::{decode_order, normalize_timestamp};
pub use error::{
    ConfigError, DecodeError, OrderError, OrderResult, StoreError, StoreResult, StreamError,
    StreamResult, WriteStage,
};
pub use model::{Delivery, Item, Order, OrderId, Payment, Timestamp};
