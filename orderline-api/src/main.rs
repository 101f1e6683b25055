//! orderline Service Entry Point
//!
//! Warms the cache, connects the ingestion store, subscribes to the order
//! topic and then runs the HTTP server and the consumer loop until Ctrl-C.

use std::sync::Arc;

use orderline_api::stream::KafkaSource;
use orderline_api::telemetry::init_tracing;
use orderline_api::{
    create_router, ApiError, ApiResult, AppState, MessageConsumer, OrderIngestor, PgConnector,
    QueryService, ServiceConfig,
};
use orderline_storage::{CacheWarmer, ConnectionManager, OrderCache, ReconnectingStore};

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing()?;

    let config = ServiceConfig::from_env()
        .map_err(|e| ApiError::internal_error(format!("Invalid configuration: {}", e)))?;

    let cache = Arc::new(OrderCache::new());
    let connector = PgConnector::new(&config.db);
    let connections = ConnectionManager::new(connector.clone(), config.retry.clone());

    match connections.connect().await {
        Ok(store) => {
            if let Err(e) = CacheWarmer::new(store, Arc::clone(&cache)).warm().await {
                tracing::error!(error = %e, "Cache warm-up failed, continuing with a cold cache");
            }
        }
        Err(e) => tracing::error!(error = %e, "Cache warm-up skipped"),
    }

    let store = ReconnectingStore::connect(connections)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to connect to database: {}", e)))?;

    let source = KafkaSource::subscribe(&config.stream)
        .map_err(|e| ApiError::internal_error(format!("Failed to subscribe: {}", e)))?;
    let mut consumer =
        MessageConsumer::new(source, OrderIngestor::new(store, Arc::clone(&cache)));

    let query = QueryService::new(
        Arc::clone(&cache),
        ConnectionManager::new(connector, config.retry.clone()),
    );
    let app = create_router(AppState::new(Arc::new(query), cache));

    let addr = config.http_addr;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;
    tracing::info!(%addr, "Starting orderline HTTP server");

    tokio::select! {
        result = axum::serve(listener, app) => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        result = consumer.run_until(shutdown_signal()) => {
            let stats = result.map_err(ApiError::from)?;
            tracing::info!(?stats, "Shutting down");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
