//! Order ingestion: decode, persist, then publish to the cache.

use std::sync::Arc;

use orderline_core::{decode_order, Order, OrderError, OrderResult, StoreError};
use orderline_storage::{OrderCache, OrderStore};

use crate::telemetry::metrics::{with_metrics, IngestOutcome};

/// Turns raw message payloads into stored, cached orders.
pub struct OrderIngestor<S> {
    store: S,
    cache: Arc<OrderCache>,
}

impl<S: OrderStore> OrderIngestor<S> {
    pub fn new(store: S, cache: Arc<OrderCache>) -> Self {
        Self { store, cache }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Decode `payload`, write it transactionally and cache the result.
    ///
    /// The cache is touched only after the write committed, so a failed
    /// ingest never leaves an order visible. Store errors are returned as-is;
    /// there is no retry at this level.
    pub async fn ingest(&self, payload: &[u8]) -> OrderResult<Arc<Order>> {
        let order = match decode_order(payload) {
            Ok(order) => order,
            Err(err) => {
                with_metrics(|m| m.record_ingest(IngestOutcome::DecodeFailed));
                return Err(err.into());
            }
        };

        if let Err(err) = self.store.write_order(&order).await {
            let outcome = match err {
                StoreError::DuplicateOrder { .. } => IngestOutcome::Duplicate,
                _ => IngestOutcome::StoreFailed,
            };
            with_metrics(|m| m.record_ingest(outcome));
            return Err(OrderError::Store(err));
        }

        let order = Arc::new(order);
        self.cache.put(Arc::clone(&order));
        with_metrics(|m| m.record_ingest(IngestOutcome::Stored));

        tracing::info!(
            order_uid = %order.order_uid,
            items = order.items.len(),
            "Order ingested"
        );
        Ok(order)
    }
}
