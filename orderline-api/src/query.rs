//! Cache-first order lookup with read-through on miss.

use std::sync::Arc;

use async_trait::async_trait;
use orderline_core::{Order, OrderResult};
use orderline_storage::{ConnectionManager, Connector, OrderCache, OrderStore, Sleeper, TokioSleeper};

use crate::telemetry::metrics::with_metrics;

/// Lookup by order id, as seen by the HTTP layer.
#[async_trait]
pub trait OrderLookup: Send + Sync {
    /// `Ok(None)` when no order with this id exists.
    async fn get_order(&self, order_uid: &str) -> OrderResult<Option<Arc<Order>>>;
}

/// Serves orders from the cache, falling back to a fresh store connection.
pub struct QueryService<C, S = TokioSleeper> {
    cache: Arc<OrderCache>,
    connections: ConnectionManager<C, S>,
}

impl<C, S> QueryService<C, S>
where
    C: Connector,
    C::Conn: OrderStore,
    S: Sleeper,
{
    pub fn new(cache: Arc<OrderCache>, connections: ConnectionManager<C, S>) -> Self {
        Self { cache, connections }
    }

    /// Cached order, or the stored one read through a new connection.
    ///
    /// A found order is cached before it is returned. Absence is not cached,
    /// so an order ingested later becomes visible on the next lookup.
    pub async fn get_order(&self, order_uid: &str) -> OrderResult<Option<Arc<Order>>> {
        if let Some(order) = self.cache.get(order_uid) {
            with_metrics(|m| m.record_lookup("hit"));
            return Ok(Some(order));
        }

        let store = self.connections.connect().await?;
        let Some(order) = store.read_order(order_uid).await? else {
            with_metrics(|m| m.record_lookup("not_found"));
            tracing::debug!(order_uid = %order_uid, "Order not found");
            return Ok(None);
        };

        with_metrics(|m| m.record_lookup("miss"));
        let order = Arc::new(order);
        self.cache.put(Arc::clone(&order));
        Ok(Some(order))
    }
}

#[async_trait]
impl<C, S> OrderLookup for QueryService<C, S>
where
    C: Connector,
    C::Conn: OrderStore,
    S: Sleeper,
{
    async fn get_order(&self, order_uid: &str) -> OrderResult<Option<Arc<Order>>> {
        QueryService::get_order(self, order_uid).await
    }
}
