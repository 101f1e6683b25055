//! Startup cache warming.

use std::sync::Arc;

use orderline_core::OrderResult;

use crate::cache::OrderCache;
use crate::OrderStore;

/// Outcome of a warm-up pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarmReport {
    /// Identifiers returned by the store listing.
    pub listed: usize,
    /// Orders read and installed into the cache.
    pub loaded: usize,
    /// Listed identifiers that no longer had an order row when read.
    pub skipped: usize,
}

/// Loads every stored order into the cache once, before traffic starts.
pub struct CacheWarmer<S> {
    store: S,
    cache: Arc<OrderCache>,
}

impl<S: OrderStore> CacheWarmer<S> {
    pub fn new(store: S, cache: Arc<OrderCache>) -> Self {
        Self { store, cache }
    }

    /// Read every listed order through the store and install it.
    ///
    /// Stops at the first store error. Orders loaded before the error stay
    /// cached; the remainder is filled lazily by read-through.
    pub async fn warm(&self) -> OrderResult<WarmReport> {
        let ids = self.store.list_order_ids().await?;
        let mut report = WarmReport {
            listed: ids.len(),
            ..Default::default()
        };

        for order_uid in &ids {
            match self.store.read_order(order_uid).await? {
                Some(order) => {
                    self.cache.put(order);
                    report.loaded += 1;
                }
                None => {
                    tracing::debug!(order_uid = %order_uid, "Listed order vanished before warm read");
                    report.skipped += 1;
                }
            }
        }

        tracing::info!(
            listed = report.listed,
            loaded = report.loaded,
            skipped = report.skipped,
            "Cache warmed"
        );
        Ok(report)
    }
}
