//! Process-wide order read cache.
//!
//! The cache maps an order identifier to the fully materialized aggregate.
//! It has no eviction, no expiry and no capacity bound: the working set is
//! expected to fit in memory for the life of the process, and entries only
//! ever change through a `put` of a complete order.
//!
//! Entries are stored as `Arc<Order>`. A `put` swaps the whole pointer under
//! the shard lock, so a concurrent reader gets either the previous complete
//! order or the new one, never a mix of both.

use dashmap::DashMap;
use orderline_core::{Order, OrderId};
use std::sync::Arc;

/// Concurrent in-memory cache of order aggregates.
#[derive(Debug, Default)]
pub struct OrderCache {
    entries: DashMap<OrderId, Arc<Order>>,
}

impl OrderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached order for `order_uid`, if any.
    pub fn get(&self, order_uid: &str) -> Option<Arc<Order>> {
        self.entries
            .get(order_uid)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Insert or unconditionally replace the entry keyed by the order's id.
    pub fn put(&self, order: impl Into<Arc<Order>>) {
        let order = order.into();
        self.entries.insert(order.order_uid.clone(), order);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
