//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use orderline_storage::OrderCache;

use crate::query::OrderLookup;

/// State shared by every route.
#[derive(Clone)]
pub struct AppState {
    /// Cache-first order lookup.
    pub lookup: Arc<dyn OrderLookup>,
    /// The process-wide cache, for health reporting.
    pub cache: Arc<OrderCache>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(lookup: Arc<dyn OrderLookup>, cache: Arc<OrderCache>) -> Self {
        Self {
            lookup,
            cache,
            start_time: Instant::now(),
        }
    }
}
