#![allow(dead_code)]

use std::sync::Arc;

use orderline_api::{OrderIngestor, QueryService};
use orderline_core::RetryPolicy;
use orderline_storage::{ConnectionManager, MockConnector, MockStore, OrderCache, RecordingSleeper};

/// Ingestor and query service wired to one mock store and one cache.
pub struct Harness {
    pub store: MockStore,
    pub cache: Arc<OrderCache>,
    pub ingestor: OrderIngestor<MockStore>,
    pub query: Arc<QueryService<MockConnector, RecordingSleeper>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(MockStore::new())
    }

    pub fn with_store(store: MockStore) -> Self {
        let cache = Arc::new(OrderCache::new());
        Self::with_cache(store, cache)
    }

    /// A harness sharing `store` with a fresh, empty cache: what a restarted
    /// process sees before warming.
    pub fn restarted(&self) -> Self {
        Self::with_store(self.store.clone())
    }

    fn with_cache(store: MockStore, cache: Arc<OrderCache>) -> Self {
        let connections = ConnectionManager::with_sleeper(
            MockConnector::new(store.clone()),
            RetryPolicy::default(),
            RecordingSleeper::new(),
        );
        Self {
            ingestor: OrderIngestor::new(store.clone(), Arc::clone(&cache)),
            query: Arc::new(QueryService::new(Arc::clone(&cache), connections)),
            store,
            cache,
        }
    }
}
