//! orderline Storage - Store Trait and Mock Implementation
//!
//! Defines the storage abstraction for the order aggregate, the process-wide
//! read cache, the connection retry discipline and the startup cache warmer.
//! The PostgreSQL implementation lives in orderline-api.

pub mod cache;
pub mod connect;
pub mod reconnect;
pub mod warmer;

#[cfg(test)]
pub(crate) mod test_fixtures;

pub use cache::OrderCache;
pub use connect::{ConnectionManager, Connector, RecordingSleeper, Sleeper, TokioSleeper};
pub use reconnect::ReconnectingStore;
pub use warmer::{CacheWarmer, WarmReport};

use async_trait::async_trait;
use orderline_core::{
    Delivery, Item, Order, OrderId, Payment, StoreError, StoreResult, WriteStage,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

// ============================================================================
// STORE TRAIT
// ============================================================================

/// Relational store for order aggregates.
///
/// Implementations must write an aggregate all-or-nothing: either the order
/// row and every delivery, payment, item and association row become visible
/// together, or none of them do.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist a new order in a single transaction.
    ///
    /// A second write for an existing `order_uid` fails with
    /// [`StoreError::DuplicateOrder`].
    async fn write_order(&self, order: &Order) -> StoreResult<OrderId>;

    /// Read the fully assembled order, `None` when no order row matches.
    async fn read_order(&self, order_uid: &str) -> StoreResult<Option<Order>>;

    /// Identifiers of every stored order.
    async fn list_order_ids(&self) -> StoreResult<Vec<OrderId>>;
}

#[async_trait]
impl<T: OrderStore + ?Sized> OrderStore for Arc<T> {
    async fn write_order(&self, order: &Order) -> StoreResult<OrderId> {
        (**self).write_order(order).await
    }

    async fn read_order(&self, order_uid: &str) -> StoreResult<Option<Order>> {
        (**self).read_order(order_uid).await
    }

    async fn list_order_ids(&self) -> StoreResult<Vec<OrderId>> {
        (**self).list_order_ids().await
    }
}

// ============================================================================
// MOCK STORE
// ============================================================================

/// Order row as the store keeps it: header fields plus surrogate references.
#[derive(Debug, Clone)]
struct OrderRow {
    header: Order,
    delivery_id: i64,
    payment_id: i64,
}

#[derive(Debug, Default)]
struct MockState {
    orders: HashMap<OrderId, OrderRow>,
    deliveries: HashMap<i64, Delivery>,
    payments: HashMap<i64, Payment>,
    items: HashMap<i64, Item>,
    order_items: Vec<(OrderId, i64)>,
    fail_write_at: Option<WriteStage>,
    fail_next_read: Option<String>,
    disconnect_next_write: bool,
}

/// Rows produced by one write, applied to the state only on commit.
#[derive(Default)]
struct Staged {
    deliveries: Vec<(i64, Delivery)>,
    payments: Vec<(i64, Payment)>,
    items: Vec<(i64, Item)>,
    order_items: Vec<(OrderId, i64)>,
}

/// In-memory store with the same transactional semantics as the Postgres
/// store, for tests and local runs.
///
/// Surrogate ids come from a sequence that is not rolled back, exactly like a
/// Postgres `BIGSERIAL`. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockStore {
    state: Arc<RwLock<MockState>>,
    sequence: Arc<AtomicI64>,
    write_calls: Arc<AtomicUsize>,
    read_calls: Arc<AtomicUsize>,
    list_calls: Arc<AtomicUsize>,
}

impl MockStore {
    /// Create a new mock store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next write fail when it reaches `stage`.
    pub async fn fail_next_write_at(&self, stage: WriteStage) {
        self.state.write().await.fail_write_at = Some(stage);
    }

    /// Make the next write fail as if the connection dropped before it began.
    pub async fn disconnect_next_write(&self) {
        self.state.write().await.disconnect_next_write = true;
    }

    /// Make the next `read_order` fail with a query error.
    pub async fn fail_next_read(&self, reason: impl Into<String>) {
        self.state.write().await.fail_next_read = Some(reason.into());
    }

    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    pub async fn delivery_count(&self) -> usize {
        self.state.read().await.deliveries.len()
    }

    pub async fn payment_count(&self) -> usize {
        self.state.read().await.payments.len()
    }

    pub async fn item_count(&self) -> usize {
        self.state.read().await.items.len()
    }

    pub async fn order_item_count(&self) -> usize {
        self.state.read().await.order_items.len()
    }

    /// Number of `write_order` calls so far, failed ones included.
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    /// Number of `read_order` calls so far.
    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    /// Number of `list_order_ids` calls so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn next_id(&self) -> i64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn check_fault(state: &mut MockState, order: &Order, stage: WriteStage) -> StoreResult<()> {
        if state.fail_write_at == Some(stage) {
            state.fail_write_at = None;
            return Err(StoreError::WriteFailed {
                order_uid: order.order_uid.clone(),
                stage,
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn stage_writes(
        &self,
        state: &mut MockState,
        order: &Order,
        staged: &mut Staged,
    ) -> StoreResult<OrderRow> {
        Self::check_fault(state, order, WriteStage::Begin)?;

        Self::check_fault(state, order, WriteStage::Delivery)?;
        let delivery_id = self.next_id();
        staged.deliveries.push((delivery_id, order.delivery.clone()));

        Self::check_fault(state, order, WriteStage::Payment)?;
        let payment_id = self.next_id();
        staged.payments.push((payment_id, order.payment.clone()));

        for item in &order.items {
            Self::check_fault(state, order, WriteStage::Item)?;
            let item_id = self.next_id();
            staged.items.push((item_id, item.clone()));

            Self::check_fault(state, order, WriteStage::OrderItem)?;
            staged.order_items.push((order.order_uid.clone(), item_id));
        }

        Self::check_fault(state, order, WriteStage::Order)?;
        if state.orders.contains_key(&order.order_uid) {
            return Err(StoreError::DuplicateOrder {
                order_uid: order.order_uid.clone(),
            });
        }

        Self::check_fault(state, order, WriteStage::Commit)?;

        let mut header = order.clone();
        header.items.clear();
        Ok(OrderRow {
            header,
            delivery_id,
            payment_id,
        })
    }

    fn assemble(state: &MockState, row: &OrderRow) -> StoreResult<Order> {
        let corrupt = |reason: &str| StoreError::CorruptRow {
            order_uid: row.header.order_uid.clone(),
            reason: reason.to_string(),
        };

        let mut order = row.header.clone();
        order.delivery = state
            .deliveries
            .get(&row.delivery_id)
            .cloned()
            .ok_or_else(|| corrupt("delivery row missing"))?;
        order.payment = state
            .payments
            .get(&row.payment_id)
            .cloned()
            .ok_or_else(|| corrupt("payment row missing"))?;

        let mut item_ids: Vec<i64> = state
            .order_items
            .iter()
            .filter(|(uid, _)| *uid == order.order_uid)
            .map(|(_, id)| *id)
            .collect();
        item_ids.sort_unstable();

        order.items = item_ids
            .iter()
            .map(|id| {
                state
                    .items
                    .get(id)
                    .cloned()
                    .ok_or_else(|| corrupt("item row missing"))
            })
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(order)
    }
}

#[async_trait]
impl OrderStore for MockStore {
    async fn write_order(&self, order: &Order) -> StoreResult<OrderId> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);

        // Holding the write lock for the whole write makes it serializable.
        let mut state = self.state.write().await;
        if std::mem::take(&mut state.disconnect_next_write) {
            return Err(StoreError::ConnectFailed {
                attempts: 1,
                reason: "connection closed".to_string(),
            });
        }

        let mut staged = Staged::default();
        let row = self.stage_writes(&mut state, order, &mut staged)?;

        state.deliveries.extend(staged.deliveries);
        state.payments.extend(staged.payments);
        state.items.extend(staged.items);
        state.order_items.extend(staged.order_items);
        state.orders.insert(order.order_uid.clone(), row);

        Ok(order.order_uid.clone())
    }

    async fn read_order(&self, order_uid: &str) -> StoreResult<Option<Order>> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.write().await;
        if let Some(reason) = state.fail_next_read.take() {
            return Err(StoreError::QueryFailed { reason });
        }

        match state.orders.get(order_uid) {
            Some(row) => Self::assemble(&state, row).map(Some),
            None => Ok(None),
        }
    }

    async fn list_order_ids(&self) -> StoreResult<Vec<OrderId>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let state = self.state.read().await;
        let mut ids: Vec<OrderId> = state.orders.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

// ============================================================================
// MOCK CONNECTOR
// ============================================================================

/// Connector handing out [`MockStore`] handles, scriptable to fail.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    store: MockStore,
    failing_opens: Arc<AtomicU32>,
    failing_pings: Arc<AtomicU32>,
    closed_checks: Arc<AtomicU32>,
    opens: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new(store: MockStore) -> Self {
        Self {
            store,
            ..Default::default()
        }
    }

    /// The next `n` opens fail.
    pub fn fail_opens(&self, n: u32) {
        self.failing_opens.store(n, Ordering::SeqCst);
    }

    /// The next `n` liveness checks fail.
    pub fn fail_pings(&self, n: u32) {
        self.failing_pings.store(n, Ordering::SeqCst);
    }

    /// The next liveness check of a handed-out connection reports it closed.
    pub fn drop_connection(&self) {
        self.closed_checks.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of open attempts so far.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn store(&self) -> &MockStore {
        &self.store
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Conn = MockStore;

    async fn open(&self) -> StoreResult<MockStore> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.failing_opens) {
            return Err(StoreError::ConnectFailed {
                attempts: 1,
                reason: "connection refused".to_string(),
            });
        }
        Ok(self.store.clone())
    }

    async fn ping(&self, _conn: &MockStore) -> StoreResult<()> {
        if Self::take_failure(&self.failing_pings) {
            return Err(StoreError::ConnectFailed {
                attempts: 1,
                reason: "ping failed".to_string(),
            });
        }
        Ok(())
    }

    async fn is_closed(&self, _conn: &MockStore) -> bool {
        Self::take_failure(&self.closed_checks)
    }
}

// ============================================================================
// TESTS
// ============================================================================
