//! Long-lived store handle that survives dropped connections.
//!
//! The ingestion path keeps one connection for its whole life. When that
//! connection is found closed, or a call fails with a connection error, the
//! handle reconnects through its [`ConnectionManager`]. A call interrupted by
//! a dropped connection is repeated once on the new connection; if
//! reconnecting exhausts the retry policy the [`StoreError::ConnectFailed`]
//! is returned to the caller.

use async_trait::async_trait;
use orderline_core::{Order, OrderId, StoreError, StoreResult};
use tokio::sync::Mutex;

use crate::connect::{ConnectionManager, Connector, Sleeper, TokioSleeper};
use crate::OrderStore;

/// [`OrderStore`] over one connection that is replaced when it drops.
pub struct ReconnectingStore<C: Connector, S = TokioSleeper> {
    connections: ConnectionManager<C, S>,
    conn: Mutex<Option<C::Conn>>,
}

impl<C, S> ReconnectingStore<C, S>
where
    C: Connector,
    C::Conn: OrderStore,
    S: Sleeper,
{
    /// Open the first connection now. Exhaustion is returned.
    pub async fn connect(connections: ConnectionManager<C, S>) -> StoreResult<Self> {
        let conn = connections.connect().await?;
        Ok(Self::with_connection(connections, conn))
    }

    /// Wrap an already open connection.
    pub fn with_connection(connections: ConnectionManager<C, S>, conn: C::Conn) -> Self {
        Self {
            connections,
            conn: Mutex::new(Some(conn)),
        }
    }

    pub fn connections(&self) -> &ConnectionManager<C, S> {
        &self.connections
    }

    /// The current connection, reopened first if it is missing or closed.
    async fn ensure_open<'a>(&self, slot: &'a mut Option<C::Conn>) -> StoreResult<&'a C::Conn> {
        let closed = match slot.as_ref() {
            Some(conn) => self.connections.connector().is_closed(conn).await,
            None => true,
        };

        if closed {
            if slot.take().is_some() {
                tracing::warn!("Store connection closed, reconnecting");
            }
            *slot = Some(self.connections.connect().await?);
            tracing::info!("Store connection re-established");
        }

        slot.as_ref().ok_or_else(|| StoreError::ConnectFailed {
            attempts: 0,
            reason: "no open connection".to_string(),
        })
    }
}

#[async_trait]
impl<C, S> OrderStore for ReconnectingStore<C, S>
where
    C: Connector,
    C::Conn: OrderStore,
    S: Sleeper,
{
    async fn write_order(&self, order: &Order) -> StoreResult<OrderId> {
        let mut slot = self.conn.lock().await;
        let conn = self.ensure_open(&mut *slot).await?;

        let result = conn.write_order(order).await;
        match result {
            Err(err) if err.is_connect_error() => {
                tracing::warn!(
                    order_uid = %order.order_uid,
                    error = %err,
                    "Connection lost during write, retrying on a new connection"
                );
                slot.take();
                let conn = self.ensure_open(&mut *slot).await?;
                conn.write_order(order).await
            }
            result => result,
        }
    }

    async fn read_order(&self, order_uid: &str) -> StoreResult<Option<Order>> {
        let mut slot = self.conn.lock().await;
        let conn = self.ensure_open(&mut *slot).await?;

        let result = conn.read_order(order_uid).await;
        match result {
            Err(err) if err.is_connect_error() => {
                tracing::warn!(order_uid = %order_uid, error = %err, "Connection lost during read");
                slot.take();
                let conn = self.ensure_open(&mut *slot).await?;
                conn.read_order(order_uid).await
            }
            result => result,
        }
    }

    async fn list_order_ids(&self) -> StoreResult<Vec<OrderId>> {
        let mut slot = self.conn.lock().await;
        let conn = self.ensure_open(&mut *slot).await?;

        let result = conn.list_order_ids().await;
        match result {
            Err(err) if err.is_connect_error() => {
                tracing::warn!(error = %err, "Connection lost during listing");
                slot.take();
                let conn = self.ensure_open(&mut *slot).await?;
                conn.list_order_ids().await
            }
            result => result,
        }
    }
}
