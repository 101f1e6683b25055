//! PostgreSQL Order Store
//!
//! [`PgStore`] owns a single `tokio_postgres` connection; connections are not
//! pooled. The ingestion path keeps one store for its lifetime, the query path
//! opens a fresh one per cache miss through [`PgConnector`].
//!
//! Schema: `sql/schema.sql`.

use std::error::Error as _;
use std::io;

use async_trait::async_trait;
use orderline_core::{
    normalize_timestamp, Delivery, Item, Order, OrderId, Payment, StoreError, StoreResult,
    Timestamp, WriteStage,
};
use orderline_storage::{Connector, OrderStore};
use tokio::sync::Mutex;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::{FromSql, Json};
use tokio_postgres::{Client, NoTls, Row, Transaction};

use crate::config::DbConfig;

// ============================================================================
// SQL
// ============================================================================

const INSERT_DELIVERY: &str = "\
    INSERT INTO delivery (name, phone, zip, city, address, region, email) \
    VALUES ($1, $2, $3, $4, $5, $6, $7) \
    RETURNING id";

const INSERT_PAYMENT: &str = "\
    INSERT INTO payment (transaction, request_id, currency, provider, amount, payment_dt, \
                         bank, delivery_cost, goods_total, custom_fee) \
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
    RETURNING id";

const INSERT_ITEM: &str = "\
    INSERT INTO items (chrt_id, track_number, price, rid, name, sale, size, total_price, \
                       nm_id, brand, status) \
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
    RETURNING id";

const INSERT_ORDER_ITEM: &str = "INSERT INTO orders_items (order_uid, item_id) VALUES ($1, $2)";

const INSERT_ORDER: &str = "\
    INSERT INTO orders (order_uid, track_number, entry, delivery_id, payment_id, locale, \
                        internal_signature, customer_id, delivery_service, shardkey, sm_id, \
                        date_created, oof_shard) \
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)";

/// One round trip: header, delivery, payment and the item set as a JSON
/// array ordered by item id (`[]` when the order has no items).
const SELECT_ORDER: &str = "\
    SELECT o.order_uid, o.track_number, o.entry, o.locale, o.internal_signature, \
           o.customer_id, o.delivery_service, o.shardkey, o.sm_id, o.date_created, o.oof_shard, \
           d.name AS d_name, d.phone AS d_phone, d.zip AS d_zip, d.city AS d_city, \
           d.address AS d_address, d.region AS d_region, d.email AS d_email, \
           p.transaction AS p_transaction, p.request_id AS p_request_id, \
           p.currency AS p_currency, p.provider AS p_provider, p.amount AS p_amount, \
           p.payment_dt AS p_payment_dt, p.bank AS p_bank, p.delivery_cost AS p_delivery_cost, \
           p.goods_total AS p_goods_total, p.custom_fee AS p_custom_fee, \
           COALESCE(( \
               SELECT json_agg(json_build_object( \
                   'chrt_id', i.chrt_id, 'track_number', i.track_number, 'price', i.price, \
                   'rid', i.rid, 'name', i.name, 'sale', i.sale, 'size', i.size, \
                   'total_price', i.total_price, 'nm_id', i.nm_id, 'brand', i.brand, \
                   'status', i.status) ORDER BY i.id) \
               FROM orders_items oi \
               JOIN items i ON i.id = oi.item_id \
               WHERE oi.order_uid = o.order_uid \
           ), '[]'::json) AS items \
    FROM orders o \
    JOIN delivery d ON d.id = o.delivery_id \
    JOIN payment p ON p.id = o.payment_id \
    WHERE o.order_uid = $1";

const LIST_ORDER_IDS: &str = "SELECT order_uid FROM orders ORDER BY order_uid";

/// Table definitions. Every statement is `IF NOT EXISTS`.
pub const SCHEMA: &str = include_str!("../sql/schema.sql");

// ============================================================================
// STORE
// ============================================================================

/// Order store over one owned PostgreSQL connection.
pub struct PgStore {
    client: Mutex<Client>,
}

impl PgStore {
    pub fn new(client: Client) -> Self {
        Self {
            client: Mutex::new(client),
        }
    }

    /// Liveness check.
    pub async fn ping(&self) -> StoreResult<()> {
        self.client
            .lock()
            .await
            .simple_query("SELECT 1")
            .await
            .map(|_| ())
            .map_err(|e| StoreError::ConnectFailed {
                attempts: 1,
                reason: format!("ping failed: {}", e),
            })
    }

    /// True once the connection driver has stopped.
    pub async fn is_closed(&self) -> bool {
        self.client.lock().await.is_closed()
    }

    /// Server process id of this connection.
    pub async fn backend_pid(&self) -> StoreResult<i32> {
        self.client
            .lock()
            .await
            .query_one("SELECT pg_backend_pid()", &[])
            .await
            .and_then(|row| row.try_get(0))
            .map_err(query_failed)
    }

    /// Create the tables if they are missing.
    pub async fn apply_schema(&self) -> StoreResult<()> {
        self.client
            .lock()
            .await
            .batch_execute(SCHEMA)
            .await
            .map_err(query_failed)
    }

    async fn insert_rows(tx: &Transaction<'_>, order: &Order) -> StoreResult<()> {
        let uid = order.order_uid.as_str();
        let fail = |stage: WriteStage| {
            move |e: tokio_postgres::Error| write_failed(uid, stage, e)
        };

        let d = &order.delivery;
        let delivery_id: i64 = tx
            .query_one(
                INSERT_DELIVERY,
                &[&d.name, &d.phone, &d.zip, &d.city, &d.address, &d.region, &d.email],
            )
            .await
            .and_then(|row| row.try_get(0))
            .map_err(fail(WriteStage::Delivery))?;

        let p = &order.payment;
        let payment_id: i64 = tx
            .query_one(
                INSERT_PAYMENT,
                &[
                    &p.transaction,
                    &p.request_id,
                    &p.currency,
                    &p.provider,
                    &p.amount,
                    &p.payment_dt,
                    &p.bank,
                    &p.delivery_cost,
                    &p.goods_total,
                    &p.custom_fee,
                ],
            )
            .await
            .and_then(|row| row.try_get(0))
            .map_err(fail(WriteStage::Payment))?;

        for item in &order.items {
            let item_id: i64 = tx
                .query_one(
                    INSERT_ITEM,
                    &[
                        &item.chrt_id,
                        &item.track_number,
                        &item.price,
                        &item.rid,
                        &item.name,
                        &item.sale,
                        &item.size,
                        &item.total_price,
                        &item.nm_id,
                        &item.brand,
                        &item.status,
                    ],
                )
                .await
                .and_then(|row| row.try_get(0))
                .map_err(fail(WriteStage::Item))?;

            tx.execute(INSERT_ORDER_ITEM, &[&order.order_uid, &item_id])
                .await
                .map_err(fail(WriteStage::OrderItem))?;
        }

        tx.execute(
            INSERT_ORDER,
            &[
                &order.order_uid,
                &order.track_number,
                &order.entry,
                &delivery_id,
                &payment_id,
                &order.locale,
                &order.internal_signature,
                &order.customer_id,
                &order.delivery_service,
                &order.shardkey,
                &order.sm_id,
                &order.date_created,
                &order.oof_shard,
            ],
        )
        .await
        .map_err(fail(WriteStage::Order))?;

        Ok(())
    }
}

/// The connection itself is gone, as opposed to a statement failing on it.
fn is_connection_error(err: &tokio_postgres::Error) -> bool {
    if err.is_closed() {
        return true;
    }
    match err.as_db_error() {
        Some(db_error) => [
            SqlState::ADMIN_SHUTDOWN,
            SqlState::CRASH_SHUTDOWN,
            SqlState::CANNOT_CONNECT_NOW,
        ]
        .contains(db_error.code()),
        None => err
            .source()
            .is_some_and(|source| source.downcast_ref::<io::Error>().is_some()),
    }
}

fn connection_lost(err: tokio_postgres::Error) -> StoreError {
    StoreError::ConnectFailed {
        attempts: 1,
        reason: format!("connection lost: {}", err),
    }
}

fn write_failed(order_uid: &str, stage: WriteStage, err: tokio_postgres::Error) -> StoreError {
    if is_connection_error(&err) {
        return connection_lost(err);
    }
    if let Some(db_error) = err.as_db_error() {
        if stage == WriteStage::Order && db_error.code() == &SqlState::UNIQUE_VIOLATION {
            return StoreError::DuplicateOrder {
                order_uid: order_uid.to_string(),
            };
        }
    }
    StoreError::WriteFailed {
        order_uid: order_uid.to_string(),
        stage,
        reason: err.to_string(),
    }
}

fn query_failed(err: tokio_postgres::Error) -> StoreError {
    if is_connection_error(&err) {
        return connection_lost(err);
    }
    StoreError::QueryFailed {
        reason: err.to_string(),
    }
}

fn column<'a, T: FromSql<'a>>(row: &'a Row, name: &str, order_uid: &str) -> StoreResult<T> {
    row.try_get(name).map_err(|e| StoreError::CorruptRow {
        order_uid: order_uid.to_string(),
        reason: format!("column {}: {}", name, e),
    })
}

fn order_from_row(row: &Row, order_uid: &str) -> StoreResult<Order> {
    let Json(items): Json<Vec<Item>> = column(row, "items", order_uid)?;
    let date_created: Timestamp = column(row, "date_created", order_uid)?;

    Ok(Order {
        order_uid: column(row, "order_uid", order_uid)?,
        track_number: column(row, "track_number", order_uid)?,
        entry: column(row, "entry", order_uid)?,
        delivery: Delivery {
            name: column(row, "d_name", order_uid)?,
            phone: column(row, "d_phone", order_uid)?,
            zip: column(row, "d_zip", order_uid)?,
            city: column(row, "d_city", order_uid)?,
            address: column(row, "d_address", order_uid)?,
            region: column(row, "d_region", order_uid)?,
            email: column(row, "d_email", order_uid)?,
        },
        payment: Payment {
            transaction: column(row, "p_transaction", order_uid)?,
            request_id: column(row, "p_request_id", order_uid)?,
            currency: column(row, "p_currency", order_uid)?,
            provider: column(row, "p_provider", order_uid)?,
            amount: column(row, "p_amount", order_uid)?,
            payment_dt: column(row, "p_payment_dt", order_uid)?,
            bank: column(row, "p_bank", order_uid)?,
            delivery_cost: column(row, "p_delivery_cost", order_uid)?,
            goods_total: column(row, "p_goods_total", order_uid)?,
            custom_fee: column(row, "p_custom_fee", order_uid)?,
        },
        items,
        locale: column(row, "locale", order_uid)?,
        internal_signature: column(row, "internal_signature", order_uid)?,
        customer_id: column(row, "customer_id", order_uid)?,
        delivery_service: column(row, "delivery_service", order_uid)?,
        shardkey: column(row, "shardkey", order_uid)?,
        sm_id: column(row, "sm_id", order_uid)?,
        date_created: normalize_timestamp(date_created),
        oof_shard: column(row, "oof_shard", order_uid)?,
    })
}

#[async_trait]
impl OrderStore for PgStore {
    async fn write_order(&self, order: &Order) -> StoreResult<OrderId> {
        let mut client = self.client.lock().await;
        let tx = client
            .transaction()
            .await
            .map_err(|e| write_failed(&order.order_uid, WriteStage::Begin, e))?;

        // Dropping the transaction on error rolls it back.
        Self::insert_rows(&tx, order).await?;

        tx.commit()
            .await
            .map_err(|e| write_failed(&order.order_uid, WriteStage::Commit, e))?;

        tracing::debug!(order_uid = %order.order_uid, items = order.items.len(), "Order written");
        Ok(order.order_uid.clone())
    }

    async fn read_order(&self, order_uid: &str) -> StoreResult<Option<Order>> {
        let row = self
            .client
            .lock()
            .await
            .query_opt(SELECT_ORDER, &[&order_uid])
            .await
            .map_err(query_failed)?;

        row.map(|row| order_from_row(&row, order_uid)).transpose()
    }

    async fn list_order_ids(&self) -> StoreResult<Vec<OrderId>> {
        let rows = self
            .client
            .lock()
            .await
            .query(LIST_ORDER_IDS, &[])
            .await
            .map_err(query_failed)?;

        rows.iter()
            .map(|row| row.try_get(0).map_err(query_failed))
            .collect()
    }
}

// ============================================================================
// CONNECTOR
// ============================================================================

/// Opens unpooled connections from a [`DbConfig`].
#[derive(Debug, Clone)]
pub struct PgConnector {
    config: tokio_postgres::Config,
}

impl PgConnector {
    pub fn new(config: &DbConfig) -> Self {
        Self {
            config: config.pg_config(),
        }
    }
}

#[async_trait]
impl Connector for PgConnector {
    type Conn = PgStore;

    async fn open(&self) -> StoreResult<PgStore> {
        let (client, connection) =
            self.config
                .connect(NoTls)
                .await
                .map_err(|e| StoreError::ConnectFailed {
                    attempts: 1,
                    reason: e.to_string(),
                })?;

        // The connection future drives the socket; it ends when the client drops.
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "Database connection error");
            }
        });

        Ok(PgStore::new(client))
    }

    async fn ping(&self, conn: &PgStore) -> StoreResult<()> {
        conn.ping().await
    }

    async fn is_closed(&self, conn: &PgStore) -> bool {
        conn.is_closed().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_aliases_do_not_collide() {
        for alias in ["d_name", "p_transaction", "p_custom_fee", "AS items"] {
            assert!(SELECT_ORDER.contains(alias), "missing {alias}");
        }
        assert!(SELECT_ORDER.contains("ORDER BY i.id"));
    }

    #[test]
    fn test_schema_defers_association_check() {
        for table in ["delivery", "payment", "items", "orders", "orders_items"] {
            assert!(SCHEMA.contains(&format!("CREATE TABLE IF NOT EXISTS {table} (")));
        }
        assert!(SCHEMA.contains("DEFERRABLE INITIALLY DEFERRED"));
    }

    #[test]
    fn test_insert_placeholders_match_columns() {
        fn placeholders(sql: &str) -> usize {
            (1..=20).filter(|n| sql.contains(&format!("${n}"))).count()
        }
        assert_eq!(placeholders(INSERT_DELIVERY), 7);
        assert_eq!(placeholders(INSERT_PAYMENT), 10);
        assert_eq!(placeholders(INSERT_ITEM), 11);
        assert_eq!(placeholders(INSERT_ORDER_ITEM), 2);
        assert_eq!(placeholders(INSERT_ORDER), 13);
    }

    #[test]
    fn test_connector_uses_configured_database() {
        let connector = PgConnector::new(&DbConfig::default());
        assert_eq!(connector.config.get_dbname(), Some("mydatabase"));
        assert_eq!(connector.config.get_user(), Some("myuser"));
    }
}
