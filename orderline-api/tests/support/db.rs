#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use orderline_api::{DbConfig, PgConnector, PgStore};
use orderline_core::RetryPolicy;
use orderline_storage::ConnectionManager;
use tokio_postgres::{Client, NoTls};

pub fn test_db_config() -> DbConfig {
    DbConfig::from_env().expect("Invalid DB_* environment")
}

pub fn test_connections() -> ConnectionManager<PgConnector> {
    ConnectionManager::new(PgConnector::new(&test_db_config()), RetryPolicy::default())
}

/// A connected store with the schema applied.
pub async fn test_store() -> PgStore {
    let store = test_connections()
        .connect()
        .await
        .expect("Failed to connect to test database");
    store
        .apply_schema()
        .await
        .expect("Failed to apply schema");
    store
}

/// Plain client for assertions the store does not expose.
pub async fn admin_client() -> Client {
    let (client, connection) = test_db_config()
        .pg_config()
        .connect(NoTls)
        .await
        .expect("Failed to connect admin client");
    tokio::spawn(async move {
        let _ = connection.await;
    });
    client
}

/// Kill the server process behind a connection and wait until it is gone.
pub async fn terminate_backend(pid: i32) {
    let client = admin_client().await;
    client
        .execute("SELECT pg_terminate_backend($1)", &[&pid])
        .await
        .expect("Failed to terminate backend");

    for _ in 0..100 {
        let alive: i64 = client
            .query_one("SELECT count(*) FROM pg_stat_activity WHERE pid = $1", &[&pid])
            .await
            .expect("Failed to query pg_stat_activity")
            .get(0);
        if alive == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("backend {pid} still alive");
}

/// `count(*)` for a query with one text parameter.
pub async fn count_rows(query: &str, value: &str) -> i64 {
    admin_client()
        .await
        .query_one(query, &[&value])
        .await
        .expect("Failed to count rows")
        .get(0)
}

/// Order id that no other test run produces.
pub fn unique_uid(prefix: &str) -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    static SEQ: AtomicUsize = AtomicUsize::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let seq = SEQ.fetch_add(1, Ordering::SeqCst);
    format!("{prefix}-{nanos}-{seq}")
}
