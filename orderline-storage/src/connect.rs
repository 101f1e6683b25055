//! Store connection establishment with bounded retry.
//!
//! [`ConnectionManager::connect`] makes up to `max_attempts` attempts. An
//! attempt is an open followed by a liveness check; either failing counts as
//! a failed attempt. Between attempts the manager waits `interval` through a
//! [`Sleeper`], so tests can drive it with a fake clock.

use async_trait::async_trait;
use orderline_core::{RetryPolicy, StoreError, StoreResult};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Opens raw connections to a store.
#[async_trait]
pub trait Connector: Send + Sync {
    type Conn: Send + Sync;

    /// Open a new connection.
    async fn open(&self) -> StoreResult<Self::Conn>;

    /// Check that an opened connection is usable.
    async fn ping(&self, conn: &Self::Conn) -> StoreResult<()>;

    /// True once the connection can never serve another request.
    async fn is_closed(&self, _conn: &Self::Conn) -> bool {
        false
    }
}

/// Source of delays between connection attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Fake clock that records requested delays and returns immediately.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    slept: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays requested so far, in order.
    pub fn slept(&self) -> Vec<Duration> {
        self.slept
            .lock()
            .map(|slept| slept.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut slept) = self.slept.lock() {
            slept.push(duration);
        }
    }
}

/// Establishes store connections under a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct ConnectionManager<C, S = TokioSleeper> {
    connector: C,
    policy: RetryPolicy,
    sleeper: S,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, policy: RetryPolicy) -> Self {
        Self::with_sleeper(connector, policy, TokioSleeper)
    }
}

impl<C: Connector, S: Sleeper> ConnectionManager<C, S> {
    pub fn with_sleeper(connector: C, policy: RetryPolicy, sleeper: S) -> Self {
        Self {
            connector,
            policy,
            sleeper,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Connect, retrying with a fixed interval until the attempt bound.
    ///
    /// Exhaustion returns [`StoreError::ConnectFailed`] carrying the last
    /// failure. Whether that is fatal is the caller's decision.
    pub async fn connect(&self) -> StoreResult<C::Conn> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_reason = String::new();

        for attempt in 1..=max_attempts {
            match self.attempt().await {
                Ok(conn) => {
                    if attempt > 1 {
                        tracing::info!(attempt, "Connected to store after retry");
                    } else {
                        tracing::debug!("Connected to store");
                    }
                    return Ok(conn);
                }
                Err(err) => {
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        error = %err,
                        "Store connection attempt failed"
                    );
                    last_reason = err.to_string();
                }
            }

            if attempt < max_attempts {
                self.sleeper.sleep(self.policy.interval).await;
            }
        }

        tracing::error!(attempts = max_attempts, reason = %last_reason, "Giving up on store connection");
        Err(StoreError::ConnectFailed {
            attempts: max_attempts,
            reason: last_reason,
        })
    }

    async fn attempt(&self) -> StoreResult<C::Conn> {
        let conn = self.connector.open().await?;
        self.connector.ping(&conn).await?;
        Ok(conn)
    }
}
