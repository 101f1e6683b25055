//! Stream consumer loop.
//!
//! Strictly sequential: a message is fetched, ingested and committed before
//! the next fetch. The offset is committed whatever the ingest outcome, so a
//! payload that can never be stored does not block the partition. The cost is
//! that an order whose write failed is not redelivered.
//!
//! The one exception is a store that cannot be reached: when the ingestion
//! connection is gone and reconnecting exhausted its retries, the message is
//! left uncommitted and the loop stops with the error.

use std::future::Future;
use std::time::Duration;

use orderline_core::{OrderError, OrderResult, StoreError, StreamError};
use orderline_storage::{OrderStore, Sleeper, TokioSleeper};
use tokio::sync::watch;

use crate::ingest::OrderIngestor;
use crate::stream::{MessageSource, StreamMessage};
use crate::telemetry::metrics::with_metrics;

/// Pause after a failed fetch before polling again.
pub const DEFAULT_FETCH_BACKOFF: Duration = Duration::from_secs(1);

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Polling,
    Processing,
}

/// Running totals for one consumer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Messages whose ingest completed, successfully or not.
    pub processed: u64,
    /// Messages whose ingest failed.
    pub failed: u64,
    /// Successful offset commits.
    pub committed: u64,
}

pub struct MessageConsumer<M, S, Z = TokioSleeper> {
    source: M,
    ingestor: OrderIngestor<S>,
    state: watch::Sender<ConsumerState>,
    stats: ConsumerStats,
    sleeper: Z,
    fetch_backoff: Duration,
}

impl<M: MessageSource, S: OrderStore> MessageConsumer<M, S> {
    pub fn new(source: M, ingestor: OrderIngestor<S>) -> Self {
        Self::with_sleeper(source, ingestor, TokioSleeper)
    }
}

impl<M: MessageSource, S: OrderStore, Z: Sleeper> MessageConsumer<M, S, Z> {
    pub fn with_sleeper(source: M, ingestor: OrderIngestor<S>, sleeper: Z) -> Self {
        let (state, _) = watch::channel(ConsumerState::Polling);
        Self {
            source,
            ingestor,
            state,
            stats: ConsumerStats::default(),
            sleeper,
            fetch_backoff: DEFAULT_FETCH_BACKOFF,
        }
    }

    pub fn with_fetch_backoff(mut self, backoff: Duration) -> Self {
        self.fetch_backoff = backoff;
        self
    }

    pub fn state(&self) -> ConsumerState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change while the loop runs.
    pub fn watch_state(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    pub fn stats(&self) -> ConsumerStats {
        self.stats
    }

    /// Consume until the source closes.
    pub async fn run(&mut self) -> OrderResult<ConsumerStats> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Consume until the source closes or `shutdown` resolves.
    ///
    /// Shutdown is observed while polling and during the pause after a failed
    /// fetch; a message already being processed is ingested and committed
    /// first. Returns the store error when ingestion lost its connection for
    /// good.
    pub async fn run_until<F>(&mut self, shutdown: F) -> OrderResult<ConsumerStats>
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);

        let outcome = loop {
            self.set_state(ConsumerState::Polling);
            let fetched = tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Consumer shutdown requested");
                    break Ok(());
                }
                fetched = self.source.fetch() => fetched,
            };

            match fetched {
                Ok(message) => {
                    if let Err(err) = self.process(&message).await {
                        break Err(err);
                    }
                }
                Err(StreamError::Closed) => {
                    tracing::info!("Message stream closed");
                    break Ok(());
                }
                Err(err) => {
                    tracing::error!(error = %err, "Failed to fetch message");
                    tokio::select! {
                        _ = &mut shutdown => {
                            tracing::info!("Consumer shutdown requested");
                            break Ok(());
                        }
                        _ = self.sleeper.sleep(self.fetch_backoff) => {}
                    }
                }
            }
        };

        tracing::info!(
            processed = self.stats.processed,
            failed = self.stats.failed,
            committed = self.stats.committed,
            "Consumer stopped"
        );
        outcome.map(|()| self.stats)
    }

    /// Ingest one message and commit its offset.
    ///
    /// Any ingest failure is logged and the offset committed, except
    /// [`StoreError::ConnectFailed`]: the message stays uncommitted and the
    /// error is returned.
    pub async fn process(&mut self, message: &StreamMessage) -> OrderResult<()> {
        self.set_state(ConsumerState::Processing);

        match self.ingestor.ingest(&message.payload).await {
            Ok(_) => {}
            Err(OrderError::Store(err @ StoreError::ConnectFailed { .. })) => {
                tracing::error!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    error = %err,
                    "Order store unreachable, stopping without commit"
                );
                self.set_state(ConsumerState::Polling);
                return Err(err.into());
            }
            Err(err) => {
                self.stats.failed += 1;
                tracing::error!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    error = %err,
                    "Failed to ingest order message"
                );
            }
        }
        self.stats.processed += 1;

        // Committed on failure too: the message is dropped, not retried.
        match self.source.commit(message).await {
            Ok(()) => {
                self.stats.committed += 1;
                with_metrics(|m| m.record_commit(true));
            }
            Err(err) => {
                with_metrics(|m| m.record_commit(false));
                tracing::error!(
                    partition = message.partition,
                    offset = message.offset,
                    error = %err,
                    "Failed to commit offset"
                );
            }
        }

        self.set_state(ConsumerState::Polling);
        Ok(())
    }

    fn set_state(&self, state: ConsumerState) {
        self.state.send_replace(state);
    }
}
