//! In-memory stream backed by a tokio mpsc channel.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use orderline_core::{StreamError, StreamResult};
use tokio::sync::mpsc;

use super::{MessageSource, StreamMessage};

/// Create a connected producer/source pair for `topic` (single partition).
pub fn channel(topic: impl Into<String>) -> (ChannelProducer, ChannelSource) {
    let (tx, rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Mutex::new(Shared::default()));
    let topic = topic.into();

    (
        ChannelProducer {
            topic: topic.clone(),
            tx,
            shared: Arc::clone(&shared),
        },
        ChannelSource { rx, shared },
    )
}

#[derive(Debug, Default)]
struct Shared {
    next_offset: i64,
    committed: Vec<i64>,
    fail_commits: u32,
    fail_fetches: u32,
}

/// Sending half. Dropping every producer closes the source.
#[derive(Debug, Clone)]
pub struct ChannelProducer {
    topic: String,
    tx: mpsc::UnboundedSender<StreamMessage>,
    shared: Arc<Mutex<Shared>>,
}

impl ChannelProducer {
    /// Append a payload and return its offset.
    pub fn send(&self, payload: impl Into<Vec<u8>>) -> StreamResult<i64> {
        let offset = {
            let mut shared = self.shared.lock().map_err(|_| StreamError::Closed)?;
            let offset = shared.next_offset;
            shared.next_offset += 1;
            offset
        };

        self.tx
            .send(StreamMessage {
                topic: self.topic.clone(),
                partition: 0,
                offset,
                key: None,
                payload: payload.into(),
            })
            .map_err(|_| StreamError::Closed)?;
        Ok(offset)
    }

    /// Handle on the commit log that does not keep the channel open.
    pub fn commit_log(&self) -> CommitLog {
        CommitLog {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Make the next `n` fetches fail before reading the channel.
    pub fn fail_fetches(&self, n: u32) {
        if let Ok(mut shared) = self.shared.lock() {
            shared.fail_fetches = n;
        }
    }

    /// Make the next `n` commits fail.
    pub fn fail_commits(&self, n: u32) {
        if let Ok(mut shared) = self.shared.lock() {
            shared.fail_commits = n;
        }
    }
}

/// Read-only view of the offsets the source committed.
#[derive(Debug, Clone)]
pub struct CommitLog {
    shared: Arc<Mutex<Shared>>,
}

impl CommitLog {
    /// Offsets committed so far, in commit order.
    pub fn committed(&self) -> Vec<i64> {
        self.shared
            .lock()
            .map(|shared| shared.committed.clone())
            .unwrap_or_default()
    }
}

/// Receiving half, used by the consumer loop.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::UnboundedReceiver<StreamMessage>,
    shared: Arc<Mutex<Shared>>,
}

#[async_trait]
impl MessageSource for ChannelSource {
    async fn fetch(&mut self) -> StreamResult<StreamMessage> {
        {
            let mut shared = self.shared.lock().map_err(|_| StreamError::Closed)?;
            if shared.fail_fetches > 0 {
                shared.fail_fetches -= 1;
                return Err(StreamError::Fetch {
                    reason: "injected fetch failure".to_string(),
                });
            }
        }
        self.rx.recv().await.ok_or(StreamError::Closed)
    }

    async fn commit(&mut self, message: &StreamMessage) -> StreamResult<()> {
        let mut shared = self.shared.lock().map_err(|_| StreamError::Closed)?;
        if shared.fail_commits > 0 {
            shared.fail_commits -= 1;
            return Err(StreamError::Commit {
                partition: message.partition,
                offset: message.offset,
                reason: "injected commit failure".to_string(),
            });
        }
        shared.committed.push(message.offset);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_offsets_are_sequential() {
        let (producer, mut source) = channel("orders");
        assert_eq!(producer.send(b"a".to_vec()).unwrap(), 0);
        assert_eq!(producer.send(b"b".to_vec()).unwrap(), 1);

        let first = source.fetch().await.unwrap();
        let second = source.fetch().await.unwrap();
        assert_eq!((first.offset, first.payload), (0, b"a".to_vec()));
        assert_eq!(second.topic, "orders");
        assert_eq!(second.offset, 1);
    }

    #[tokio::test]
    async fn test_closed_after_producers_drop() {
        let (producer, mut source) = channel("orders");
        producer.send(b"x".to_vec()).unwrap();
        drop(producer);

        assert!(source.fetch().await.is_ok());
        assert_eq!(source.fetch().await.unwrap_err(), StreamError::Closed);
    }

    #[tokio::test]
    async fn test_fetch_failure_injection() {
        let (producer, mut source) = channel("orders");
        producer.send(b"x".to_vec()).unwrap();
        producer.fail_fetches(1);

        assert!(matches!(
            source.fetch().await,
            Err(StreamError::Fetch { .. })
        ));
        assert_eq!(source.fetch().await.unwrap().offset, 0);
    }

    #[tokio::test]
    async fn test_commit_failure_injection() {
        let (producer, mut source) = channel("orders");
        producer.send(b"x".to_vec()).unwrap();
        producer.fail_commits(1);
        let message = source.fetch().await.unwrap();

        assert!(matches!(
            source.commit(&message).await,
            Err(StreamError::Commit { offset: 0, .. })
        ));
        source.commit(&message).await.unwrap();
        assert_eq!(producer.commit_log().committed(), vec![0]);
    }
}
