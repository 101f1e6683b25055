//! Message stream sources.
//!
//! A [`MessageSource`] hands out order messages one at a time and accepts
//! explicit offset commits. The consumer loop is written against this trait;
//! [`memory::ChannelSource`] backs tests and local runs, and the Kafka source
//! is available behind the `kafka` feature.

use async_trait::async_trait;
use orderline_core::StreamResult;

pub mod memory;

#[cfg(feature = "kafka")]
pub mod kafka;

pub use memory::{channel, ChannelProducer, ChannelSource, CommitLog};

#[cfg(feature = "kafka")]
pub use kafka::KafkaSource;

/// One record fetched from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

/// A consumer-group style source with manual offset commits.
#[async_trait]
pub trait MessageSource: Send {
    /// Wait for the next message.
    ///
    /// Returns [`orderline_core::StreamError::Closed`] once the source can
    /// never yield again. Other errors are transient.
    async fn fetch(&mut self) -> StreamResult<StreamMessage>;

    /// Mark `message` as processed for this consumer group.
    async fn commit(&mut self, message: &StreamMessage) -> StreamResult<()>;
}
