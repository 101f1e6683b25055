//! Kafka source built on librdkafka.

use async_trait::async_trait;
use orderline_core::{StreamError, StreamResult};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::{Offset, TopicPartitionList};

use super::{MessageSource, StreamMessage};
use crate::config::StreamConfig;

/// Consumer-group member of the order topic with auto-commit disabled.
pub struct KafkaSource {
    consumer: StreamConsumer,
}

impl KafkaSource {
    /// Create the consumer and subscribe to `config.topic`.
    ///
    /// A group without committed offsets starts from the earliest message.
    pub fn subscribe(config: &StreamConfig) -> StreamResult<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()
            .map_err(|e| StreamError::Fetch {
                reason: format!("Failed to create consumer: {}", e),
            })?;

        consumer
            .subscribe(&[config.topic.as_str()])
            .map_err(|e| StreamError::Fetch {
                reason: format!("Failed to subscribe to {}: {}", config.topic, e),
            })?;

        tracing::info!(
            brokers = %config.brokers,
            topic = %config.topic,
            group_id = %config.group_id,
            "Subscribed to order topic"
        );
        Ok(Self { consumer })
    }
}

#[async_trait]
impl MessageSource for KafkaSource {
    async fn fetch(&mut self) -> StreamResult<StreamMessage> {
        let message = self.consumer.recv().await.map_err(|e| StreamError::Fetch {
            reason: e.to_string(),
        })?;

        Ok(StreamMessage {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message.key().map(<[u8]>::to_vec),
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        })
    }

    async fn commit(&mut self, message: &StreamMessage) -> StreamResult<()> {
        let commit_error = |reason: String| StreamError::Commit {
            partition: message.partition,
            offset: message.offset,
            reason,
        };

        // Kafka commits the position of the next message to read.
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(
                &message.topic,
                message.partition,
                Offset::Offset(message.offset + 1),
            )
            .map_err(|e| commit_error(e.to_string()))?;

        // Blocks on the broker round trip. Requires the multi-threaded runtime.
        let consumer = &self.consumer;
        tokio::task::block_in_place(|| consumer.commit(&offsets, CommitMode::Sync))
            .map_err(|e| commit_error(e.to_string()))
    }
}
