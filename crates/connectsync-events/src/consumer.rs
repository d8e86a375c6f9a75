//! Kafka message consumer with manual offset commit.

use crate::config::KafkaConfig;
use crate::envelope::{InboundMessage, Position, ATTEMPT_HEADER};
use crate::error::EventError;
use crate::source::{MessageSource, SourceFactory};
use crate::tls::MaterializedCredentials;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Headers, Message};
use rdkafka::{Offset, TopicPartitionList};
use std::sync::Arc;
use tracing::{debug, info};

/// Kafka consumer subscribed to a fixed topic set.
pub struct EventConsumer {
    consumer: Arc<StreamConsumer>,
    consumer_group: String,
    topics: Vec<String>,
    // Temp files (file delivery) must outlive the client.
    _credentials: MaterializedCredentials,
}

impl EventConsumer {
    /// Create a consumer and subscribe it to `topics`.
    ///
    /// Offsets start at the earliest retained message for a new group and are
    /// only advanced by [`MessageSource::commit`].
    pub fn open(config: &KafkaConfig, topics: &[String]) -> Result<Self, EventError> {
        let consumer_group = config.require_consumer_group()?.to_string();
        let (props, credentials) = config.client_properties()?;

        let mut client_config = ClientConfig::new();
        for (key, value) in props {
            client_config.set(key, value);
        }
        client_config
            .set("group.id", &consumer_group)
            .set("auto.offset.reset", "earliest")
            .set("enable.auto.commit", "false")
            .set("session.timeout.ms", "30000");

        let consumer: StreamConsumer =
            client_config
                .create()
                .map_err(|e| EventError::ConnectionFailed {
                    broker: config.bootstrap_list(),
                    cause: e.to_string(),
                })?;

        let names: Vec<&str> = topics.iter().map(String::as_str).collect();
        consumer
            .subscribe(&names)
            .map_err(|e| EventError::ConsumeFailed {
                cause: format!("subscribe to {names:?}: {e}"),
            })?;

        info!(
            consumer_group = %consumer_group,
            bootstrap_servers = %config.bootstrap_list(),
            topics = ?topics,
            "Event consumer subscribed"
        );

        Ok(Self {
            consumer: Arc::new(consumer),
            consumer_group,
            topics: topics.to_vec(),
            _credentials: credentials,
        })
    }

    /// Get the consumer group name.
    pub fn consumer_group(&self) -> &str {
        &self.consumer_group
    }

    /// Topics this consumer is subscribed to.
    pub fn topics(&self) -> &[String] {
        &self.topics
    }
}

fn to_inbound(message: &BorrowedMessage<'_>) -> InboundMessage {
    let key = message
        .key()
        .map(|raw| String::from_utf8_lossy(raw).into_owned());

    let attempt_header = message.headers().and_then(|headers| {
        headers
            .iter()
            .find(|header| header.key == ATTEMPT_HEADER)
            .and_then(|header| header.value.map(<[u8]>::to_vec))
    });

    InboundMessage {
        topic: message.topic().to_string(),
        key,
        payload: message.payload().map(<[u8]>::to_vec),
        attempt_header,
        position: Some(Position {
            partition: message.partition(),
            offset: message.offset(),
        }),
    }
}

#[async_trait]
impl MessageSource for EventConsumer {
    async fn recv(&mut self) -> Result<InboundMessage, EventError> {
        let message = self
            .consumer
            .recv()
            .await
            .map_err(|e| EventError::ConsumeFailed {
                cause: e.to_string(),
            })?;

        let inbound = to_inbound(&message);
        debug!(
            topic = %inbound.topic,
            partition = message.partition(),
            offset = message.offset(),
            "Fetched message"
        );
        Ok(inbound)
    }

    async fn commit(&mut self, message: &InboundMessage) -> Result<(), EventError> {
        let Some(position) = message.position else {
            return Err(EventError::CommitFailed {
                topic: message.topic.clone(),
                partition: -1,
                offset: -1,
                cause: "message carries no broker position".to_string(),
            });
        };

        let commit_failed = |cause: String| EventError::CommitFailed {
            topic: message.topic.clone(),
            partition: position.partition,
            offset: position.offset,
            cause,
        };

        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(
            &message.topic,
            position.partition,
            Offset::Offset(position.offset + 1),
        )
        .map_err(|e| commit_failed(e.to_string()))?;

        // A synchronous commit waits on the broker; keep it off the runtime threads.
        let consumer = Arc::clone(&self.consumer);
        tokio::task::spawn_blocking(move || consumer.commit(&tpl, CommitMode::Sync))
            .await
            .map_err(|e| commit_failed(e.to_string()))?
            .map_err(|e| commit_failed(e.to_string()))?;

        debug!(
            topic = %message.topic,
            partition = position.partition,
            offset = position.offset,
            "Offset committed"
        );
        Ok(())
    }
}

/// Opens a fresh [`EventConsumer`] for every supervised restart.
#[derive(Debug, Clone)]
pub struct KafkaSourceFactory {
    config: KafkaConfig,
    topics: Vec<String>,
}

impl KafkaSourceFactory {
    pub fn new(config: KafkaConfig, topics: Vec<String>) -> Self {
        Self { config, topics }
    }
}

#[async_trait]
impl SourceFactory for KafkaSourceFactory {
    type Source = EventConsumer;

    async fn open(&self) -> Result<EventConsumer, EventError> {
        EventConsumer::open(&self.config, &self.topics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::fixtures::{CERT_PEM, KEY_PEM};

    fn config(group: Option<&str>) -> KafkaConfig {
        KafkaConfig::configure("kafka+ssl://localhost:9096", CERT_PEM, KEY_PEM, CERT_PEM, group)
            .unwrap()
    }

    #[test]
    fn test_open_requires_consumer_group() {
        let result = EventConsumer::open(&config(None), &["salesforce.contact".to_string()]);
        assert!(matches!(result, Err(EventError::ConfigMissing { var }) if var == "CONSUMER_GROUP"));
    }

    #[tokio::test]
    async fn test_commit_without_position_fails() {
        // Client creation is lazy, so no broker is needed here.
        let mut consumer =
            EventConsumer::open(&config(Some("connectsync-test")), &["salesforce.contact".to_string()])
                .unwrap();
        assert_eq!(consumer.consumer_group(), "connectsync-test");
        assert_eq!(consumer.topics(), ["salesforce.contact".to_string()]);

        let message = InboundMessage::new("salesforce.contact", b"{}".to_vec());
        let err = consumer.commit(&message).await.unwrap_err();
        assert!(matches!(err, EventError::CommitFailed { partition: -1, .. }));
    }
}
