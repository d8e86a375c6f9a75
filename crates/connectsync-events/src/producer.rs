//! Kafka message producer.

use crate::config::KafkaConfig;
use crate::envelope::{Acknowledgement, OutboundMessage, ATTEMPT_HEADER};
use crate::error::EventError;
use crate::health::HealthStatus;
use crate::source::Publisher;
use crate::tls::MaterializedCredentials;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

const SEND_TIMEOUT: Duration = Duration::from_secs(5);
const METADATA_TIMEOUT: Duration = Duration::from_secs(5);

/// Kafka producer for JSON payloads.
///
/// Cheap to clone; clones share the underlying client.
#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
    bootstrap_servers: String,
    _credentials: Arc<MaterializedCredentials>,
}

impl EventProducer {
    /// Create a new event producer with the given configuration.
    pub fn new(config: &KafkaConfig) -> Result<Self, EventError> {
        let (props, credentials) = config.client_properties()?;

        let mut client_config = ClientConfig::new();
        for (key, value) in props {
            client_config.set(key, value);
        }
        client_config
            .set("message.timeout.ms", "5000")
            .set("acks", "all");

        let producer: FutureProducer =
            client_config
                .create()
                .map_err(|e| EventError::ConnectionFailed {
                    broker: config.bootstrap_list(),
                    cause: e.to_string(),
                })?;

        info!(
            bootstrap_servers = %config.bootstrap_list(),
            client_id = %config.client_id,
            "Event producer created"
        );

        Ok(Self {
            producer,
            bootstrap_servers: config.bootstrap_list(),
            _credentials: Arc::new(credentials),
        })
    }

    /// Serialize `payload` as JSON and publish it to `topic`.
    pub async fn send<T: Serialize + ?Sized>(
        &self,
        topic: &str,
        payload: &T,
    ) -> Result<Acknowledgement, EventError> {
        self.send_message(OutboundMessage::json(topic, payload)?)
            .await
    }

    /// Publish with a partition key and, optionally, an attempt header.
    pub async fn send_keyed<T: Serialize + ?Sized>(
        &self,
        topic: &str,
        key: &str,
        payload: &T,
        attempt: Option<u32>,
    ) -> Result<Acknowledgement, EventError> {
        let mut message = OutboundMessage::json(topic, payload)?.with_key(Some(key.to_string()));
        message.attempt = attempt;
        self.send_message(message).await
    }

    /// Publish a pre-encoded message and wait for the broker acknowledgement.
    #[instrument(skip(self, message), fields(topic = %message.topic))]
    pub async fn send_message(
        &self,
        message: OutboundMessage,
    ) -> Result<Acknowledgement, EventError> {
        debug!(
            key = ?message.key,
            attempt = ?message.attempt,
            payload_size = message.payload.len(),
            "Publishing message"
        );

        let attempt_value = message.attempt.map(|attempt| attempt.to_string());

        let mut record =
            FutureRecord::<str, [u8]>::to(&message.topic).payload(message.payload.as_slice());
        if let Some(key) = message.key.as_deref() {
            record = record.key(key);
        }
        if let Some(value) = attempt_value.as_deref() {
            record = record.headers(OwnedHeaders::new().insert(Header {
                key: ATTEMPT_HEADER,
                value: Some(value),
            }));
        }

        let (partition, offset) = self
            .producer
            .send(record, SEND_TIMEOUT)
            .await
            .map_err(|(err, _)| EventError::PublishFailed {
                topic: message.topic.clone(),
                cause: err.to_string(),
            })?;

        debug!(partition, offset, "Message published");

        Ok(Acknowledgement { partition, offset })
    }

    /// Check the health of the Kafka connection.
    pub async fn health_check(&self) -> Result<HealthStatus, EventError> {
        let producer = self.producer.clone();
        let broker = self.bootstrap_servers.clone();

        let metadata = tokio::task::spawn_blocking(move || {
            producer
                .client()
                .fetch_metadata(None, METADATA_TIMEOUT)
                .map(|metadata| (metadata.brokers().len(), metadata.topics().len()))
        })
        .await
        .map_err(|e| EventError::ConnectionFailed {
            broker: broker.clone(),
            cause: e.to_string(),
        })?
        .map_err(|e| EventError::ConnectionFailed {
            broker,
            cause: e.to_string(),
        })?;

        Ok(HealthStatus {
            connected: true,
            brokers: metadata.0,
            topics: metadata.1,
        })
    }
}

#[async_trait]
impl Publisher for EventProducer {
    async fn publish(&self, message: OutboundMessage) -> Result<Acknowledgement, EventError> {
        self.send_message(message).await
    }
}
