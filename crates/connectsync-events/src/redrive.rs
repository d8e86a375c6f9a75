//! Re-drive and dead-letter routing for failed handler work.
//!
//! A message whose handlers failed is republished to its own topic with an
//! incremented attempt header until the attempt budget is spent, then moved
//! to the dead-letter topic. Routing happens before the offset commit: if the
//! republish fails, the offset stays put and the message is redelivered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::dispatch::HandlerFailure;
use crate::envelope::{Acknowledgement, InboundMessage, OutboundMessage};
use crate::error::EventError;
use crate::source::Publisher;

/// Default number of deliveries before a message is dead-lettered.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default dead-letter topic.
pub const DEFAULT_DEAD_LETTER_TOPIC: &str = "connectsync.dead-letter";

/// Where a failed message goes next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Republish to the same topic as delivery `attempt`.
    Retry { topic: String, attempt: u32 },
    /// Park on the dead-letter topic.
    DeadLetter { topic: String },
}

/// Attempt budget and dead-letter destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedrivePolicy {
    /// Total deliveries allowed, counting the first one.
    pub max_attempts: u32,
    pub dead_letter_topic: String,
}

impl Default for RedrivePolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            dead_letter_topic: DEFAULT_DEAD_LETTER_TOPIC.to_string(),
        }
    }
}

impl RedrivePolicy {
    /// Decide the route for a message that failed on delivery `attempt`.
    #[must_use]
    pub fn route(&self, topic: &str, attempt: u32) -> Route {
        if attempt < self.max_attempts {
            Route::Retry {
                topic: topic.to_string(),
                attempt: attempt + 1,
            }
        } else {
            Route::DeadLetter {
                topic: self.dead_letter_topic.clone(),
            }
        }
    }
}

/// Payload written to the dead-letter topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub source_topic: String,
    pub key: Option<String>,
    pub attempt: u32,
    pub failures: Vec<DeadLetterFailure>,
    /// Original payload: parsed JSON when possible, otherwise the lossy UTF-8 text.
    pub payload: serde_json::Value,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterFailure {
    pub handler: String,
    pub error: String,
}

impl From<&HandlerFailure> for DeadLetterFailure {
    fn from(failure: &HandlerFailure) -> Self {
        Self {
            handler: failure.handler.clone(),
            error: failure.error.clone(),
        }
    }
}

impl DeadLetter {
    fn from_message(message: &InboundMessage, failures: Vec<DeadLetterFailure>) -> Self {
        let payload = match message.payload.as_deref() {
            None => serde_json::Value::Null,
            Some(bytes) => serde_json::from_slice(bytes).unwrap_or_else(|_| {
                serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned())
            }),
        };

        Self {
            source_topic: message.topic.clone(),
            key: message.key.clone(),
            attempt: message.attempt(),
            failures,
            payload,
            failed_at: Utc::now(),
        }
    }
}

/// Publishes failed messages to their retry or dead-letter destination.
#[derive(Clone)]
pub struct FailureRouter {
    publisher: Arc<dyn Publisher>,
    policy: RedrivePolicy,
}

impl FailureRouter {
    pub fn new(publisher: Arc<dyn Publisher>, policy: RedrivePolicy) -> Self {
        Self { publisher, policy }
    }

    #[must_use]
    pub fn policy(&self) -> &RedrivePolicy {
        &self.policy
    }

    /// Route a message whose handlers reported `failures`.
    pub async fn route_failure(
        &self,
        message: &InboundMessage,
        failures: &[HandlerFailure],
    ) -> Result<Route, EventError> {
        let route = self.policy.route(&message.topic, message.attempt());

        match &route {
            Route::Retry { topic, attempt } => {
                let outbound = OutboundMessage {
                    topic: topic.clone(),
                    key: message.key.clone(),
                    payload: message.payload.clone().unwrap_or_default(),
                    attempt: Some(*attempt),
                };
                let ack = self.publisher.publish(outbound).await?;
                info!(
                    topic = %topic,
                    next_attempt = attempt,
                    partition = ack.partition,
                    offset = ack.offset,
                    "Failed message re-driven"
                );
            }
            Route::DeadLetter { topic } => {
                let failures = failures.iter().map(DeadLetterFailure::from).collect();
                let ack = self.publish_dead_letter(topic, message, failures).await?;
                warn!(
                    source_topic = %message.topic,
                    dead_letter_topic = %topic,
                    attempt = message.attempt(),
                    partition = ack.partition,
                    offset = ack.offset,
                    "Attempts exhausted, message dead-lettered"
                );
            }
        }

        Ok(route)
    }

    /// Dead-letter a message that could not be decoded at all.
    pub async fn route_undecodable(
        &self,
        message: &InboundMessage,
        cause: &EventError,
    ) -> Result<Route, EventError> {
        let topic = self.policy.dead_letter_topic.clone();
        let failures = vec![DeadLetterFailure {
            handler: "decode".to_string(),
            error: cause.to_string(),
        }];
        self.publish_dead_letter(&topic, message, failures).await?;
        warn!(source_topic = %message.topic, dead_letter_topic = %topic, "Undecodable message dead-lettered");

        Ok(Route::DeadLetter { topic })
    }

    async fn publish_dead_letter(
        &self,
        topic: &str,
        message: &InboundMessage,
        failures: Vec<DeadLetterFailure>,
    ) -> Result<Acknowledgement, EventError> {
        let record = DeadLetter::from_message(message, failures);
        let outbound = OutboundMessage::json(topic, &record)?
            .with_key(message.key.clone())
            .with_attempt(record.attempt);
        self.publisher.publish(outbound).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_routes_by_attempt() {
        let policy = RedrivePolicy {
            max_attempts: 3,
            dead_letter_topic: "dlq".to_string(),
        };

        assert_eq!(
            policy.route("salesforce.contact", 1),
            Route::Retry {
                topic: "salesforce.contact".to_string(),
                attempt: 2
            }
        );
        assert_eq!(
            policy.route("salesforce.contact", 2),
            Route::Retry {
                topic: "salesforce.contact".to_string(),
                attempt: 3
            }
        );
        assert_eq!(
            policy.route("salesforce.contact", 3),
            Route::DeadLetter {
                topic: "dlq".to_string()
            }
        );
    }

    #[test]
    fn test_single_attempt_policy_dead_letters_immediately() {
        let policy = RedrivePolicy {
            max_attempts: 1,
            ..RedrivePolicy::default()
        };
        assert!(matches!(
            policy.route("t", 1),
            Route::DeadLetter { topic } if topic == DEFAULT_DEAD_LETTER_TOPIC
        ));
    }

    #[test]
    fn test_dead_letter_keeps_non_json_payload_as_text() {
        let message = InboundMessage::new("salesforce.account", b"not-json".to_vec()).with_attempt(3);
        let record = DeadLetter::from_message(&message, Vec::new());
        assert_eq!(record.payload, serde_json::json!("not-json"));
        assert_eq!(record.attempt, 3);
        assert_eq!(record.source_topic, "salesforce.account");
    }
}
