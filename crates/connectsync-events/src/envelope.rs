//! Message envelopes moving between the broker and handlers.

use crate::error::EventError;
use serde::{Deserialize, Serialize};

/// Header carrying the delivery attempt number of a re-driven message.
pub const ATTEMPT_HEADER: &str = "x-connectsync-attempt";

/// Where a message sits in the broker log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub partition: i32,
    pub offset: i64,
}

/// A message as received from the broker, before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub key: Option<String>,
    pub payload: Option<Vec<u8>>,
    /// Value of the attempt header, if present.
    pub attempt_header: Option<Vec<u8>>,
    pub position: Option<Position>,
}

impl InboundMessage {
    /// Build a message without broker metadata.
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            key: None,
            payload: Some(payload.into()),
            attempt_header: None,
            position: None,
        }
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_position(mut self, partition: i32, offset: i64) -> Self {
        self.position = Some(Position { partition, offset });
        self
    }

    #[must_use]
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt_header = Some(attempt.to_string().into_bytes());
        self
    }

    /// Delivery attempt encoded in the header, defaulting to 1.
    ///
    /// Unparseable or zero values count as a first attempt.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt_header
            .as_deref()
            .and_then(|raw| std::str::from_utf8(raw).ok())
            .and_then(|s| s.trim().parse::<u32>().ok())
            .filter(|attempt| *attempt > 0)
            .unwrap_or(1)
    }

    /// Decode the JSON payload into an envelope.
    pub fn decode(&self) -> Result<MessageEnvelope, EventError> {
        let bytes = self
            .payload
            .as_deref()
            .ok_or_else(|| EventError::DeserializationFailed {
                topic: self.topic.clone(),
                cause: "empty payload".to_string(),
            })?;

        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| EventError::DeserializationFailed {
                topic: self.topic.clone(),
                cause: e.to_string(),
            })?;

        Ok(MessageEnvelope {
            topic: self.topic.clone(),
            key: self.key.clone(),
            value,
            attempt: self.attempt(),
            position: self.position,
        })
    }
}

/// One unit of work pulled from the broker, with its payload decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub topic: String,
    pub key: Option<String>,
    pub value: serde_json::Value,
    /// 1 for a first delivery, incremented on every re-drive.
    pub attempt: u32,
    pub position: Option<Position>,
}

impl MessageEnvelope {
    /// Build an envelope for a first delivery without broker metadata.
    pub fn new(topic: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            topic: topic.into(),
            key: None,
            value,
            attempt: 1,
            position: None,
        }
    }

    /// Read a string field from an object payload.
    #[must_use]
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.value.get(field).and_then(serde_json::Value::as_str)
    }
}

/// A message ready to be published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub attempt: Option<u32>,
}

impl OutboundMessage {
    /// Serialize `payload` as JSON for `topic`.
    pub fn json<T: Serialize + ?Sized>(
        topic: impl Into<String>,
        payload: &T,
    ) -> Result<Self, EventError> {
        let topic = topic.into();
        let payload = serde_json::to_vec(payload).map_err(|e| EventError::SerializationFailed {
            topic: topic.clone(),
            cause: e.to_string(),
        })?;

        Ok(Self {
            topic,
            key: None,
            payload,
            attempt: None,
        })
    }

    #[must_use]
    pub fn with_key(mut self, key: Option<String>) -> Self {
        self.key = key;
        self
    }

    #[must_use]
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }
}

/// Broker acknowledgement for a published message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub partition: i32,
    pub offset: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_contact_message() {
        let inbound = InboundMessage::new(
            "salesforce.contact",
            br#"{"id": "003x0001", "data": {"Email": "a@b.com"}}"#.to_vec(),
        )
        .with_key("003x0001")
        .with_position(2, 41);

        let envelope = inbound.decode().unwrap();

        assert_eq!(envelope.topic, "salesforce.contact");
        assert_eq!(envelope.key.as_deref(), Some("003x0001"));
        assert_eq!(envelope.str_field("id"), Some("003x0001"));
        assert_eq!(envelope.value["data"]["Email"], json!("a@b.com"));
        assert_eq!(envelope.attempt, 1);
        assert_eq!(
            envelope.position,
            Some(Position {
                partition: 2,
                offset: 41
            })
        );
    }

    #[test]
    fn test_decode_invalid_json() {
        let inbound = InboundMessage::new("salesforce.account", b"{not json".to_vec());
        let err = inbound.decode().unwrap_err();
        assert!(err.is_payload_error());
        assert!(err.to_string().contains("salesforce.account"));
    }

    #[test]
    fn test_decode_empty_payload() {
        let inbound = InboundMessage {
            payload: None,
            ..InboundMessage::new("salesforce.account", Vec::new())
        };
        assert!(matches!(
            inbound.decode(),
            Err(EventError::DeserializationFailed { .. })
        ));
    }

    #[test]
    fn test_attempt_header() {
        let base = InboundMessage::new("t", b"{}".to_vec());
        assert_eq!(base.attempt(), 1);
        assert_eq!(base.clone().with_attempt(3).attempt(), 3);

        let garbage = InboundMessage {
            attempt_header: Some(b"three".to_vec()),
            ..base.clone()
        };
        assert_eq!(garbage.attempt(), 1);

        let zero = InboundMessage {
            attempt_header: Some(b"0".to_vec()),
            ..base
        };
        assert_eq!(zero.attempt(), 1);
    }

    #[test]
    fn test_outbound_json() {
        let outbound = OutboundMessage::json("salesforce.contact", &json!({"id": "1"}))
            .unwrap()
            .with_key(Some("1".to_string()))
            .with_attempt(2);

        assert_eq!(outbound.payload, br#"{"id":"1"}"#.to_vec());
        assert_eq!(outbound.key.as_deref(), Some("1"));
        assert_eq!(outbound.attempt, Some(2));
    }
}
