//! Error types for the connectsync-events crate.

use thiserror::Error;

/// Errors that can occur while talking to the broker.
#[derive(Debug, Error)]
pub enum EventError {
    // Configuration errors (permanent, no retry)
    /// Required configuration variable is missing.
    #[error("Configuration missing: {var}")]
    ConfigMissing { var: String },

    /// Configuration value is invalid.
    #[error("Configuration invalid for {var}: {reason}")]
    ConfigInvalid { var: String, reason: String },

    /// Credential material could not be parsed.
    #[error("Invalid {credential}: {reason}")]
    CredentialInvalid { credential: String, reason: String },

    // Connection errors (transient, retry with backoff)
    /// Failed to create a client for the broker.
    #[error("Connection to broker {broker} failed: {cause}")]
    ConnectionFailed { broker: String, cause: String },

    /// Receiving from the broker failed.
    #[error("Failed to consume: {cause}")]
    ConsumeFailed { cause: String },

    /// The message stream ended.
    #[error("Message stream closed")]
    StreamClosed,

    /// Committing an offset failed.
    #[error("Failed to commit offset {offset} on {topic}[{partition}]: {cause}")]
    CommitFailed {
        topic: String,
        partition: i32,
        offset: i64,
        cause: String,
    },

    // Publishing errors
    /// The broker rejected or timed out a send.
    #[error("Failed to publish to topic {topic}: {cause}")]
    PublishFailed { topic: String, cause: String },

    /// Failed to serialize a payload.
    #[error("Failed to serialize payload for topic {topic}: {cause}")]
    SerializationFailed { topic: String, cause: String },

    /// Failed to decode a received payload.
    #[error("Failed to deserialize message from topic {topic}: {cause}")]
    DeserializationFailed { topic: String, cause: String },
}

impl EventError {
    /// Returns true if this error is transient and can be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            EventError::ConnectionFailed { .. }
            | EventError::ConsumeFailed { .. }
            | EventError::StreamClosed
            | EventError::CommitFailed { .. }
            | EventError::PublishFailed { .. } => true,
            _ => false,
        }
    }

    /// Returns true if this is a configuration error.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            EventError::ConfigMissing { .. }
                | EventError::ConfigInvalid { .. }
                | EventError::CredentialInvalid { .. }
        )
    }

    /// Returns true if this error concerns a single payload rather than the transport.
    pub fn is_payload_error(&self) -> bool {
        matches!(
            self,
            EventError::SerializationFailed { .. } | EventError::DeserializationFailed { .. }
        )
    }
}
