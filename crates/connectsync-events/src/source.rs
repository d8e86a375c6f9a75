//! Transport seams used by the consume loop.

use async_trait::async_trait;

use crate::envelope::{Acknowledgement, InboundMessage, OutboundMessage};
use crate::error::EventError;

/// A subscribed stream of broker messages with manual offset commit.
#[async_trait]
pub trait MessageSource: Send {
    /// Wait for the next message. Blocks while the topics are idle.
    async fn recv(&mut self) -> Result<InboundMessage, EventError>;

    /// Advance the committed offset past `message`.
    async fn commit(&mut self, message: &InboundMessage) -> Result<(), EventError>;
}

/// Opens fresh sources, so a consume loop can restart after a fault.
#[async_trait]
pub trait SourceFactory: Send + Sync {
    type Source: MessageSource;

    async fn open(&self) -> Result<Self::Source, EventError>;
}

/// Publishing side of the broker client.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish one message and wait for the broker acknowledgement.
    async fn publish(&self, message: OutboundMessage) -> Result<Acknowledgement, EventError>;
}
