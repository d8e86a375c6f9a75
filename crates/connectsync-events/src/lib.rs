//! # connectsync-events
//!
//! Kafka client and consume loop for connectsync.
//!
//! Provides a mutual-TLS broker client, a topic dispatch registry, and a
//! supervised consume-dispatch-commit loop with retry and dead-letter routing
//! for failed handler work.
//!
//! ## Features
//!
//! - **Mutual TLS**: PEM credentials validated up front, handed to librdkafka
//!   in memory or through owner-only temp files
//! - **At-least-once**: offsets are committed only after dispatch returns
//! - **Re-drive**: failed messages are republished with an attempt header, then
//!   dead-lettered
//! - **Supervision**: transient transport faults re-open the consumer with
//!   exponential backoff
//!
//! ## Cargo Features
//!
//! - `kafka`: Enable Kafka producer/consumer (requires librdkafka)
//! - `kafka-static`: Build librdkafka from source (requires cmake)
//!
//! ## Example
//!
//! ```rust,ignore
//! use connectsync_events::{
//!     handler_fn, ConsumeLoop, DispatchRegistry, KafkaConfig, KafkaSourceFactory, Supervisor,
//! };
//!
//! let config = KafkaConfig::from_env()?;
//! let registry = DispatchRegistry::builder()
//!     .register("salesforce.contact", handler_fn("contact", |envelope| async move {
//!         println!("{}", envelope.value);
//!         Ok(())
//!     }))
//!     .build();
//!
//! let factory = KafkaSourceFactory::new(config, registry.topics());
//! let fault = Supervisor::default()
//!     .run(&factory, &ConsumeLoop::new(registry))
//!     .await;
//! ```

// Core modules (always available)
pub mod config;
pub mod consume;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod health;
pub mod memory;
pub mod redrive;
pub mod source;
pub mod supervisor;
pub mod tls;

// Kafka-dependent modules (require `kafka` feature)
#[cfg(feature = "kafka")]
pub mod consumer;
#[cfg(feature = "kafka")]
pub mod producer;

// Re-exports for convenience (core types)
pub use config::{KafkaConfig, KafkaConfigBuilder};
pub use consume::{ConsumeLoop, LoopFault, Processed};
pub use dispatch::{
    handler_fn, DispatchOutcome, DispatchRegistry, DispatchRegistryBuilder, HandlerError,
    HandlerFailure, TopicHandler,
};
pub use envelope::{Acknowledgement, InboundMessage, MessageEnvelope, OutboundMessage, Position};
pub use error::EventError;
pub use health::HealthStatus;
pub use redrive::{DeadLetter, FailureRouter, RedrivePolicy, Route};
pub use source::{MessageSource, Publisher, SourceFactory};
pub use supervisor::{ReconnectPolicy, Supervisor};
pub use tls::{CredentialDelivery, TlsCredentials};

// Re-exports for Kafka types (when feature enabled)
#[cfg(feature = "kafka")]
pub use consumer::{EventConsumer, KafkaSourceFactory};
#[cfg(feature = "kafka")]
pub use producer::EventProducer;
