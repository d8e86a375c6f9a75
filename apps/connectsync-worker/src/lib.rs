//! Salesforce sync worker.
//!
//! Consumes Salesforce change topics and writes each record into the Heroku
//! Connect mapped tables through [`connectsync_engine::SyncEngine`]. The
//! binary in `main.rs` wires the Kafka and Postgres implementations; this
//! library exposes the pieces for integration testing.

pub mod config;
pub mod error;
pub mod logging;
pub mod worker;

pub use config::{Config, ConfigError, TopicBinding};
pub use error::{WorkerError, WorkerResult};
pub use worker::{build_engine, build_registry, PayloadError, SyncHandler, Worker};
