//! Salesforce sync worker: topic handlers and the supervised consume loop.

use async_trait::async_trait;
use connectsync_engine::{MappingCatalog, SyncEngine, SyncRequest, SyncStore};
use connectsync_events::{
    ConsumeLoop, DispatchRegistry, FailureRouter, HandlerError, MessageEnvelope, Publisher,
    SourceFactory, Supervisor, TopicHandler,
};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

use crate::config::{Config, TopicBinding};
use crate::error::{WorkerError, WorkerResult};

/// Payload shape problems detected before the engine is called.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("message on {topic} has no id")]
    MissingId { topic: String },

    #[error("message on {topic} is not a JSON object")]
    NotAnObject { topic: String },
}

/// Pushes `{ "id": ..., "data": {...} }` messages of one record type
/// through the sync engine.
pub struct SyncHandler {
    name: String,
    record_type: String,
    engine: SyncEngine,
}

impl SyncHandler {
    pub fn new(record_type: impl Into<String>, engine: SyncEngine) -> Self {
        let record_type = record_type.into();
        Self {
            name: format!("{}_update", record_type.to_lowercase()),
            record_type,
            engine,
        }
    }

    #[must_use]
    pub fn record_type(&self) -> &str {
        &self.record_type
    }

    fn request(&self, envelope: &MessageEnvelope) -> Result<SyncRequest, PayloadError> {
        if !envelope.value.is_object() {
            return Err(PayloadError::NotAnObject {
                topic: envelope.topic.clone(),
            });
        }

        let record_id = match envelope.value.get("id") {
            Some(JsonValue::String(id)) => id.clone(),
            Some(JsonValue::Number(id)) => id.to_string(),
            _ => {
                return Err(PayloadError::MissingId {
                    topic: envelope.topic.clone(),
                })
            }
        };
        let data = envelope
            .value
            .get("data")
            .cloned()
            .unwrap_or_else(|| JsonValue::Object(serde_json::Map::new()));

        Ok(SyncRequest::new(&self.record_type, record_id, data).with_attempt(envelope.attempt))
    }
}

#[async_trait]
impl TopicHandler for SyncHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, envelope: &MessageEnvelope) -> Result<(), HandlerError> {
        let request = self.request(envelope).map_err(|e| {
            error!("Error processing {} update: {e}", self.record_type);
            Box::new(e) as HandlerError
        })?;
        let record_id = request.record_id.clone();

        match self.engine.sync(request).await {
            Ok(_) => {
                info!("Successfully processed {} update for {record_id}", self.record_type);
                Ok(())
            }
            Err(e) => {
                error!("Error processing {} update: {e}", self.record_type);
                Err(Box::new(e))
            }
        }
    }
}

/// Bind one [`SyncHandler`] per configured topic.
pub fn build_registry(engine: &SyncEngine, topics: &[TopicBinding]) -> DispatchRegistry {
    topics
        .iter()
        .fold(DispatchRegistry::builder(), |builder, binding| {
            builder.register(
                binding.topic.clone(),
                SyncHandler::new(&binding.record_type, engine.clone()),
            )
        })
        .build()
}

/// Create the engine for `store` with the configured schema and mapping.
pub fn build_engine(config: &Config, store: Arc<dyn SyncStore>) -> WorkerResult<SyncEngine> {
    let engine = SyncEngine::new(store).with_schema(config.schema.clone());
    match &config.mapping_path {
        Some(path) => Ok(engine.with_mapping(MappingCatalog::load(path)?)),
        None => Ok(engine),
    }
}

/// The consume loop wired to its handlers, under a supervisor.
pub struct Worker {
    consume: ConsumeLoop,
    supervisor: Supervisor,
}

impl Worker {
    /// `publisher` receives re-driven and dead-lettered messages; `None`
    /// disables failure routing.
    pub fn new(config: &Config, engine: &SyncEngine, publisher: Option<Arc<dyn Publisher>>) -> Self {
        let mut consume = ConsumeLoop::new(build_registry(engine, &config.topics));
        if let Some(publisher) = publisher {
            consume =
                consume.with_failure_router(FailureRouter::new(publisher, config.redrive.clone()));
        }

        Self {
            consume,
            supervisor: Supervisor::new(config.reconnect.clone()),
        }
    }

    #[must_use]
    pub fn consume_loop(&self) -> &ConsumeLoop {
        &self.consume
    }

    /// Consume until the supervisor gives up; returns the terminal error.
    pub async fn run<F: SourceFactory>(&self, factory: &F) -> WorkerError {
        info!(topics = ?self.consume.registry().topics(), "Salesforce sync worker starting");
        let error = self.supervisor.run(factory, &self.consume).await;
        error!(error = %error, "Salesforce sync worker stopped");
        WorkerError::Events(error)
    }
}
