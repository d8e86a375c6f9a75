//! Topic dispatch registry.
//!
//! Maps topic names to ordered handler lists. The registry is assembled once
//! through [`DispatchRegistryBuilder`] and is immutable afterwards, so each
//! consume loop (and each test) owns its own isolated set of bindings.

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error};

use crate::envelope::MessageEnvelope;

/// Error type returned by handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Trait for handling messages of one topic.
#[async_trait]
pub trait TopicHandler: Send + Sync + 'static {
    /// Name used in logs and failure reports.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Handle a message.
    ///
    /// Return Ok(()) if processing succeeded, Err if it failed.
    async fn handle(&self, envelope: &MessageEnvelope) -> Result<(), HandlerError>;
}

/// Adapter turning an async closure into a [`TopicHandler`].
pub struct FnHandler<F> {
    name: String,
    f: F,
}

/// Wrap an async closure as a named handler.
pub fn handler_fn<F, Fut>(name: impl Into<String>, f: F) -> FnHandler<F>
where
    F: Fn(MessageEnvelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    FnHandler {
        name: name.into(),
        f,
    }
}

#[async_trait]
impl<F, Fut> TopicHandler for FnHandler<F>
where
    F: Fn(MessageEnvelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, envelope: &MessageEnvelope) -> Result<(), HandlerError> {
        (self.f)(envelope.clone()).await
    }
}

/// A handler failure caught at the dispatch boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    pub handler: String,
    pub error: String,
}

/// Result of dispatching one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Number of handlers invoked.
    pub invoked: usize,
    /// Failures, in invocation order.
    pub failures: Vec<HandlerFailure>,
}

impl DispatchOutcome {
    /// True when every invoked handler succeeded (or none was bound).
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Immutable topic -> handlers mapping.
#[derive(Clone, Default)]
pub struct DispatchRegistry {
    bindings: HashMap<String, Vec<Arc<dyn TopicHandler>>>,
}

impl std::fmt::Debug for DispatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (topic, handlers) in &self.bindings {
            let names: Vec<&str> = handlers.iter().map(|h| h.name()).collect();
            map.entry(topic, &names);
        }
        map.finish()
    }
}

impl DispatchRegistry {
    #[must_use]
    pub fn builder() -> DispatchRegistryBuilder {
        DispatchRegistryBuilder::default()
    }

    /// Topics with at least one handler, sorted.
    #[must_use]
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.bindings.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Handlers bound to `topic`, in registration order.
    #[must_use]
    pub fn handlers_for(&self, topic: &str) -> &[Arc<dyn TopicHandler>] {
        self.bindings
            .get(topic)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Invoke every handler bound to the envelope's topic, sequentially.
    ///
    /// A failing handler does not stop the ones registered after it.
    pub async fn dispatch(&self, envelope: &MessageEnvelope) -> DispatchOutcome {
        let handlers = self.handlers_for(&envelope.topic);
        let mut outcome = DispatchOutcome::default();

        if handlers.is_empty() {
            debug!(topic = %envelope.topic, "No handlers bound, skipping message");
            return outcome;
        }

        for handler in handlers {
            outcome.invoked += 1;
            if let Err(e) = handler.handle(envelope).await {
                error!(
                    topic = %envelope.topic,
                    handler = %handler.name(),
                    attempt = envelope.attempt,
                    error = %e,
                    "Handler failed"
                );
                outcome.failures.push(HandlerFailure {
                    handler: handler.name().to_string(),
                    error: e.to_string(),
                });
            }
        }

        outcome
    }
}

/// Builder collecting handler registrations.
#[derive(Default)]
pub struct DispatchRegistryBuilder {
    bindings: HashMap<String, Vec<Arc<dyn TopicHandler>>>,
}

impl DispatchRegistryBuilder {
    /// Append `handler` to `topic`'s binding list.
    ///
    /// Registering the same handler twice makes it run twice.
    #[must_use]
    pub fn register<H: TopicHandler>(self, topic: impl Into<String>, handler: H) -> Self {
        self.register_shared(topic, Arc::new(handler))
    }

    /// Append an already shared handler.
    #[must_use]
    pub fn register_shared(
        mut self,
        topic: impl Into<String>,
        handler: Arc<dyn TopicHandler>,
    ) -> Self {
        self.bindings.entry(topic.into()).or_default().push(handler);
        self
    }

    #[must_use]
    pub fn build(self) -> DispatchRegistry {
        DispatchRegistry {
            bindings: self.bindings,
        }
    }
}
