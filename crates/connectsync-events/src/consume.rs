//! Consume-dispatch-commit loop.

use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::dispatch::{DispatchOutcome, DispatchRegistry};
use crate::envelope::InboundMessage;
use crate::error::EventError;
use crate::redrive::{FailureRouter, Route};
use crate::source::MessageSource;

/// What happened to one message before its offset was committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Processed {
    /// Handlers ran; `route` is set when failed work was re-driven.
    Dispatched {
        outcome: DispatchOutcome,
        route: Option<Route>,
    },
    /// The payload could not be decoded.
    Undecodable { route: Option<Route> },
}

/// The reason a consume loop stopped.
#[derive(Debug)]
pub struct LoopFault {
    pub error: EventError,
    /// Messages committed before the fault.
    pub processed: u64,
}

/// Sequential consume-dispatch-commit loop.
///
/// Each message is dispatched to completion (handlers run one after another)
/// and only then committed, so a crash before commit causes redelivery.
#[derive(Clone)]
pub struct ConsumeLoop {
    registry: Arc<DispatchRegistry>,
    router: Option<FailureRouter>,
}

impl ConsumeLoop {
    pub fn new(registry: DispatchRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            router: None,
        }
    }

    /// Route failed handler work through `router` before committing.
    #[must_use]
    pub fn with_failure_router(mut self, router: FailureRouter) -> Self {
        self.router = Some(router);
        self
    }

    #[must_use]
    pub fn registry(&self) -> &DispatchRegistry {
        &self.registry
    }

    /// Run until the source faults.
    ///
    /// Handler failures never stop the loop. Transport faults (receive,
    /// commit, re-drive publish) do, and are returned with the number of
    /// messages committed so far.
    #[instrument(skip_all)]
    pub async fn run<S: MessageSource + ?Sized>(&self, source: &mut S) -> LoopFault {
        info!(topics = ?self.registry.topics(), "Starting consumer loop");
        let mut processed = 0u64;

        loop {
            let message = match source.recv().await {
                Ok(message) => message,
                Err(error) => {
                    error!(error = %error, processed, "Error receiving message");
                    return LoopFault { error, processed };
                }
            };

            match self.process(source, &message).await {
                Ok(_) => processed += 1,
                Err(error) => {
                    error!(
                        topic = %message.topic,
                        error = %error,
                        processed,
                        "Message left uncommitted"
                    );
                    return LoopFault { error, processed };
                }
            }
        }
    }

    /// Dispatch one message, route failures, then commit its offset.
    pub async fn process<S: MessageSource + ?Sized>(
        &self,
        source: &mut S,
        message: &InboundMessage,
    ) -> Result<Processed, EventError> {
        let processed = match message.decode() {
            Ok(envelope) => {
                debug!(
                    topic = %envelope.topic,
                    key = ?envelope.key,
                    attempt = envelope.attempt,
                    "Received message"
                );

                let outcome = self.registry.dispatch(&envelope).await;
                let route = match (&self.router, outcome.is_success()) {
                    (Some(router), false) => {
                        Some(router.route_failure(message, &outcome.failures).await?)
                    }
                    _ => None,
                };

                Processed::Dispatched { outcome, route }
            }
            Err(e) => {
                warn!(topic = %message.topic, error = %e, "Dropping undecodable message");
                let route = match &self.router {
                    Some(router) => Some(router.route_undecodable(message, &e).await?),
                    None => None,
                };

                Processed::Undecodable { route }
            }
        };

        source.commit(message).await?;
        Ok(processed)
    }
}
