//! Common test utilities for consume loop tests.
//!
//! Everything runs against the in-memory broker doubles.

#![allow(dead_code)]

use connectsync_events::{handler_fn, HandlerError, InboundMessage, TopicHandler};
use serde_json::Value;
use std::sync::{Arc, Mutex};

pub const CONTACT_TOPIC: &str = "salesforce.contact";
pub const ACCOUNT_TOPIC: &str = "salesforce.account";

/// Build a broker message carrying `value` as JSON.
pub fn message(topic: &str, value: Value) -> InboundMessage {
    InboundMessage::new(topic, serde_json::to_vec(&value).unwrap())
}

/// Shared log of handler invocations.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }
}

/// Handler that records `<label>:<id>` for every envelope.
pub fn recording(log: &CallLog, label: &'static str) -> impl TopicHandler {
    let log = log.clone();
    handler_fn(label, move |envelope| {
        let log = log.clone();
        async move {
            let id = envelope.str_field("id").unwrap_or("-").to_string();
            log.push(format!("{label}:{id}"));
            Ok(())
        }
    })
}

/// Handler that always fails with `cause`.
pub fn failing(label: &'static str, cause: &'static str) -> impl TopicHandler {
    handler_fn(label, move |_| async move { Err::<(), HandlerError>(cause.into()) })
}

/// Install a test subscriber once, so `RUST_LOG` works while debugging.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
