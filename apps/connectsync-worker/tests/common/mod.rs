//! Common test utilities for worker tests.

#![allow(dead_code)]

use connectsync_engine::InMemorySyncStore;
use connectsync_events::InboundMessage;
use connectsync_worker::Config;
use serde_json::Value;
use std::collections::HashMap;

pub const CONTACT_TOPIC: &str = "salesforce.contact";
pub const ACCOUNT_TOPIC: &str = "salesforce.account";

/// Config with defaults and a placeholder database URL, plus `overrides`.
pub fn test_config(overrides: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = HashMap::new();
    vars.insert(
        "DATABASE_URL".to_string(),
        "postgresql://localhost/connectsync_test".to_string(),
    );
    vars.insert("RECONNECT_MAX_ATTEMPTS".to_string(), "0".to_string());
    for (k, v) in overrides {
        vars.insert((*k).to_string(), (*v).to_string());
    }
    Config::from_lookup(|name| vars.get(name).cloned()).unwrap()
}

/// Build a broker message carrying `value` as JSON.
pub fn message(topic: &str, value: Value) -> InboundMessage {
    InboundMessage::new(topic, serde_json::to_vec(&value).unwrap())
}

pub fn store() -> InMemorySyncStore {
    InMemorySyncStore::new()
}

/// Install a test subscriber once, so `RUST_LOG` works while debugging.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
