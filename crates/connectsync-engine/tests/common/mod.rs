//! Common test utilities for connectsync-engine.

#![allow(dead_code)]

use connectsync_engine::{InMemorySyncStore, MappingCatalog, SyncEngine};
use std::sync::{Arc, Once};

static INIT: Once = Once::new();

/// Initialize logging for tests (once).
pub fn init_test_logging() {
    INIT.call_once(|| {
        // Only initialize if RUST_LOG is set
        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .try_init()
                .ok();
        }
    });
}

/// Mapping shipped with the Heroku Connect add-on for Contact and Account.
pub const MAPPING_JSON: &str = r#"{
  "mappings": [
    {
      "object_name": "Contact",
      "config": {
        "access": "read_write",
        "sf_notify_enabled": true,
        "sf_polling_seconds": 600,
        "fields": {
          "Id": {}, "Email": {}, "FirstName": {}, "LastName": {}, "Phone": {}, "MailingAddress": {}
        },
        "indexes": {"Id": {"unique": true}, "Email": {"unique": true}}
      }
    },
    {
      "object_name": "Account",
      "config": {
        "access": "read_write",
        "sf_notify_enabled": true,
        "sf_polling_seconds": 600,
        "fields": {"Id": {}, "Name": {}, "Industry": {}, "BillingAddress": {}, "Phone": {}},
        "indexes": {"Id": {"unique": true}}
      }
    }
  ],
  "version": 1
}"#;

/// Engine over a fresh in-memory store.
pub fn memory_engine() -> (SyncEngine, InMemorySyncStore) {
    init_test_logging();
    let store = InMemorySyncStore::new();
    (SyncEngine::new(Arc::new(store.clone())), store)
}

/// Engine restricted to [`MAPPING_JSON`].
pub fn mapped_engine() -> (SyncEngine, InMemorySyncStore) {
    let (engine, store) = memory_engine();
    let mapping = MappingCatalog::from_json(MAPPING_JSON).unwrap();
    (engine.with_mapping(mapping), store)
}
