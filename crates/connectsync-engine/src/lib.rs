//! # connectsync-engine
//!
//! Salesforce synchronization through Heroku Connect.
//!
//! Records received from the broker are inserted into the Heroku Connect
//! mapped tables (`<schema>.<object>`) with `_hc_lastop = 'PENDING'`, and every
//! attempt is tracked in the `salesforce_sync` audit table.
//!
//! ## Cargo Features
//!
//! - `integration`: Enable integration tests against a live Postgres
//!
//! ## Example
//!
//! ```rust,ignore
//! use connectsync_engine::{PgSyncStore, SyncEngine};
//! use std::sync::Arc;
//!
//! let store = PgSyncStore::connect(&database_url, 5).await?;
//! store.migrate().await?;
//!
//! let engine = SyncEngine::new(Arc::new(store));
//! let record = engine
//!     .sync_record("Contact", "003x0001", serde_json::json!({"Email": "a@b.com"}))
//!     .await?;
//! assert_eq!(record.sync_status.as_str(), "completed");
//! ```

pub mod destination;
pub mod engine;
pub mod error;
pub mod lock;
pub mod mapping;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;

pub use destination::{DestinationWrite, DEFAULT_SCHEMA};
pub use engine::{SyncEngine, SyncRequest};
pub use error::{DestinationError, MappingError, StoreError, SyncError};
pub use lock::KeyedLocks;
pub use mapping::MappingCatalog;
pub use memory::InMemorySyncStore;
pub use postgres::PgSyncStore;
pub use record::{SyncRecord, SyncStatus};
pub use store::{SyncStore, SyncUnit};
