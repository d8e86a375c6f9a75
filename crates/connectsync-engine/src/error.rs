//! Error types for the connectsync-engine crate.

use thiserror::Error;

use crate::record::SyncStatus;

/// Persistence errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to establish or acquire a database connection.
    #[error("Database connection failed: {0}")]
    ConnectionFailed(#[source] sqlx::Error),

    /// A database migration failed to apply.
    #[error("Migration failed: {0}")]
    MigrationFailed(#[source] sqlx::migrate::MigrateError),

    /// A database query failed to execute.
    #[error("Query failed: {0}")]
    QueryFailed(#[source] sqlx::Error),

    /// A stored row could not be mapped back to a record.
    #[error("Corrupt sync record {sf_id}: {reason}")]
    CorruptRecord { sf_id: String, reason: String },

    /// The store refused the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Check if this error indicates a connection problem.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(self, StoreError::ConnectionFailed(_))
    }
}

/// Reasons a destination write cannot be built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DestinationError {
    #[error("record data must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("record data has no fields to write")]
    EmptyData,

    #[error("field names {first} and {second} map to the same column")]
    DuplicateColumn { first: String, second: String },

    #[error("object {0} is not in the mapping")]
    UnmappedObject(String),

    #[error("field {field} is not mapped for object {object}")]
    UnmappedField { object: String, field: String },
}

/// Errors loading a mapping document.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("Failed to read mapping {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid mapping document: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Synchronization errors.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The destination write failed; the record was marked `error`.
    #[error("Failed to sync {record_type} record {record_id}: {cause}")]
    SyncFailure {
        record_type: String,
        record_id: String,
        cause: String,
    },

    /// The request cannot be synchronized at all.
    #[error("Invalid sync request: {0}")]
    InvalidRequest(String),

    /// A status change would move backwards.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: SyncStatus, to: SyncStatus },

    /// Reading sync state failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Returns true if the destination write failed.
    #[must_use]
    pub fn is_sync_failure(&self) -> bool {
        matches!(self, SyncError::SyncFailure { .. })
    }
}
