//! Worker error types and exit codes.

use connectsync_engine::{MappingError, StoreError, SyncError};
use connectsync_events::EventError;
use thiserror::Error;

use crate::config::ConfigError;

/// Exit codes for the worker
/// - 0: Success
/// - 1: General error (including "record not found")
/// - 2: Configuration error
/// - 3: Broker or database connection error
pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Broker error: {0}")]
    Events(#[from] EventError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Database error: {0}")]
    Store(#[from] StoreError),

    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("{0} requires the `kafka` feature")]
    KafkaDisabled(&'static str),
}

impl WorkerError {
    pub fn exit_code(&self) -> i32 {
        match self {
            WorkerError::Config(_) | WorkerError::Mapping(_) | WorkerError::KafkaDisabled(_) => 2,
            WorkerError::Events(e) if e.is_config_error() => 2,
            WorkerError::Store(e) if e.is_connection_error() => 3,
            WorkerError::Events(_) => 3,
            WorkerError::Sync(_)
            | WorkerError::Store(_)
            | WorkerError::NotFound(_)
            | WorkerError::Validation(_) => 1,
        }
    }

    pub fn print(&self) {
        eprintln!("Error: {self}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(WorkerError::NotFound("003x0001".to_string()).exit_code(), 1);
        assert_eq!(
            WorkerError::Config(ConfigError::MissingVar("DATABASE_URL".to_string())).exit_code(),
            2
        );
        assert_eq!(
            WorkerError::Events(EventError::ConfigMissing {
                var: "KAFKA_URL".to_string()
            })
            .exit_code(),
            2
        );
        assert_eq!(WorkerError::Events(EventError::StreamClosed).exit_code(), 3);
    }

    #[test]
    fn test_store_exit_code_depends_on_connection() {
        let unreachable = StoreError::ConnectionFailed(sqlx::Error::PoolTimedOut);
        assert_eq!(WorkerError::Store(unreachable).exit_code(), 3);

        let corrupt = StoreError::CorruptRecord {
            sf_id: "003x0001".to_string(),
            reason: "unknown status done".to_string(),
        };
        assert_eq!(WorkerError::Store(corrupt).exit_code(), 1);
    }
}
