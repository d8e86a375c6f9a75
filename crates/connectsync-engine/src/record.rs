//! Sync audit records.
//!
//! One row per Salesforce id in `salesforce_sync`, tracking the outcome of
//! the latest attempt to push that record to the destination schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;

use crate::error::{StoreError, SyncError};

/// Status of a sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Completed,
    Error,
}

impl SyncStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Completed => "completed",
            SyncStatus::Error => "error",
        }
    }

    /// Whether moving from `self` to `next` keeps the lifecycle monotonic.
    ///
    /// Only `pending` may move, and only to a terminal status.
    #[must_use]
    pub fn can_transition_to(&self, next: SyncStatus) -> bool {
        matches!(
            (self, next),
            (SyncStatus::Pending, SyncStatus::Completed) | (SyncStatus::Pending, SyncStatus::Error)
        )
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SyncStatus::Pending)
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(SyncStatus::Pending),
            "completed" => Ok(SyncStatus::Completed),
            "error" => Ok(SyncStatus::Error),
            _ => Err(format!("Invalid sync status: {s}")),
        }
    }
}

/// Audit record of one sync attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRecord {
    /// Surrogate key, assigned on first persist.
    pub id: Option<i64>,
    /// Salesforce identifier.
    pub sf_id: String,
    /// Salesforce object type, e.g. `Contact`.
    pub object_type: String,
    pub sync_status: SyncStatus,
    /// Time of the latest status change.
    pub last_sync: DateTime<Utc>,
    pub error_message: Option<String>,
    /// Field payload as received.
    pub raw_data: JsonValue,
    /// Delivery attempt that produced this record.
    pub attempt: u32,
}

impl SyncRecord {
    /// A fresh pending record for an attempt starting now.
    pub fn pending(
        object_type: impl Into<String>,
        sf_id: impl Into<String>,
        raw_data: JsonValue,
        attempt: u32,
    ) -> Self {
        Self {
            id: None,
            sf_id: sf_id.into(),
            object_type: object_type.into(),
            sync_status: SyncStatus::Pending,
            last_sync: Utc::now(),
            error_message: None,
            raw_data,
            attempt,
        }
    }

    /// Move to `next`, refusing to reverse a terminal status.
    pub fn transition(&mut self, next: SyncStatus) -> Result<(), SyncError> {
        if !self.sync_status.can_transition_to(next) {
            return Err(SyncError::InvalidTransition {
                from: self.sync_status,
                to: next,
            });
        }
        self.sync_status = next;
        self.last_sync = Utc::now();
        Ok(())
    }

    pub fn mark_completed(&mut self) -> Result<(), SyncError> {
        self.transition(SyncStatus::Completed)?;
        self.error_message = None;
        Ok(())
    }

    pub fn mark_error(&mut self, message: impl Into<String>) -> Result<(), SyncError> {
        self.transition(SyncStatus::Error)?;
        self.error_message = Some(message.into());
        Ok(())
    }

    /// `(object_type, sf_id)` key used for per-record exclusion.
    #[must_use]
    pub fn lock_key(&self) -> String {
        lock_key(&self.object_type, &self.sf_id)
    }
}

/// Exclusion key for a record.
#[must_use]
pub fn lock_key(object_type: &str, sf_id: &str) -> String {
    format!("{object_type}:{sf_id}")
}

/// `salesforce_sync` row.
#[derive(Debug, Clone, FromRow)]
pub struct SyncRecordRow {
    pub id: i64,
    pub sf_id: String,
    pub object_type: String,
    pub sync_status: String,
    pub last_sync: DateTime<Utc>,
    pub error_message: Option<String>,
    pub raw_data: JsonValue,
    pub attempt: i32,
}

impl TryFrom<SyncRecordRow> for SyncRecord {
    type Error = StoreError;

    fn try_from(row: SyncRecordRow) -> Result<Self, Self::Error> {
        let sync_status = row
            .sync_status
            .parse()
            .map_err(|reason| StoreError::CorruptRecord {
                sf_id: row.sf_id.clone(),
                reason,
            })?;
        let attempt = u32::try_from(row.attempt).map_err(|_| StoreError::CorruptRecord {
            sf_id: row.sf_id.clone(),
            reason: format!("negative attempt {}", row.attempt),
        })?;

        Ok(Self {
            id: Some(row.id),
            sf_id: row.sf_id,
            object_type: row.object_type,
            sync_status,
            last_sync: row.last_sync,
            error_message: row.error_message,
            raw_data: row.raw_data,
            attempt,
        })
    }
}
