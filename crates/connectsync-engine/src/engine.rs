//! Salesforce synchronization through Heroku Connect mapped tables.

use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::destination::{DestinationWrite, DEFAULT_SCHEMA};
use crate::error::SyncError;
use crate::lock::KeyedLocks;
use crate::mapping::MappingCatalog;
use crate::record::{lock_key, SyncRecord};
use crate::store::{SyncStore, SyncUnit};

/// One record to push to the destination schema.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRequest {
    pub record_type: String,
    pub record_id: String,
    pub data: JsonValue,
    /// Delivery attempt of the message that carried the record.
    pub attempt: u32,
}

impl SyncRequest {
    pub fn new(
        record_type: impl Into<String>,
        record_id: impl Into<String>,
        data: JsonValue,
    ) -> Self {
        Self {
            record_type: record_type.into(),
            record_id: record_id.into(),
            data,
            attempt: 1,
        }
    }

    #[must_use]
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }
}

/// Writes records into the mapped tables and tracks each attempt in
/// `salesforce_sync`.
///
/// Syncs for the same `(object_type, sf_id)` never overlap inside one
/// process; the store's unit lock extends that across processes.
#[derive(Clone)]
pub struct SyncEngine {
    store: Arc<dyn SyncStore>,
    schema: String,
    mapping: Option<Arc<MappingCatalog>>,
    locks: KeyedLocks,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("schema", &self.schema)
            .field("mapping", &self.mapping.is_some())
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    pub fn new(store: Arc<dyn SyncStore>) -> Self {
        Self {
            store,
            schema: DEFAULT_SCHEMA.to_string(),
            mapping: None,
            locks: KeyedLocks::new(),
        }
    }

    /// Write into `schema` instead of the default `salesforce`.
    #[must_use]
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Only allow objects and fields declared in `mapping`.
    #[must_use]
    pub fn with_mapping(mut self, mapping: MappingCatalog) -> Self {
        self.mapping = Some(Arc::new(mapping));
        self
    }

    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Synchronize one record on a first delivery.
    pub async fn sync_record(
        &self,
        record_type: &str,
        record_id: &str,
        data: JsonValue,
    ) -> Result<SyncRecord, SyncError> {
        self.sync(SyncRequest::new(record_type, record_id, data))
            .await
    }

    /// Synchronize one record.
    ///
    /// On success the completed record and the destination row commit
    /// together. On failure the destination write is undone, the record is
    /// persisted with status `error` under the same record lock, and
    /// [`SyncError::SyncFailure`] is returned.
    #[instrument(skip(self, request), fields(
        record_type = %request.record_type,
        record_id = %request.record_id,
        attempt = request.attempt
    ))]
    pub async fn sync(&self, request: SyncRequest) -> Result<SyncRecord, SyncError> {
        if request.record_type.trim().is_empty() {
            return Err(SyncError::InvalidRequest("record type is empty".to_string()));
        }
        if request.record_id.trim().is_empty() {
            return Err(SyncError::InvalidRequest("record id is empty".to_string()));
        }

        let key = lock_key(&request.record_type, &request.record_id);
        let _guard = self.locks.lock(&key).await;

        let pending = SyncRecord::pending(
            &request.record_type,
            &request.record_id,
            request.data.clone(),
            request.attempt,
        );

        let mut unit = match self.store.begin(&key).await {
            Ok(unit) => unit,
            Err(e) => return Err(self.fail(&key, None, pending, e.to_string(), request).await),
        };

        if let Err(cause) = self.write(unit.as_mut(), &pending, &request).await {
            return Err(self.fail(&key, Some(unit), pending, cause, request).await);
        }

        let mut completed = pending.clone();
        completed.mark_completed()?;
        match unit.commit(&completed).await {
            Ok(saved) => {
                info!(
                    "Successfully synced {} record {}",
                    request.record_type, request.record_id
                );
                Ok(saved)
            }
            Err(e) => Err(self.fail(&key, None, pending, e.to_string(), request).await),
        }
    }

    /// Latest sync record for a Salesforce id.
    pub async fn get_sync_status(&self, record_id: &str) -> Result<Option<SyncRecord>, SyncError> {
        Ok(self.store.find_by_sf_id(record_id).await?)
    }

    /// Record the failure through `unit`, or through a fresh unit when none
    /// is open, so the error status is written under the record lock.
    async fn fail(
        &self,
        key: &str,
        unit: Option<Box<dyn SyncUnit>>,
        mut record: SyncRecord,
        cause: String,
        request: SyncRequest,
    ) -> SyncError {
        error!(error = %cause, "Error syncing record");

        let persisted = match record.mark_error(cause.clone()) {
            Err(e) => Err(e.to_string()),
            Ok(()) => {
                let unit = match unit {
                    Some(unit) => Ok(unit),
                    None => self.store.begin(key).await,
                };
                match unit {
                    Ok(unit) => unit.fail(&record).await.map_err(|e| e.to_string()),
                    Err(e) => Err(e.to_string()),
                }
            }
        };
        if let Err(e) = persisted {
            error!(error = %e, "Failed to persist error status");
        }

        SyncError::SyncFailure {
            record_type: request.record_type,
            record_id: request.record_id,
            cause,
        }
    }

    async fn write(
        &self,
        unit: &mut dyn SyncUnit,
        pending: &SyncRecord,
        request: &SyncRequest,
    ) -> Result<(), String> {
        unit.stage(pending).await.map_err(|e| e.to_string())?;

        let write = DestinationWrite::build(&self.schema, &request.record_type, &request.data)
            .map_err(|e| e.to_string())?;
        if let Some(mapping) = &self.mapping {
            mapping
                .check(&request.record_type, data_fields(&request.data))
                .map_err(|e| e.to_string())?;
        }

        unit.execute(&write).await.map_err(|e| e.to_string())?;
        Ok(())
    }
}

fn data_fields(data: &JsonValue) -> impl Iterator<Item = &str> {
    data.as_object()
        .into_iter()
        .flat_map(|fields| fields.keys().map(String::as_str))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemorySyncStore;
    use crate::record::SyncStatus;
    use serde_json::json;

    fn engine(store: &InMemorySyncStore) -> SyncEngine {
        SyncEngine::new(Arc::new(store.clone()))
    }

    #[tokio::test]
    async fn test_successful_sync_commits_record_and_row() {
        let store = InMemorySyncStore::new();
        let record = engine(&store)
            .sync_record("Contact", "003x0001", json!({"Email": "a@b.com"}))
            .await
            .unwrap();

        assert_eq!(record.sync_status, SyncStatus::Completed);
        assert_eq!(record.object_type, "Contact");
        assert!(record.id.is_some());
        assert_eq!(store.writes().len(), 1);
        assert_eq!(store.writes()[0].table, "contact");
    }

    #[tokio::test]
    async fn test_failed_write_is_recorded_and_reraised() {
        let store = InMemorySyncStore::new();
        store.set_write_failure(Some("connection refused".to_string()));

        let err = engine(&store)
            .sync_record("Account", "001x0001", json!({"Name": "Acme"}))
            .await
            .unwrap_err();

        assert!(matches!(
            &err,
            SyncError::SyncFailure { record_type, record_id, cause }
                if record_type == "Account" && record_id == "001x0001" && cause.contains("connection refused")
        ));
        let stored = store.records();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].sync_status, SyncStatus::Error);
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_empty_request_fields_are_rejected() {
        let store = InMemorySyncStore::new();
        let err = engine(&store)
            .sync_record("Contact", " ", json!({"Email": "a@b.com"}))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidRequest(_)));
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn test_schema_override() {
        let store = InMemorySyncStore::new();
        let engine = engine(&store).with_schema("hc");
        assert_eq!(engine.schema(), "hc");

        engine
            .sync(SyncRequest::new("Contact", "003x0001", json!({"Email": "a@b.com"})).with_attempt(2))
            .await
            .unwrap();

        assert_eq!(store.writes()[0].schema, "hc");
        assert_eq!(store.records()[0].attempt, 2);
    }
}
