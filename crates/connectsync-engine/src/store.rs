//! Persistence seams for the sync engine.

use async_trait::async_trait;

use crate::destination::DestinationWrite;
use crate::error::StoreError;
use crate::record::SyncRecord;

/// Storage for sync records and destination writes.
#[async_trait]
pub trait SyncStore: Send + Sync {
    /// Open a unit of work holding the exclusion lock for `lock_key`.
    ///
    /// Nothing written through the unit is visible until it commits or
    /// fails, and the lock is held until then.
    async fn begin(&self, lock_key: &str) -> Result<Box<dyn SyncUnit>, StoreError>;

    /// Latest record for a Salesforce id.
    async fn find_by_sf_id(&self, sf_id: &str) -> Result<Option<SyncRecord>, StoreError>;
}

/// An open unit of work (a database transaction).
///
/// Dropping a unit without committing discards it.
#[async_trait]
pub trait SyncUnit: Send {
    /// Stage the record inside the unit.
    async fn stage(&mut self, record: &SyncRecord) -> Result<(), StoreError>;

    /// Execute a destination insert, returning the affected row count.
    async fn execute(&mut self, write: &DestinationWrite) -> Result<u64, StoreError>;

    /// Persist the final `record` and make the unit durable.
    async fn commit(self: Box<Self>, record: &SyncRecord) -> Result<SyncRecord, StoreError>;

    /// Discard staged work and destination writes, then persist the failed
    /// `record` before the lock is released.
    async fn fail(self: Box<Self>, record: &SyncRecord) -> Result<SyncRecord, StoreError>;
}
