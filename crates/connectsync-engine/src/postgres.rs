//! Postgres-backed sync store.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool, Postgres, Transaction};
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::destination::DestinationWrite;
use crate::error::StoreError;
use crate::record::{SyncRecord, SyncRecordRow};
use crate::store::{SyncStore, SyncUnit};

const UPSERT_RECORD: &str = r"
    INSERT INTO salesforce_sync
        (sf_id, object_type, sync_status, last_sync, error_message, raw_data, attempt)
    VALUES ($1, $2, $3, $4, $5, $6, $7)
    ON CONFLICT (sf_id) DO UPDATE SET
        object_type = EXCLUDED.object_type,
        sync_status = EXCLUDED.sync_status,
        last_sync = EXCLUDED.last_sync,
        error_message = EXCLUDED.error_message,
        raw_data = EXCLUDED.raw_data,
        attempt = EXCLUDED.attempt
    RETURNING id, sf_id, object_type, sync_status, last_sync, error_message, raw_data, attempt
";

const SELECT_BY_SF_ID: &str = r"
    SELECT id, sf_id, object_type, sync_status, last_sync, error_message, raw_data, attempt
    FROM salesforce_sync
    WHERE sf_id = $1
";

// Taken right after the advisory lock, so a failed unit can undo its writes
// and still record the error under the lock.
const SAVEPOINT: &str = "SAVEPOINT sync_unit";
const ROLLBACK_TO_SAVEPOINT: &str = "ROLLBACK TO SAVEPOINT sync_unit";

/// Sync store over a Postgres pool.
#[derive(Debug, Clone)]
pub struct PgSyncStore {
    pool: PgPool,
}

impl PgSyncStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a connection pool for `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await
            .map_err(StoreError::ConnectionFailed)?;

        info!(max_connections, "Database connection pool established");
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run all pending migrations.
    ///
    /// Migrations are embedded at compile time from the `migrations/` directory.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        info!("Running database migrations...");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(StoreError::MigrationFailed)?;

        info!("Migrations completed successfully");
        Ok(())
    }
}

async fn upsert_record<'e, E>(executor: E, record: &SyncRecord) -> Result<SyncRecord, StoreError>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, SyncRecordRow>(UPSERT_RECORD)
        .bind(&record.sf_id)
        .bind(&record.object_type)
        .bind(record.sync_status.as_str())
        .bind(record.last_sync)
        .bind(&record.error_message)
        .bind(&record.raw_data)
        .bind(i32::try_from(record.attempt).unwrap_or(i32::MAX))
        .fetch_one(executor)
        .await
        .map_err(StoreError::QueryFailed)?;

    SyncRecord::try_from(row)
}

#[async_trait]
impl SyncStore for PgSyncStore {
    async fn begin(&self, lock_key: &str) -> Result<Box<dyn SyncUnit>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(StoreError::ConnectionFailed)?;

        // Serializes workers on the same record; released when the transaction ends.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(lock_key)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::QueryFailed)?;
        sqlx::query(SAVEPOINT)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::QueryFailed)?;

        debug!(lock_key, "Sync transaction started");
        Ok(Box::new(PgSyncUnit { tx }))
    }

    async fn find_by_sf_id(&self, sf_id: &str) -> Result<Option<SyncRecord>, StoreError> {
        let row = sqlx::query_as::<_, SyncRecordRow>(SELECT_BY_SF_ID)
            .bind(sf_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::QueryFailed)?;

        row.map(SyncRecord::try_from).transpose()
    }
}

/// A sync transaction.
pub struct PgSyncUnit {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl SyncUnit for PgSyncUnit {
    async fn stage(&mut self, record: &SyncRecord) -> Result<(), StoreError> {
        upsert_record(&mut *self.tx, record).await?;
        Ok(())
    }

    #[instrument(skip(self, write), fields(table = %write.qualified_table()))]
    async fn execute(&mut self, write: &DestinationWrite) -> Result<u64, StoreError> {
        let result = sqlx::query(&write.to_sql())
            .bind(Json(&write.row))
            .execute(&mut *self.tx)
            .await
            .map_err(StoreError::QueryFailed)?;

        debug!(rows = result.rows_affected(), "Destination row inserted");
        Ok(result.rows_affected())
    }

    async fn commit(mut self: Box<Self>, record: &SyncRecord) -> Result<SyncRecord, StoreError> {
        let saved = upsert_record(&mut *self.tx, record).await?;
        self.tx.commit().await.map_err(StoreError::QueryFailed)?;
        Ok(saved)
    }

    async fn fail(mut self: Box<Self>, record: &SyncRecord) -> Result<SyncRecord, StoreError> {
        sqlx::query(ROLLBACK_TO_SAVEPOINT)
            .execute(&mut *self.tx)
            .await
            .map_err(StoreError::QueryFailed)?;
        let saved = upsert_record(&mut *self.tx, record).await?;
        self.tx.commit().await.map_err(StoreError::QueryFailed)?;
        Ok(saved)
    }
}
