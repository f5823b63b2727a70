//! Store capability.
//!
//! The reconciliation engine never talks to a database directly. It works
//! against [`RecordStore`] (one per reconciled kind) and [`RunStore`], so the
//! same engine runs over PostgreSQL in production and over
//! [`MemoryStore`](crate::memory::MemoryStore) in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::models::{Automation, Device, Entity, Location, RecordKind, Scene, Script, SyncRun};

/// A row reconciled against the remote controller, keyed by its external id.
pub trait SyncRecord: Clone + Send + Sync + 'static {
    /// Caller-supplied mutable part of the record.
    type Fields: Clone + PartialEq + Send + Sync + 'static;

    /// Kind tag, used in logs and errors.
    const KIND: RecordKind;

    /// Build a brand new record with a fresh internal id.
    fn create(external_id: String, fields: Self::Fields, synced_at: DateTime<Utc>) -> Self;

    /// Overwrite the mutable fields and refresh the sync timestamp.
    fn apply(&mut self, fields: Self::Fields, synced_at: DateTime<Utc>);

    /// Current mutable fields.
    fn fields(&self) -> Self::Fields;

    /// Internal identifier.
    fn id(&self) -> Uuid;

    /// External (natural) key.
    fn external_id(&self) -> &str;

    /// When this row was last written by a pass.
    fn last_synced_at(&self) -> DateTime<Utc>;
}

/// Reject records whose natural key is empty.
pub fn validate_external_id(kind: RecordKind, external_id: &str) -> DbResult<()> {
    if external_id.trim().is_empty() {
        return Err(DbError::ValidationFailed(format!(
            "{kind} record is missing its external_id"
        )));
    }
    Ok(())
}

/// Offset pagination for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub limit: i64,
    pub offset: i64,
}

impl PageRequest {
    /// Page of `limit` rows starting at `offset`.
    #[must_use]
    pub fn new(limit: i64, offset: i64) -> Self {
        Self {
            limit: limit.max(0),
            offset: offset.max(0),
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(100, 0)
    }
}

/// Persistence for one reconciled kind.
///
/// Rows are unique per external id. Batch operations are expected to be
/// a single round trip (or a single transaction) per call.
#[async_trait]
pub trait RecordStore<T: SyncRecord>: Send + Sync {
    /// Point lookup by internal id.
    async fn get(&self, id: Uuid) -> DbResult<Option<T>>;

    /// Point lookup by external id.
    async fn find_by_external_id(&self, external_id: &str) -> DbResult<Option<T>>;

    /// Resolve many external ids in one read. Unknown ids are omitted.
    async fn find_by_external_ids(&self, external_ids: &[String]) -> DbResult<Vec<T>>;

    /// List rows ordered by external id.
    async fn list(&self, page: PageRequest) -> DbResult<Vec<T>>;

    /// Number of rows.
    async fn count(&self) -> DbResult<u64>;

    /// Insert a single row.
    async fn insert(&self, record: &T) -> DbResult<()>;

    /// Insert many rows at once.
    async fn insert_batch(&self, records: &[T]) -> DbResult<()>;

    /// Overwrite existing rows matched by external id.
    async fn update_batch(&self, records: &[T]) -> DbResult<()>;

    /// Every external id currently stored.
    async fn external_ids(&self) -> DbResult<HashSet<String>>;

    /// Delete rows by external id, returning how many were removed.
    async fn delete_by_external_ids(&self, external_ids: &[String]) -> DbResult<u64>;
}

/// Persistence for run records.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Persist a new run.
    async fn create(&self, run: &SyncRun) -> DbResult<()>;

    /// Overwrite an existing run.
    async fn update(&self, run: &SyncRun) -> DbResult<()>;

    /// Lookup by id.
    async fn get(&self, id: Uuid) -> DbResult<Option<SyncRun>>;

    /// Most recent runs first.
    async fn list_recent(&self, limit: i64) -> DbResult<Vec<SyncRun>>;

    /// Runs still marked running for a zone.
    async fn list_running(&self, zone: &str) -> DbResult<Vec<SyncRun>>;
}

/// Every store the engine writes to, for one zone.
#[derive(Clone)]
pub struct SyncStores {
    pub locations: Arc<dyn RecordStore<Location>>,
    pub devices: Arc<dyn RecordStore<Device>>,
    pub entities: Arc<dyn RecordStore<Entity>>,
    pub automations: Arc<dyn RecordStore<Automation>>,
    pub scripts: Arc<dyn RecordStore<Script>>,
    pub scenes: Arc<dyn RecordStore<Scene>>,
    pub runs: Arc<dyn RunStore>,
}

impl std::fmt::Debug for SyncStores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncStores").finish_non_exhaustive()
    }
}
