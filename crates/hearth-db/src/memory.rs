//! In-memory store.
//!
//! Implements the store capability without a database. Used by the test
//! suites and by the CLI's `--memory` mode for dry runs against a snapshot.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::models::{Automation, Device, Entity, Location, RunStatus, Scene, Script, SyncRun};
use crate::store::{
    validate_external_id, PageRequest, RecordStore, RunStore, SyncRecord, SyncStores,
};

/// One kind's rows, keyed (and ordered) by external id.
#[derive(Debug)]
pub struct MemoryTable<T: SyncRecord> {
    rows: RwLock<BTreeMap<String, T>>,
}

impl<T: SyncRecord> MemoryTable<T> {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
        }
    }

    /// Snapshot of every row, ordered by external id.
    pub async fn all(&self) -> Vec<T> {
        self.rows.read().await.values().cloned().collect()
    }
}

impl<T: SyncRecord> Default for MemoryTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: SyncRecord> RecordStore<T> for MemoryTable<T> {
    async fn get(&self, id: Uuid) -> DbResult<Option<T>> {
        let rows = self.rows.read().await;
        Ok(rows.values().find(|r| r.id() == id).cloned())
    }

    async fn find_by_external_id(&self, external_id: &str) -> DbResult<Option<T>> {
        Ok(self.rows.read().await.get(external_id).cloned())
    }

    async fn find_by_external_ids(&self, external_ids: &[String]) -> DbResult<Vec<T>> {
        let rows = self.rows.read().await;
        Ok(external_ids
            .iter()
            .filter_map(|key| rows.get(key).cloned())
            .collect())
    }

    async fn list(&self, page: PageRequest) -> DbResult<Vec<T>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .skip(usize::try_from(page.offset).unwrap_or(0))
            .take(usize::try_from(page.limit).unwrap_or(0))
            .cloned()
            .collect())
    }

    async fn count(&self) -> DbResult<u64> {
        Ok(self.rows.read().await.len() as u64)
    }

    async fn insert(&self, record: &T) -> DbResult<()> {
        self.insert_batch(std::slice::from_ref(record)).await
    }

    async fn insert_batch(&self, records: &[T]) -> DbResult<()> {
        let mut rows = self.rows.write().await;
        let mut seen = HashSet::new();
        for record in records {
            validate_external_id(T::KIND, record.external_id())?;
            if rows.contains_key(record.external_id()) || !seen.insert(record.external_id()) {
                return Err(DbError::ValidationFailed(format!(
                    "duplicate {} external_id: {}",
                    T::KIND,
                    record.external_id()
                )));
            }
        }
        for record in records {
            rows.insert(record.external_id().to_string(), record.clone());
        }
        Ok(())
    }

    async fn update_batch(&self, records: &[T]) -> DbResult<()> {
        let mut rows = self.rows.write().await;
        if let Some(missing) = records
            .iter()
            .find(|r| !rows.contains_key(r.external_id()))
        {
            return Err(DbError::NotFound(format!(
                "{} {}",
                T::KIND,
                missing.external_id()
            )));
        }
        for record in records {
            rows.insert(record.external_id().to_string(), record.clone());
        }
        Ok(())
    }

    async fn external_ids(&self) -> DbResult<HashSet<String>> {
        Ok(self.rows.read().await.keys().cloned().collect())
    }

    async fn delete_by_external_ids(&self, external_ids: &[String]) -> DbResult<u64> {
        if external_ids.is_empty() {
            return Ok(0);
        }
        let mut rows = self.rows.write().await;
        let removed = external_ids
            .iter()
            .filter(|key| rows.remove(key.as_str()).is_some())
            .count();
        Ok(removed as u64)
    }
}

/// Run records held in memory.
#[derive(Debug, Default)]
pub struct MemoryRunStore {
    runs: RwLock<HashMap<Uuid, SyncRun>>,
}

impl MemoryRunStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn create(&self, run: &SyncRun) -> DbResult<()> {
        let mut runs = self.runs.write().await;
        if runs.contains_key(&run.id) {
            return Err(DbError::ValidationFailed(format!(
                "sync run {} already exists",
                run.id
            )));
        }
        runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn update(&self, run: &SyncRun) -> DbResult<()> {
        let mut runs = self.runs.write().await;
        match runs.get_mut(&run.id) {
            Some(existing) => {
                *existing = run.clone();
                Ok(())
            }
            None => Err(DbError::NotFound(format!("sync run {}", run.id))),
        }
    }

    async fn get(&self, id: Uuid) -> DbResult<Option<SyncRun>> {
        Ok(self.runs.read().await.get(&id).cloned())
    }

    async fn list_recent(&self, limit: i64) -> DbResult<Vec<SyncRun>> {
        let mut runs: Vec<SyncRun> = self.runs.read().await.values().cloned().collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(runs)
    }

    async fn list_running(&self, zone: &str) -> DbResult<Vec<SyncRun>> {
        let mut runs: Vec<SyncRun> = self
            .runs
            .read()
            .await
            .values()
            .filter(|r| r.zone == zone && r.status == RunStatus::Running)
            .cloned()
            .collect();
        runs.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(runs)
    }
}

/// A complete in-memory store for one zone.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    pub locations: Arc<MemoryTable<Location>>,
    pub devices: Arc<MemoryTable<Device>>,
    pub entities: Arc<MemoryTable<Entity>>,
    pub automations: Arc<MemoryTable<Automation>>,
    pub scripts: Arc<MemoryTable<Script>>,
    pub scenes: Arc<MemoryTable<Scene>>,
    pub runs: Arc<MemoryRunStore>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store handles for the engine, sharing this store's tables.
    #[must_use]
    pub fn stores(&self) -> SyncStores {
        SyncStores {
            locations: self.locations.clone(),
            devices: self.devices.clone(),
            entities: self.entities.clone(),
            automations: self.automations.clone(),
            scripts: self.scripts.clone(),
            scenes: self.scenes.clone(),
            runs: self.runs.clone(),
        }
    }
}
