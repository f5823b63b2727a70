//! Natural-key upsert over one reconciled kind.
//!
//! [`UpsertStore::upsert_batch`] resolves every external id with one read,
//! then issues one bulk insert and one batched update, so reconciling
//! hundreds of resources costs a handful of round trips.

use chrono::Utc;
use hearth_db::{validate_external_id, RecordStore, SyncRecord};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::error::SyncResult;

/// Result of an [`UpsertStore::upsert_batch`] call.
#[derive(Debug, Clone)]
pub struct BatchOutcome<T> {
    /// Written records, in input order (one per distinct key).
    pub records: Vec<T>,
    pub created: u32,
    /// Existing rows whose fields changed.
    pub updated: u32,
    /// Existing rows rewritten with identical fields.
    pub unchanged: u32,
}

impl<T> Default for BatchOutcome<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            created: 0,
            updated: 0,
            unchanged: 0,
        }
    }
}

impl<T: SyncRecord> BatchOutcome<T> {
    /// External id → internal id of every written record.
    #[must_use]
    pub fn id_map(&self) -> HashMap<String, Uuid> {
        self.records
            .iter()
            .map(|r| (r.external_id().to_string(), r.id()))
            .collect()
    }
}

/// Upsert, batch and delete primitive for one kind.
pub struct UpsertStore<T: SyncRecord> {
    store: Arc<dyn RecordStore<T>>,
}

impl<T: SyncRecord> Clone for UpsertStore<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<T: SyncRecord> UpsertStore<T> {
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore<T>>) -> Self {
        Self { store }
    }

    /// Create or overwrite the record for `external_id`.
    ///
    /// Returns the written record and whether it was created.
    pub async fn upsert(&self, external_id: &str, fields: T::Fields) -> SyncResult<(T, bool)> {
        validate_external_id(T::KIND, external_id)?;
        let now = Utc::now();

        match self.store.find_by_external_id(external_id).await? {
            Some(mut existing) => {
                existing.apply(fields, now);
                self.store
                    .update_batch(std::slice::from_ref(&existing))
                    .await?;
                Ok((existing, false))
            }
            None => {
                let record = T::create(external_id.to_string(), fields, now);
                self.store.insert(&record).await?;
                Ok((record, true))
            }
        }
    }

    /// Create or overwrite many records at once.
    ///
    /// Every key is validated before anything is written. When a key
    /// appears more than once, the last occurrence wins.
    pub async fn upsert_batch(
        &self,
        items: Vec<(String, T::Fields)>,
    ) -> SyncResult<BatchOutcome<T>> {
        for (external_id, _) in &items {
            validate_external_id(T::KIND, external_id)?;
        }

        let mut order: Vec<String> = Vec::with_capacity(items.len());
        let mut latest: HashMap<String, T::Fields> = HashMap::with_capacity(items.len());
        for (external_id, fields) in items {
            if latest.insert(external_id.clone(), fields).is_none() {
                order.push(external_id);
            }
        }
        if order.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let mut existing: HashMap<String, T> = self
            .store
            .find_by_external_ids(&order)
            .await?
            .into_iter()
            .map(|r| (r.external_id().to_string(), r))
            .collect();

        let now = Utc::now();
        let mut outcome = BatchOutcome::default();
        let mut inserts = Vec::new();
        let mut updates = Vec::new();

        for external_id in order {
            let Some(fields) = latest.remove(&external_id) else {
                continue;
            };
            match existing.remove(&external_id) {
                Some(mut record) => {
                    if record.fields() == fields {
                        outcome.unchanged += 1;
                    } else {
                        outcome.updated += 1;
                    }
                    record.apply(fields, now);
                    updates.push(record.clone());
                    outcome.records.push(record);
                }
                None => {
                    let record = T::create(external_id, fields, now);
                    outcome.created += 1;
                    inserts.push(record.clone());
                    outcome.records.push(record);
                }
            }
        }

        if !inserts.is_empty() {
            self.store.insert_batch(&inserts).await?;
        }
        if !updates.is_empty() {
            self.store.update_batch(&updates).await?;
        }

        debug!(
            kind = %T::KIND,
            created = outcome.created,
            updated = outcome.updated,
            unchanged = outcome.unchanged,
            "Upserted batch"
        );
        Ok(outcome)
    }

    /// Every external id currently stored for the kind.
    pub async fn external_ids(&self) -> SyncResult<HashSet<String>> {
        Ok(self.store.external_ids().await?)
    }

    /// Existing records for `external_ids`, keyed by external id.
    pub async fn find_many(&self, external_ids: &[String]) -> SyncResult<HashMap<String, T>> {
        if external_ids.is_empty() {
            return Ok(HashMap::new());
        }
        Ok(self
            .store
            .find_by_external_ids(external_ids)
            .await?
            .into_iter()
            .map(|r| (r.external_id().to_string(), r))
            .collect())
    }

    /// Delete by external id. An empty input costs no round trip.
    pub async fn delete_by_external_ids(&self, external_ids: &[String]) -> SyncResult<u64> {
        if external_ids.is_empty() {
            return Ok(0);
        }
        Ok(self.store.delete_by_external_ids(external_ids).await?)
    }

    /// Delete every stored record whose key is not in `current`.
    ///
    /// Returns the number of rows removed.
    pub async fn remove_vanished(&self, current: &HashSet<String>) -> SyncResult<u64> {
        let mut vanished: Vec<String> = self
            .external_ids()
            .await?
            .into_iter()
            .filter(|key| !current.contains(key))
            .collect();
        vanished.sort();
        self.delete_by_external_ids(&vanished).await
    }
}
