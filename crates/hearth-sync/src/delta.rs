//! Staleness check for delta passes.

use chrono::{DateTime, Utc};
use hearth_db::SyncRecord;

use crate::fetcher::Resource;

/// Decides whether an incoming resource needs a write during a delta pass.
///
/// The remote controller's own clock is the staleness oracle: a stored
/// record is rewritten only when the resource reports a change strictly
/// after our last write. A resource that reports no timestamp at all is
/// always written.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaPolicy;

impl DeltaPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    #[must_use]
    pub fn should_sync<T: SyncRecord>(&self, incoming: &Resource, existing: Option<&T>) -> bool {
        match existing {
            None => true,
            Some(record) => is_newer(incoming.last_updated, record.last_synced_at()),
        }
    }
}

fn is_newer(last_updated: Option<DateTime<Utc>>, last_synced: DateTime<Utc>) -> bool {
    last_updated.map_or(true, |updated| updated > last_synced)
}
