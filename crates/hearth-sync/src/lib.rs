//! # hearth reconciliation engine
//!
//! Keeps the local store's copy of a smart-home controller's resource graph
//! in step with what the controller reports.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   list_resources   ┌──────────────────────────┐
//! │  Fetcher  │───────────────────►│ ReconciliationOrchestrator│
//! └─────┬─────┘                    └────────────┬─────────────┘
//!       │ registries / configs                  │
//!       ▼                                       ▼
//! ┌──────────────────┐  ┌────────────────┐  ┌──────────────┐
//! │RelationshipInferer│  │ ConfigEnricher │  │ UpsertStore<T>│──► RecordStore<T>
//! └──────────────────┘  └────────────────┘  └──────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use hearth_db::{MemoryStore, SyncTrigger};
//! use hearth_sync::{ReconciliationOrchestrator, SnapshotFetcher, SyncConfig};
//!
//! let store = MemoryStore::new();
//! let fetcher = Arc::new(SnapshotFetcher::new("snapshot.json"));
//! let orchestrator = ReconciliationOrchestrator::new(fetcher, store.stores(), SyncConfig::default());
//! let run = orchestrator.run_full(SyncTrigger::Manual).await?;
//! println!("{} entities added", run.statistics.entities.added);
//! ```

pub mod config;
pub mod delta;
pub mod enricher;
pub mod error;
pub mod fetcher;
pub mod inference;
pub mod orchestrator;
pub mod snapshot;
pub mod statistics;
pub mod upsert;

pub use config::SyncConfig;
pub use delta::DeltaPolicy;
pub use enricher::{ConfigEnricher, Enrichment};
pub use error::{SyncError, SyncResult};
pub use fetcher::{
    DeviceRecord, FetchError, FetchResult, Fetcher, LocationRecord, Resource, ResourceKind,
};
pub use inference::RelationshipInferer;
pub use orchestrator::ReconciliationOrchestrator;
pub use snapshot::{Snapshot, SnapshotFetcher};
pub use statistics::StatisticsTracker;
pub use upsert::{BatchOutcome, UpsertStore};
