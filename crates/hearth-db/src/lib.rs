//! # hearth persistence
//!
//! Storage for the reconciled smart-home resource graph: locations, devices,
//! entities, automations, scripts, scenes and the run history of every
//! reconciliation pass.
//!
//! ## Backends
//!
//! - **PostgreSQL** ([`PgStore`]): one table per kind, unique `external_id`
//!   per table, foreign keys that null out when the referenced row goes away.
//! - **Memory** ([`MemoryStore`]): same contract, no database. Used by tests
//!   and dry runs.
//!
//! Both hand out a [`SyncStores`] bundle, which is all the engine sees.
//!
//! ## Example
//!
//! ```ignore
//! use hearth_db::PgStore;
//!
//! let store = PgStore::connect("postgres://localhost/hearth", 5).await?;
//! store.migrate().await?;
//! let stores = store.stores();
//! ```

pub mod attributes;
pub mod error;
pub mod memory;
pub mod migrations;
pub mod models;
pub mod postgres;
pub mod store;

pub use attributes::{AttrValue, AttributeBag};
pub use error::{DbError, DbResult};
pub use memory::{MemoryRunStore, MemoryStore, MemoryTable};
pub use migrations::run_migrations;
pub use models::*;
pub use postgres::{PgRecord, PgRunStore, PgStore, PgTable};
pub use store::{
    validate_external_id, PageRequest, RecordStore, RunStore, SyncRecord, SyncStores,
};
