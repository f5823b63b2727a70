//! Reconciled data model.
//!
//! One module per kind. Every reconciled kind carries an internal id, an
//! external id unique within the kind and a `last_synced_at` timestamp.

pub mod automation;
pub mod device;
pub mod entity;
pub mod location;
pub mod scene;
pub mod script;
pub mod sync_run;

pub use automation::{Automation, AutomationConfig, AutomationFields};
pub use device::{Device, DeviceFields};
pub use entity::{Entity, EntityFields};
pub use location::{Location, LocationFields};
pub use scene::{Scene, SceneFields};
pub use script::{Script, ScriptConfig, ScriptFields};
pub use sync_run::{
    CapabilityGap, InvalidTransition, KindCounts, RunStatistics, RunStatus, SyncMode, SyncRun,
    SyncTrigger,
};

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kinds of record a pass reconciles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Location,
    Device,
    Entity,
    Automation,
    Script,
    Scene,
}

impl RecordKind {
    /// All kinds in reconciliation (dependency) order.
    pub const ALL: [RecordKind; 6] = [
        RecordKind::Location,
        RecordKind::Device,
        RecordKind::Entity,
        RecordKind::Automation,
        RecordKind::Script,
        RecordKind::Scene,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Location => "location",
            RecordKind::Device => "device",
            RecordKind::Entity => "entity",
            RecordKind::Automation => "automation",
            RecordKind::Script => "script",
            RecordKind::Scene => "scene",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
