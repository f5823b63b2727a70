//! Sync run model.
//!
//! Audit and status record of one reconciliation pass. A run is persisted
//! as soon as the pass starts, so a crash mid-pass leaves a `running` row
//! that can be inspected and later expired.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use super::RecordKind;

/// Kind of reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Rewrite every record the remote system reports.
    #[default]
    Full,
    /// Only write entities whose remote timestamp is newer than our copy.
    Delta,
    /// Only reconcile automations, scripts and scenes.
    RegistryOnly,
}

impl SyncMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Delta => "delta",
            Self::RegistryOnly => "registry_only",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "full" => Ok(Self::Full),
            "delta" => Ok(Self::Delta),
            "registry_only" => Ok(Self::RegistryOnly),
            _ => Err(format!("Unknown sync mode: {s}")),
        }
    }
}

/// What caused a pass to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    #[default]
    Manual,
    Scheduled,
    Startup,
    Api,
}

impl SyncTrigger {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Scheduled => "scheduled",
            Self::Startup => "startup",
            Self::Api => "api",
        }
    }
}

impl fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncTrigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "scheduled" => Ok(Self::Scheduled),
            "startup" => Ok(Self::Startup),
            "api" => Ok(Self::Api),
            _ => Err(format!("Unknown sync trigger: {s}")),
        }
    }
}

/// Status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Run is created but not started.
    Pending,
    /// Run is currently executing.
    Running,
    /// Run completed successfully.
    Completed,
    /// Run failed with error.
    Failed,
}

impl RunStatus {
    /// Check if this status is terminal (run has ended).
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Check if the state machine allows moving to `next`.
    #[must_use]
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Failed)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown run status: {s}")),
        }
    }
}

/// A capability the remote system did not provide during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityGap {
    /// No location registry; locations were inferred from attributes.
    LocationRegistry,
    /// No device registry; devices were inferred from attributes.
    DeviceRegistry,
    /// At least one automation configuration could not be fetched.
    AutomationConfig,
    /// At least one script configuration could not be fetched.
    ScriptConfig,
}

impl CapabilityGap {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocationRegistry => "location_registry",
            Self::DeviceRegistry => "device_registry",
            Self::AutomationConfig => "automation_config",
            Self::ScriptConfig => "script_config",
        }
    }
}

impl fmt::Display for CapabilityGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-kind counters of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindCounts {
    #[serde(default)]
    pub found: u32,
    #[serde(default)]
    pub added: u32,
    #[serde(default)]
    pub updated: u32,
    /// Rewritten with identical fields.
    #[serde(default)]
    pub unchanged: u32,
    /// Not written because the stored copy was already current.
    #[serde(default)]
    pub skipped: u32,
    #[serde(default)]
    pub removed: u32,
    #[serde(default)]
    pub enrichment_failed: u32,
}

impl KindCounts {
    /// Whether this pass changed anything for the kind.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.added > 0 || self.updated > 0 || self.removed > 0
    }

    /// Add another set of counters to this one.
    pub fn merge(&mut self, other: &KindCounts) {
        self.found += other.found;
        self.added += other.added;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.skipped += other.skipped;
        self.removed += other.removed;
        self.enrichment_failed += other.enrichment_failed;
    }
}

/// Statistics for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatistics {
    /// Resources returned by the remote listing.
    #[serde(default)]
    pub resources_found: u32,
    #[serde(default)]
    pub locations: KindCounts,
    #[serde(default)]
    pub devices: KindCounts,
    #[serde(default)]
    pub entities: KindCounts,
    #[serde(default)]
    pub automations: KindCounts,
    #[serde(default)]
    pub scripts: KindCounts,
    #[serde(default)]
    pub scenes: KindCounts,
}

impl RunStatistics {
    /// Create new empty statistics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters for a kind.
    #[must_use]
    pub fn kind(&self, kind: RecordKind) -> &KindCounts {
        match kind {
            RecordKind::Location => &self.locations,
            RecordKind::Device => &self.devices,
            RecordKind::Entity => &self.entities,
            RecordKind::Automation => &self.automations,
            RecordKind::Script => &self.scripts,
            RecordKind::Scene => &self.scenes,
        }
    }

    /// Mutable counters for a kind.
    pub fn kind_mut(&mut self, kind: RecordKind) -> &mut KindCounts {
        match kind {
            RecordKind::Location => &mut self.locations,
            RecordKind::Device => &mut self.devices,
            RecordKind::Entity => &mut self.entities,
            RecordKind::Automation => &mut self.automations,
            RecordKind::Script => &mut self.scripts,
            RecordKind::Scene => &mut self.scenes,
        }
    }

    /// Totals across every kind.
    #[must_use]
    pub fn totals(&self) -> KindCounts {
        let mut total = KindCounts::default();
        for kind in RecordKind::ALL {
            total.merge(self.kind(kind));
        }
        total
    }
}

/// Rejected run status change.
#[derive(Debug, Clone, Error)]
#[error("Invalid run state transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: RunStatus,
    pub to: RunStatus,
}

/// A reconciliation run record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: Uuid,
    /// Remote controller zone the pass ran against.
    pub zone: String,
    pub mode: SyncMode,
    pub status: RunStatus,
    pub trigger: SyncTrigger,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub statistics: RunStatistics,
    pub capability_gaps: BTreeSet<CapabilityGap>,
    pub error_message: Option<String>,
}

impl SyncRun {
    /// New run in `pending`.
    #[must_use]
    pub fn new(zone: impl Into<String>, mode: SyncMode, trigger: SyncTrigger) -> Self {
        Self {
            id: Uuid::new_v4(),
            zone: zone.into(),
            mode,
            status: RunStatus::Pending,
            trigger,
            started_at: Utc::now(),
            completed_at: None,
            statistics: RunStatistics::default(),
            capability_gaps: BTreeSet::new(),
            error_message: None,
        }
    }

    /// New run already in `running`.
    #[must_use]
    pub fn start(zone: impl Into<String>, mode: SyncMode, trigger: SyncTrigger) -> Self {
        let mut run = Self::new(zone, mode, trigger);
        run.status = RunStatus::Running;
        run
    }

    /// Move to `completed`, recording the final statistics.
    pub fn complete(
        &mut self,
        statistics: RunStatistics,
        gaps: BTreeSet<CapabilityGap>,
    ) -> Result<(), InvalidTransition> {
        self.transition(RunStatus::Completed)?;
        self.statistics = statistics;
        self.capability_gaps = gaps;
        Ok(())
    }

    /// Move to `failed` with an error message.
    pub fn fail(
        &mut self,
        message: impl Into<String>,
        statistics: RunStatistics,
        gaps: BTreeSet<CapabilityGap>,
    ) -> Result<(), InvalidTransition> {
        self.transition(RunStatus::Failed)?;
        self.error_message = Some(message.into());
        self.statistics = statistics;
        self.capability_gaps = gaps;
        Ok(())
    }

    /// Whether a `running` run has outlived `timeout` and should be treated as abandoned.
    #[must_use]
    pub fn is_abandoned(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.status == RunStatus::Running && now - self.started_at > timeout
    }

    /// Wall-clock duration, once finished.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.completed_at.map(|end| end - self.started_at)
    }

    fn transition(&mut self, next: RunStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }
}
