//! Automation model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::RecordKind;
use crate::store::SyncRecord;

/// Full trigger/condition/action configuration of an automation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutomationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub triggers: Vec<Value>,
    #[serde(default)]
    pub conditions: Vec<Value>,
    #[serde(default)]
    pub actions: Vec<Value>,
}

/// A synchronized automation definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Automation {
    pub id: Uuid,
    pub external_id: String,
    pub alias: String,
    pub state: Option<String>,
    /// Execution mode (`single`, `restart`, `queued`, `parallel`).
    pub mode: Option<String>,
    pub last_triggered: Option<DateTime<Utc>>,
    /// `None` when the configuration could not be fetched this pass.
    pub config: Option<AutomationConfig>,
    pub last_synced_at: DateTime<Utc>,
}

impl Automation {
    /// Whether the automation is currently enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.state.as_deref() == Some("on")
    }
}

/// Mutable fields of an automation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutomationFields {
    pub alias: String,
    pub state: Option<String>,
    pub mode: Option<String>,
    pub last_triggered: Option<DateTime<Utc>>,
    pub config: Option<AutomationConfig>,
}

impl SyncRecord for Automation {
    type Fields = AutomationFields;
    const KIND: RecordKind = RecordKind::Automation;

    fn create(external_id: String, fields: AutomationFields, synced_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            external_id,
            alias: fields.alias,
            state: fields.state,
            mode: fields.mode,
            last_triggered: fields.last_triggered,
            config: fields.config,
            last_synced_at: synced_at,
        }
    }

    fn apply(&mut self, fields: AutomationFields, synced_at: DateTime<Utc>) {
        self.alias = fields.alias;
        self.state = fields.state;
        self.mode = fields.mode;
        self.last_triggered = fields.last_triggered;
        self.config = fields.config;
        self.last_synced_at = synced_at;
    }

    fn fields(&self) -> AutomationFields {
        AutomationFields {
            alias: self.alias.clone(),
            state: self.state.clone(),
            mode: self.mode.clone(),
            last_triggered: self.last_triggered,
            config: self.config.clone(),
        }
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn external_id(&self) -> &str {
        &self.external_id
    }

    fn last_synced_at(&self) -> DateTime<Utc> {
        self.last_synced_at
    }
}
