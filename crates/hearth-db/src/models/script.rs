//! Script model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::RecordKind;
use crate::store::SyncRecord;

/// Step sequence and parameter schema of a script.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Ordered steps.
    #[serde(default)]
    pub sequence: Vec<Value>,
    /// Parameter schema keyed by parameter name.
    #[serde(default)]
    pub fields: Map<String, Value>,
}

/// A synchronized script definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub id: Uuid,
    pub external_id: String,
    pub alias: String,
    pub state: Option<String>,
    pub mode: Option<String>,
    pub last_triggered: Option<DateTime<Utc>>,
    /// `None` when the configuration could not be fetched this pass.
    pub config: Option<ScriptConfig>,
    pub last_synced_at: DateTime<Utc>,
}

/// Mutable fields of a script.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptFields {
    pub alias: String,
    pub state: Option<String>,
    pub mode: Option<String>,
    pub last_triggered: Option<DateTime<Utc>>,
    pub config: Option<ScriptConfig>,
}

impl SyncRecord for Script {
    type Fields = ScriptFields;
    const KIND: RecordKind = RecordKind::Script;

    fn create(external_id: String, fields: ScriptFields, synced_at: DateTime<Utc>) -> Self {
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

    fn apply(&mut self, fields: ScriptFields, synced_at: DateTime<Utc>) {
        self.alias = fields.alias;
        self.state = fields.state;
        self.mode = fields.mode;
        self.last_triggered = fields.last_triggered;
        self.config = fields.config;
        self.last_synced_at = synced_at;
    }

    fn fields(&self) -> ScriptFields {
        ScriptFields {
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
