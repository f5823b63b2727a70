//! Scene model. Scenes carry identity only, no payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::RecordKind;
use crate::store::SyncRecord;

/// A synchronized scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Scene {
    pub id: Uuid,
    pub external_id: String,
    pub alias: String,
    pub state: Option<String>,
    pub last_triggered: Option<DateTime<Utc>>,
    pub last_synced_at: DateTime<Utc>,
}

/// Mutable fields of a scene.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneFields {
    pub alias: String,
    pub state: Option<String>,
    pub last_triggered: Option<DateTime<Utc>>,
}

impl SyncRecord for Scene {
    type Fields = SceneFields;
    const KIND: RecordKind = RecordKind::Scene;

    fn create(external_id: String, fields: SceneFields, synced_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            external_id,
            alias: fields.alias,
            state: fields.state,
            last_triggered: fields.last_triggered,
            last_synced_at: synced_at,
        }
    }

    fn apply(&mut self, fields: SceneFields, synced_at: DateTime<Utc>) {
        self.alias = fields.alias;
        self.state = fields.state;
        self.last_triggered = fields.last_triggered;
        self.last_synced_at = synced_at;
    }

    fn fields(&self) -> SceneFields {
        SceneFields {
            alias: self.alias.clone(),
            state: self.state.clone(),
            last_triggered: self.last_triggered,
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
