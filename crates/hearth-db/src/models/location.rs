//! Location model.
//!
//! A room, floor or other area of the home as known to the remote controller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::RecordKind;
use crate::store::SyncRecord;

/// A synchronized location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Location {
    pub id: Uuid,
    pub external_id: String,
    pub name: String,
    /// Grouping above this location (e.g. a floor id), as reported remotely.
    pub parent_id: Option<String>,
    pub icon: Option<String>,
    pub last_synced_at: DateTime<Utc>,
}

/// Mutable fields of a location.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationFields {
    pub name: String,
    pub parent_id: Option<String>,
    pub icon: Option<String>,
}

impl LocationFields {
    /// Location with only a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

impl SyncRecord for Location {
    type Fields = LocationFields;
    const KIND: RecordKind = RecordKind::Location;

    fn create(external_id: String, fields: LocationFields, synced_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            external_id,
            name: fields.name,
            parent_id: fields.parent_id,
            icon: fields.icon,
            last_synced_at: synced_at,
        }
    }

    fn apply(&mut self, fields: LocationFields, synced_at: DateTime<Utc>) {
        self.name = fields.name;
        self.parent_id = fields.parent_id;
        self.icon = fields.icon;
        self.last_synced_at = synced_at;
    }

    fn fields(&self) -> LocationFields {
        LocationFields {
            name: self.name.clone(),
            parent_id: self.parent_id.clone(),
            icon: self.icon.clone(),
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
