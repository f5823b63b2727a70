//! Entity model.
//!
//! Entities are the controllable or sensing endpoints of the remote
//! controller (`light.kitchen`, `sensor.hall_temperature`, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::RecordKind;
use crate::attributes::AttributeBag;
use crate::store::SyncRecord;

/// State value the remote system reports when it has no reading.
pub const UNKNOWN_STATE: &str = "unknown";

/// A synchronized entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: Uuid,
    pub external_id: String,
    /// Domain tag (`light`, `sensor`, `automation`, ...).
    pub domain: String,
    pub name: String,
    pub state: Option<String>,
    pub attributes: AttributeBag,
    pub device_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub device_class: Option<String>,
    pub unit_of_measurement: Option<String>,
    /// Capability bitmask as reported remotely.
    pub supported_features: i64,
    pub last_synced_at: DateTime<Utc>,
}

impl Entity {
    /// Current state, with a missing state reported as `unknown`.
    #[must_use]
    pub fn state_or_unknown(&self) -> &str {
        self.state.as_deref().unwrap_or(UNKNOWN_STATE)
    }

    /// Whether the given capability bit is set.
    #[must_use]
    pub fn supports(&self, feature: i64) -> bool {
        feature != 0 && self.supported_features & feature == feature
    }
}

/// Mutable fields of an entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityFields {
    pub domain: String,
    pub name: String,
    pub state: Option<String>,
    pub attributes: AttributeBag,
    pub device_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub device_class: Option<String>,
    pub unit_of_measurement: Option<String>,
    pub supported_features: i64,
}

impl SyncRecord for Entity {
    type Fields = EntityFields;
    const KIND: RecordKind = RecordKind::Entity;

    fn create(external_id: String, fields: EntityFields, synced_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            external_id,
            domain: fields.domain,
            name: fields.name,
            state: fields.state,
            attributes: fields.attributes,
            device_id: fields.device_id,
            location_id: fields.location_id,
            device_class: fields.device_class,
            unit_of_measurement: fields.unit_of_measurement,
            supported_features: fields.supported_features,
            last_synced_at: synced_at,
        }
    }

    fn apply(&mut self, fields: EntityFields, synced_at: DateTime<Utc>) {
        self.domain = fields.domain;
        self.name = fields.name;
        self.state = fields.state;
        self.attributes = fields.attributes;
        self.device_id = fields.device_id;
        self.location_id = fields.location_id;
        self.device_class = fields.device_class;
        self.unit_of_measurement = fields.unit_of_measurement;
        self.supported_features = fields.supported_features;
        self.last_synced_at = synced_at;
    }

    fn fields(&self) -> EntityFields {
        EntityFields {
            domain: self.domain.clone(),
            name: self.name.clone(),
            state: self.state.clone(),
            attributes: self.attributes.clone(),
            device_id: self.device_id,
            location_id: self.location_id,
            device_class: self.device_class.clone(),
            unit_of_measurement: self.unit_of_measurement.clone(),
            supported_features: self.supported_features,
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
