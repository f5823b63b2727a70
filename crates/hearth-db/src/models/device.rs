//! Device model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::RecordKind;
use crate::store::SyncRecord;

/// A synchronized physical or virtual device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Device {
    pub id: Uuid,
    pub external_id: String,
    pub name: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub sw_version: Option<String>,
    /// Owning location, resolved in the same pass that wrote this row.
    pub location_id: Option<Uuid>,
    pub last_synced_at: DateTime<Utc>,
}

/// Mutable fields of a device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceFields {
    pub name: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub sw_version: Option<String>,
    pub location_id: Option<Uuid>,
}

impl SyncRecord for Device {
    type Fields = DeviceFields;
    const KIND: RecordKind = RecordKind::Device;

    fn create(external_id: String, fields: DeviceFields, synced_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            external_id,
            name: fields.name,
            manufacturer: fields.manufacturer,
            model: fields.model,
            sw_version: fields.sw_version,
            location_id: fields.location_id,
            last_synced_at: synced_at,
        }
    }

    fn apply(&mut self, fields: DeviceFields, synced_at: DateTime<Utc>) {
        self.name = fields.name;
        self.manufacturer = fields.manufacturer;
        self.model = fields.model;
        self.sw_version = fields.sw_version;
        self.location_id = fields.location_id;
        self.last_synced_at = synced_at;
    }

    fn fields(&self) -> DeviceFields {
        DeviceFields {
            name: self.name.clone(),
            manufacturer: self.manufacturer.clone(),
            model: self.model.clone(),
            sw_version: self.sw_version.clone(),
            location_id: self.location_id,
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
