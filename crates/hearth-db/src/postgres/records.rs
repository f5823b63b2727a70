//! Row mapping between reconciled kinds and their PostgreSQL tables.

use sqlx::postgres::PgRow;
use sqlx::query_builder::Separated;
use sqlx::types::Json;
use sqlx::{FromRow, Postgres, Row};

use crate::attributes::AttributeBag;
use crate::models::{
    Automation, AutomationConfig, Device, Entity, Location, Scene, Script, ScriptConfig,
};
use crate::store::SyncRecord;

/// A kind that has a table of its own.
pub trait PgRecord: SyncRecord {
    /// Table name.
    const TABLE: &'static str;

    /// Every column, in the order [`PgRecord::bind_columns`] binds them.
    const COLUMNS: &'static [&'static str];

    /// Decode a row selected with [`PgRecord::COLUMNS`].
    fn from_pg_row(row: &PgRow) -> Result<Self, sqlx::Error>;

    /// Bind one value per column, in column order.
    fn bind_columns(&self, b: &mut Separated<'_, '_, Postgres, &'static str>);

    /// Comma separated column list.
    fn column_list() -> String {
        Self::COLUMNS.join(", ")
    }
}

impl PgRecord for Location {
    const TABLE: &'static str = "locations";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "external_id",
        "name",
        "parent_id",
        "icon",
        "last_synced_at",
    ];

    fn from_pg_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Location::from_row(row)
    }

    fn bind_columns(&self, b: &mut Separated<'_, '_, Postgres, &'static str>) {
        b.push_bind(self.id)
            .push_bind(self.external_id.clone())
            .push_bind(self.name.clone())
            .push_bind(self.parent_id.clone())
            .push_bind(self.icon.clone())
            .push_bind(self.last_synced_at);
    }
}

impl PgRecord for Device {
    const TABLE: &'static str = "devices";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "external_id",
        "name",
        "manufacturer",
        "model",
        "sw_version",
        "location_id",
        "last_synced_at",
    ];

    fn from_pg_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Device::from_row(row)
    }

    fn bind_columns(&self, b: &mut Separated<'_, '_, Postgres, &'static str>) {
        b.push_bind(self.id)
            .push_bind(self.external_id.clone())
            .push_bind(self.name.clone())
            .push_bind(self.manufacturer.clone())
            .push_bind(self.model.clone())
            .push_bind(self.sw_version.clone())
            .push_bind(self.location_id)
            .push_bind(self.last_synced_at);
    }
}

impl PgRecord for Entity {
    const TABLE: &'static str = "entities";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "external_id",
        "domain",
        "name",
        "state",
        "attributes",
        "device_id",
        "location_id",
        "device_class",
        "unit_of_measurement",
        "supported_features",
        "last_synced_at",
    ];

    fn from_pg_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let attributes: Json<AttributeBag> = row.try_get("attributes")?;
        Ok(Self {
            id: row.try_get("id")?,
            external_id: row.try_get("external_id")?,
            domain: row.try_get("domain")?,
            name: row.try_get("name")?,
            state: row.try_get("state")?,
            attributes: attributes.0,
            device_id: row.try_get("device_id")?,
            location_id: row.try_get("location_id")?,
            device_class: row.try_get("device_class")?,
            unit_of_measurement: row.try_get("unit_of_measurement")?,
            supported_features: row.try_get("supported_features")?,
            last_synced_at: row.try_get("last_synced_at")?,
        })
    }

    fn bind_columns(&self, b: &mut Separated<'_, '_, Postgres, &'static str>) {
        b.push_bind(self.id)
            .push_bind(self.external_id.clone())
            .push_bind(self.domain.clone())
            .push_bind(self.name.clone())
            .push_bind(self.state.clone())
            .push_bind(Json(self.attributes.clone()))
            .push_bind(self.device_id)
            .push_bind(self.location_id)
            .push_bind(self.device_class.clone())
            .push_bind(self.unit_of_measurement.clone())
            .push_bind(self.supported_features)
            .push_bind(self.last_synced_at);
    }
}

impl PgRecord for Automation {
    const TABLE: &'static str = "automations";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "external_id",
        "alias",
        "state",
        "mode",
        "last_triggered",
        "config",
        "last_synced_at",
    ];

    fn from_pg_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let config: Option<Json<AutomationConfig>> = row.try_get("config")?;
        Ok(Self {
            id: row.try_get("id")?,
            external_id: row.try_get("external_id")?,
            alias: row.try_get("alias")?,
            state: row.try_get("state")?,
            mode: row.try_get("mode")?,
            last_triggered: row.try_get("last_triggered")?,
            config: config.map(|c| c.0),
            last_synced_at: row.try_get("last_synced_at")?,
        })
    }

    fn bind_columns(&self, b: &mut Separated<'_, '_, Postgres, &'static str>) {
        b.push_bind(self.id)
            .push_bind(self.external_id.clone())
            .push_bind(self.alias.clone())
            .push_bind(self.state.clone())
            .push_bind(self.mode.clone())
            .push_bind(self.last_triggered)
            .push_bind(self.config.clone().map(Json))
            .push_bind(self.last_synced_at);
    }
}

impl PgRecord for Script {
    const TABLE: &'static str = "scripts";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "external_id",
        "alias",
        "state",
        "mode",
        "last_triggered",
        "config",
        "last_synced_at",
    ];

    fn from_pg_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let config: Option<Json<ScriptConfig>> = row.try_get("config")?;
        Ok(Self {
            id: row.try_get("id")?,
            external_id: row.try_get("external_id")?,
            alias: row.try_get("alias")?,
            state: row.try_get("state")?,
            mode: row.try_get("mode")?,
            last_triggered: row.try_get("last_triggered")?,
            config: config.map(|c| c.0),
            last_synced_at: row.try_get("last_synced_at")?,
        })
    }

    fn bind_columns(&self, b: &mut Separated<'_, '_, Postgres, &'static str>) {
        b.push_bind(self.id)
            .push_bind(self.external_id.clone())
            .push_bind(self.alias.clone())
            .push_bind(self.state.clone())
            .push_bind(self.mode.clone())
            .push_bind(self.last_triggered)
            .push_bind(self.config.clone().map(Json))
            .push_bind(self.last_synced_at);
    }
}

impl PgRecord for Scene {
    const TABLE: &'static str = "scenes";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "external_id",
        "alias",
        "state",
        "last_triggered",
        "last_synced_at",
    ];

    fn from_pg_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Scene::from_row(row)
    }

    fn bind_columns(&self, b: &mut Separated<'_, '_, Postgres, &'static str>) {
        b.push_bind(self.id)
            .push_bind(self.external_id.clone())
            .push_bind(self.alias.clone())
            .push_bind(self.state.clone())
            .push_bind(self.last_triggered)
            .push_bind(self.last_synced_at);
    }
}
