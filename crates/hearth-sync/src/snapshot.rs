//! Fetcher over a JSON snapshot of the remote controller.
//!
//! The document is re-read on every call, so editing the file between two
//! passes behaves like the remote side changing.
//!
//! ```json
//! {
//!   "resources": [{"external_id": "light.kitchen", "state": "on", "attributes": {"area_id": "kitchen"}}],
//!   "locations": [{"external_id": "kitchen", "name": "Kitchen"}],
//!   "automation_configs": {"wake_up": {"triggers": [], "actions": []}}
//! }
//! ```
//!
//! `locations` and `devices` are optional; when absent the corresponding
//! registry is reported as unsupported.

use async_trait::async_trait;
use hearth_db::{AutomationConfig, ScriptConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::fetcher::{
    DeviceRecord, FetchError, FetchResult, Fetcher, LocationRecord, Resource,
};

/// Snapshot document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub locations: Option<Vec<LocationRecord>>,
    #[serde(default)]
    pub devices: Option<Vec<DeviceRecord>>,
    #[serde(default)]
    pub automation_configs: HashMap<String, AutomationConfig>,
    #[serde(default)]
    pub script_configs: HashMap<String, ScriptConfig>,
}

/// Reads the remote state from a snapshot file.
#[derive(Debug, Clone)]
pub struct SnapshotFetcher {
    path: PathBuf,
}

impl SnapshotFetcher {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> FetchResult<Snapshot> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            FetchError::transport(format!("reading {}: {e}", self.path.display()))
        })?;
        serde_json::from_slice(&bytes).map_err(|e| {
            FetchError::invalid_payload(format!("{}: {e}", self.path.display()))
        })
    }
}

#[async_trait]
impl Fetcher for SnapshotFetcher {
    async fn list_resources(&self) -> FetchResult<Vec<Resource>> {
        Ok(self.load().await?.resources)
    }

    async fn list_locations(&self) -> FetchResult<Vec<LocationRecord>> {
        self.load()
            .await?
            .locations
            .ok_or_else(|| FetchError::unsupported("list_locations"))
    }

    async fn list_devices(&self) -> FetchResult<Vec<DeviceRecord>> {
        self.load()
            .await?
            .devices
            .ok_or_else(|| FetchError::unsupported("list_devices"))
    }

    async fn get_automation_config(&self, config_id: &str) -> FetchResult<AutomationConfig> {
        self.load()
            .await?
            .automation_configs
            .remove(config_id)
            .ok_or_else(|| FetchError::not_found(format!("automation config {config_id}")))
    }

    async fn get_script_config(&self, config_id: &str) -> FetchResult<ScriptConfig> {
        self.load()
            .await?
            .script_configs
            .remove(config_id)
            .ok_or_else(|| FetchError::not_found(format!("script config {config_id}")))
    }
}
