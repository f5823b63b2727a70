//! Fetcher capability.
//!
//! Read access to the remote controller's current state. Only
//! [`Fetcher::list_resources`] is mandatory; registries and configuration
//! payloads are optional capabilities that default to
//! [`FetchError::Unsupported`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hearth_db::{AttrValue, AttributeBag, AutomationConfig, ScriptConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors reported by a [`Fetcher`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Transport failure talking to the remote controller.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The remote controller did not answer in time.
    #[error("request timed out: {operation}")]
    Timeout { operation: String },

    /// The requested item does not exist remotely.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// The remote controller does not offer this capability.
    #[error("unsupported by remote controller: {operation}")]
    Unsupported { operation: String },

    /// The remote controller answered with something unreadable.
    #[error("invalid payload: {message}")]
    InvalidPayload { message: String },
}

impl FetchError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            message: message.into(),
        }
    }

    /// Check if this error is transient (a later attempt may succeed).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transport { .. } | FetchError::Timeout { .. })
    }

    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(self, FetchError::Unsupported { .. })
    }
}

/// Result type for fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;

/// Behavior-definition kind of a resource, derived from its domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Automation,
    Script,
    Scene,
    /// Anything else (lights, sensors, switches, ...).
    Other,
}

impl ResourceKind {
    #[must_use]
    pub fn from_domain(domain: &str) -> Self {
        match domain {
            "automation" => Self::Automation,
            "script" => Self::Script,
            "scene" => Self::Scene,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Automation => write!(f, "automation"),
            Self::Script => write!(f, "script"),
            Self::Scene => write!(f, "scene"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// One resource as listed by the remote controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(alias = "entity_id")]
    pub external_id: String,
    /// Domain tag. Taken from the id prefix when not reported.
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub attributes: AttributeBag,
    /// Explicit location reference, when the remote controller reports one.
    #[serde(default)]
    pub location_ref: Option<String>,
    /// Explicit device reference, when the remote controller reports one.
    #[serde(default)]
    pub device_ref: Option<String>,
    /// The remote controller's own last-change timestamp.
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl Resource {
    /// New resource; the domain is the part of the id before the first `.`.
    #[must_use]
    pub fn new(external_id: impl Into<String>) -> Self {
        let external_id = external_id.into();
        let domain = domain_of(&external_id).to_string();
        Self {
            external_id,
            domain,
            name: None,
            state: None,
            attributes: AttributeBag::new(),
            location_ref: None,
            device_ref: None,
            last_updated: None,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.set(name, value);
        self
    }

    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location_ref = Some(location.into());
        self
    }

    #[must_use]
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device_ref = Some(device.into());
        self
    }

    #[must_use]
    pub fn updated_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_updated = Some(at);
        self
    }

    /// Effective domain tag.
    #[must_use]
    pub fn domain(&self) -> &str {
        if self.domain.is_empty() {
            domain_of(&self.external_id)
        } else {
            &self.domain
        }
    }

    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        ResourceKind::from_domain(self.domain())
    }

    /// The part of the id after the domain prefix.
    #[must_use]
    pub fn object_id(&self) -> &str {
        self.external_id
            .split_once('.')
            .map_or(self.external_id.as_str(), |(_, object)| object)
    }

    /// Name to show: reported name, else `friendly_name`, else the id.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or_else(|| self.attributes.first_text(&["friendly_name"]))
            .unwrap_or(&self.external_id)
    }
}

fn domain_of(external_id: &str) -> &str {
    external_id
        .split_once('.')
        .map_or("", |(domain, _)| domain)
}

/// A location as reported by the remote location registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRecord {
    #[serde(alias = "area_id")]
    pub external_id: String,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

/// A device as reported by the remote device registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    #[serde(alias = "device_id")]
    pub external_id: String,
    pub name: String,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub sw_version: Option<String>,
    /// External id of the owning location.
    #[serde(default, alias = "area_id")]
    pub location_ref: Option<String>,
}

/// Read access to the remote controller.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Every resource the remote controller currently knows about.
    async fn list_resources(&self) -> FetchResult<Vec<Resource>>;

    /// The location registry.
    async fn list_locations(&self) -> FetchResult<Vec<LocationRecord>> {
        Err(FetchError::unsupported("list_locations"))
    }

    /// The device registry.
    async fn list_devices(&self) -> FetchResult<Vec<DeviceRecord>> {
        Err(FetchError::unsupported("list_devices"))
    }

    /// Full configuration of one automation.
    async fn get_automation_config(&self, config_id: &str) -> FetchResult<AutomationConfig> {
        let _ = config_id;
        Err(FetchError::unsupported("get_automation_config"))
    }

    /// Full configuration of one script.
    async fn get_script_config(&self, config_id: &str) -> FetchResult<ScriptConfig> {
        let _ = config_id;
        Err(FetchError::unsupported("get_script_config"))
    }
}
