//! Engine configuration.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Configuration for reconciliation passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Remote controller zone this engine writes for.
    #[serde(default = "default_zone")]
    pub zone: String,
    /// Maximum configuration fetches in flight per behavior kind.
    #[serde(default = "default_enrichment_concurrency")]
    pub enrichment_concurrency: usize,
    /// Maximum length (in characters) of a failed run's error message.
    #[serde(default = "default_error_message_limit")]
    pub error_message_limit: usize,
    /// Age after which a `running` run is considered abandoned.
    #[serde(default = "default_stale_run_timeout_secs")]
    pub stale_run_timeout_secs: u64,
    /// Attributes that name a resource's location, in priority order.
    #[serde(default = "default_location_attribute_keys")]
    pub location_attribute_keys: Vec<String>,
    /// Attributes that name a resource's device, in priority order.
    #[serde(default = "default_device_attribute_keys")]
    pub device_attribute_keys: Vec<String>,
}

fn default_zone() -> String {
    "default".to_string()
}

fn default_enrichment_concurrency() -> usize {
    8
}

fn default_error_message_limit() -> usize {
    1024
}

fn default_stale_run_timeout_secs() -> u64 {
    3600
}

fn default_location_attribute_keys() -> Vec<String> {
    vec!["area_id".into(), "location".into(), "room".into()]
}

fn default_device_attribute_keys() -> Vec<String> {
    vec!["device_id".into(), "device".into()]
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            zone: default_zone(),
            enrichment_concurrency: default_enrichment_concurrency(),
            error_message_limit: default_error_message_limit(),
            stale_run_timeout_secs: default_stale_run_timeout_secs(),
            location_attribute_keys: default_location_attribute_keys(),
            device_attribute_keys: default_device_attribute_keys(),
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn for_zone(zone: impl Into<String>) -> Self {
        Self {
            zone: zone.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_enrichment_concurrency(mut self, concurrency: usize) -> Self {
        self.enrichment_concurrency = concurrency;
        self
    }

    #[must_use]
    pub fn with_stale_run_timeout_secs(mut self, secs: u64) -> Self {
        self.stale_run_timeout_secs = secs;
        self
    }

    /// Stale-run timeout, saturating at the largest representable duration.
    #[must_use]
    pub fn stale_run_timeout(&self) -> Duration {
        let secs = i64::try_from(self.stale_run_timeout_secs).unwrap_or(i64::MAX);
        Duration::try_seconds(secs).unwrap_or(Duration::MAX)
    }

    /// Cut `message` down to the configured limit without splitting a character.
    ///
    /// At least one character is always kept.
    #[must_use]
    pub fn bound_error_message(&self, message: &str) -> String {
        match message.char_indices().nth(self.error_message_limit.max(1)) {
            Some((cut, _)) => message[..cut].to_string(),
            None => message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config: SyncConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.zone, "default");
        assert_eq!(config.enrichment_concurrency, 8);
        assert_eq!(config.stale_run_timeout(), Duration::hours(1));
        assert_eq!(config.location_attribute_keys[0], "area_id");
    }

    #[test]
    fn test_bound_error_message_respects_char_boundaries() {
        let config = SyncConfig {
            error_message_limit: 3,
            ..SyncConfig::default()
        };
        assert_eq!(config.bound_error_message("ab"), "ab");
        assert_eq!(config.bound_error_message("abcdef"), "abc");
        assert_eq!(config.bound_error_message("ééééé"), "ééé");
    }

    #[test]
    fn test_zero_error_message_limit_keeps_one_char() {
        let config = SyncConfig {
            error_message_limit: 0,
            ..SyncConfig::default()
        };
        assert_eq!(config.bound_error_message("Fetch failed"), "F");
    }

    #[test]
    fn test_huge_stale_run_timeout_saturates() {
        let config = SyncConfig::default().with_stale_run_timeout_secs(1_000_000_000_000_000_000);
        assert_eq!(config.stale_run_timeout(), Duration::MAX);

        let config = SyncConfig::default().with_stale_run_timeout_secs(u64::MAX);
        assert_eq!(config.stale_run_timeout(), Duration::MAX);

        let config = SyncConfig::default().with_stale_run_timeout_secs(90);
        assert_eq!(config.stale_run_timeout(), Duration::seconds(90));
    }
}
