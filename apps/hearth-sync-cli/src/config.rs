//! CLI configuration loaded from environment variables.
//!
//! Loading is fail-fast: a variable that is present but malformed is an
//! error, never silently replaced by its default.

use hearth_sync::SyncConfig;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Default log filter when neither `HEARTH_LOG` nor `RUST_LOG` is set.
pub const DEFAULT_LOG_FILTER: &str = "info,hearth=debug";

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Configuration errors that can occur during environment loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },
}

/// CLI configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// PostgreSQL connection string. Only optional for `--memory` runs.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    /// Snapshot file the fetcher reads the remote state from.
    pub snapshot_path: Option<PathBuf>,
    pub zone: String,
    pub enrichment_concurrency: usize,
    pub stale_run_timeout_secs: u64,
    pub log_filter: String,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// Call after `dotenvy::dotenv()` so a local `.env` file is honored.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = SyncConfig::default();

        Ok(Self {
            database_url: var("DATABASE_URL"),
            database_max_connections: parse_or(
                "DATABASE_MAX_CONNECTIONS",
                var("DATABASE_MAX_CONNECTIONS"),
                DEFAULT_MAX_CONNECTIONS,
            )?,
            snapshot_path: var("HEARTH_SNAPSHOT_PATH").map(PathBuf::from),
            zone: var("HEARTH_ZONE").unwrap_or(defaults.zone),
            enrichment_concurrency: parse_or(
                "HEARTH_ENRICHMENT_CONCURRENCY",
                var("HEARTH_ENRICHMENT_CONCURRENCY"),
                defaults.enrichment_concurrency,
            )?,
            stale_run_timeout_secs: parse_or(
                "HEARTH_STALE_RUN_TIMEOUT_SECS",
                var("HEARTH_STALE_RUN_TIMEOUT_SECS"),
                defaults.stale_run_timeout_secs,
            )?,
            log_filter: var("HEARTH_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        })
    }

    /// The database URL, for commands that need PostgreSQL.
    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))
    }

    /// The snapshot path, for commands that fetch remote state.
    pub fn require_snapshot_path(&self) -> Result<&PathBuf, ConfigError> {
        self.snapshot_path
            .as_ref()
            .ok_or_else(|| ConfigError::MissingVar("HEARTH_SNAPSHOT_PATH".to_string()))
    }

    /// Engine settings for this zone.
    #[must_use]
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig::for_zone(&self.zone)
            .with_enrichment_concurrency(self.enrichment_concurrency)
            .with_stale_run_timeout_secs(self.stale_run_timeout_secs)
    }
}

fn parse_or<T>(name: &str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                var: name.to_string(),
                message: format!("{raw:?}: {e}"),
            }),
    }
}
