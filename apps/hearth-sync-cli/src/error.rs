//! CLI error types and exit codes

use hearth_db::DbError;
use hearth_sync::SyncError;
use thiserror::Error;

use crate::config::ConfigError;

/// Exit codes for the CLI
/// - 0: Success
/// - 1: General error
/// - 2: Configuration error
/// - 3: Transient failure, worth retrying
/// - 4: Invalid input or remote data
/// - 5: Another pass is already running
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) => 2,
            CliError::Database(e) if e.is_connection_error() => 3,
            CliError::Sync(e) if e.is_retryable() => 3,
            CliError::Sync(SyncError::Validation { .. }) => 4,
            CliError::Sync(SyncError::AlreadyRunning { .. }) => 5,
            _ => 1,
        }
    }

    fn suggestion(&self) -> Option<&'static str> {
        match self {
            CliError::Config(ConfigError::MissingVar(_)) => {
                Some("Set the variable in the environment or in a .env file.")
            }
            CliError::Sync(SyncError::AlreadyRunning { .. }) => {
                Some("Wait for the pass to finish, or run 'hearth-sync runs expire'.")
            }
            _ => None,
        }
    }

    /// Print the error (and a suggestion, if any) to stderr.
    pub fn print(&self) {
        eprintln!("Error: {self}");
        if let Some(suggestion) = self.suggestion() {
            eprintln!("\nSuggestion: {suggestion}");
        }
    }
}
