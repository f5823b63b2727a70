//! Reconciliation error types.

use hearth_db::{DbError, InvalidTransition};
use thiserror::Error;
use uuid::Uuid;

use crate::fetcher::FetchError;

/// Errors that abort a reconciliation pass or a run query.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The top-level resource listing failed.
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// A store operation failed.
    #[error("Write failed: {0}")]
    Write(#[source] DbError),

    /// A record was rejected before anything was written.
    #[error("Validation failed: {message}")]
    Validation { message: String },

    /// Another pass is in flight for the zone.
    #[error("A sync run is already in progress for zone {zone}: {run_id}")]
    AlreadyRunning { zone: String, run_id: Uuid },

    /// Invalid run status change.
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState { from: String, to: String },

    /// Run not found.
    #[error("Sync run not found: {id}")]
    RunNotFound { id: Uuid },
}

impl SyncError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create an already-running error.
    pub fn already_running(zone: impl Into<String>, run_id: Uuid) -> Self {
        Self::AlreadyRunning {
            zone: zone.into(),
            run_id,
        }
    }

    /// Check if this error is retryable.
    ///
    /// Transport and connection problems are; a rejected record or an
    /// in-flight pass is not going to change by retrying right away.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Fetch(e) => e.is_transient(),
            SyncError::Write(e) => e.is_connection_error(),
            _ => false,
        }
    }
}

impl From<DbError> for SyncError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::ValidationFailed(message) => SyncError::Validation { message },
            other => SyncError::Write(other),
        }
    }
}

impl From<InvalidTransition> for SyncError {
    fn from(err: InvalidTransition) -> Self {
        SyncError::InvalidState {
            from: err.from.to_string(),
            to: err.to.to_string(),
        }
    }
}

/// Result type for reconciliation operations.
pub type SyncResult<T> = Result<T, SyncError>;
