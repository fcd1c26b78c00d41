//! Common types and errors for GrantSync
//!
//! This crate provides the pieces shared by the collaboration coordinator,
//! the offline sync queue and the CLI: the error type, logging setup,
//! and the injectable clock and timer abstractions.

pub mod clock;
pub mod ids;
pub mod redact;
pub mod schedule;
pub mod telemetry;

pub use clock::{Clock, SystemClock};
pub use schedule::{RepeatingTask, Scheduler, TimerHandle, TokioScheduler};

use thiserror::Error;

/// Core error types for GrantSync operations
#[derive(Error, Debug)]
pub enum GrantError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Remote store rejected {operation} on '{key}': {reason}")]
    StoreRejected {
        operation: &'static str,
        key: String,
        reason: String,
    },

    #[error("Remote store unreachable")]
    Unreachable,

    #[error("Local storage error: {0}")]
    StorageError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Invalid input: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl GrantError {
    /// Whether the failure came from the network rather than local state.
    ///
    /// Network failures are expected while offline and are never surfaced
    /// to callers of the sync queue or the coordinator.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            GrantError::NetworkError(_) | GrantError::Unreachable | GrantError::StoreRejected { .. }
        )
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, GrantError>;

/// Exit code constants for the `grant` binary
pub const EXIT_ERROR: i32 = 1;
pub const EXIT_CONFIG_ERROR: i32 = 101;
pub const EXIT_TERMINATED: i32 = 130;
