//! Probe subsystem error types.

use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the probe runner and security storage.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// A probe run was requested while one is still in progress.
    /// Scheduled ticks skip on this; manual callers see it directly.
    #[error("a probe run is already in progress")]
    RunInProgress,

    /// Resolution was requested for an id the repository does not hold.
    #[error("vulnerability {0} not found")]
    VulnerabilityNotFound(Uuid),

    /// Vulnerability or test-result persistence failed.
    #[error("security storage failed: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, ProbeError>;
