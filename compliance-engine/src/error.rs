//! Engine error types.

use thiserror::Error;
use uuid::Uuid;

use audit_store::AuditStoreError;

/// Errors surfaced by the rule evaluator and violation storage.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An evaluation pass was requested while one is still running.
    /// Scheduled ticks skip on this; manual callers see it directly.
    #[error("an evaluation pass is already running")]
    EvaluationInProgress,

    /// Resolution was requested for an id the repository does not hold.
    #[error("violation {0} not found")]
    ViolationNotFound(Uuid),

    /// Violation persistence failed.
    #[error("violation storage failed: {0}")]
    Storage(String),

    /// The underlying audit store failed.
    #[error(transparent)]
    Audit(#[from] AuditStoreError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
