//! Monitor error types.

use thiserror::Error;

use audit_store::AuditStoreError;
use compliance_engine::EngineError;
use field_crypto::CryptoError;
use security_probes::ProbeError;

/// Errors surfaced by the top-level monitor facade.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// A caller-supplied parameter was out of range or inconsistent.
    #[error("invalid parameter: {0}")]
    Validation(String),

    /// The audit trail layer failed.
    #[error(transparent)]
    Audit(#[from] AuditStoreError),

    /// The rule engine failed.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The probe runner failed.
    #[error(transparent)]
    Probes(#[from] ProbeError),

    /// Cipher setup failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
