use thiserror::Error;

pub type Result<T> = std::result::Result<T, AuditStoreError>;

/// Errors surfaced by the audit store.
///
/// Field encryption failures never appear here: the store degrades those
/// writes (redacted value plus `encryption_failed` flag) instead of
/// failing them. Storage errors are propagated as-is and never retried.
#[derive(Debug, Error)]
pub enum AuditStoreError {
    #[error("storage error: {0}")]
    Storage(String),
}
