//! Outcome vocabulary for one-way resolution of stored findings.
//!
//! Violations and vulnerabilities are append-only apart from a single
//! transition: open to resolved. Repositories apply that transition
//! conditionally and report which case occurred so callers can audit an
//! applied resolution without double-logging replays.

/// Result of a conditional "resolve if still unresolved" update.
#[derive(Debug, Clone)]
pub enum ResolveOutcome<T> {
    /// This call flipped the record to resolved.
    Applied(T),
    /// The record was already resolved; the stored copy is returned with
    /// the original resolver's metadata intact.
    AlreadyResolved(T),
    NotFound,
}

impl<T> ResolveOutcome<T> {
    /// The stored record, if one exists.
    pub fn record(&self) -> Option<&T> {
        match self {
            ResolveOutcome::Applied(record) | ResolveOutcome::AlreadyResolved(record) => {
                Some(record)
            }
            ResolveOutcome::NotFound => None,
        }
    }
}
