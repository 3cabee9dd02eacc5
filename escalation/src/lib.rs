//! Escalation sink for compliance violations and security vulnerabilities.
//!
//! Detectors and probes hand their findings to the [`EscalationSink`],
//! which raises critical ones on an [`AlertChannel`] and re-records every
//! finding as an audit event so it feeds back into compliance metrics.
//! Escalation is best-effort by contract: nothing in here may fail a
//! producer that has already persisted its finding.

pub mod alert;
pub mod finding;
pub mod sink;

pub use alert::{AlertChannel, LogAlertChannel};
pub use finding::{Finding, FindingSource};
pub use sink::EscalationSink;
