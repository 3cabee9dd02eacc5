//! Rule-based compliance monitoring over the audit trail.
//!
//! A [`RuleEvaluator`] re-reads sliding windows of audit events on a
//! schedule and dispatches each enabled [`ComplianceRule`] to its
//! detector. Detections become [`ComplianceViolation`] records, are
//! deduplicated per rule and group within the rule's window, persisted,
//! and handed to the escalation sink.

pub mod consent;
mod detectors;
pub mod error;
pub mod evaluator;
pub mod rule;
pub mod violation;

pub use consent::{ConsentRegistry, InMemoryConsentRegistry};
pub use error::EngineError;
pub use evaluator::{ComplianceMetrics, RuleEvaluator};
pub use monitor_common::ResolveOutcome;
pub use rule::{default_rules, ComplianceRule, DetectorKind, RuleConditions};
pub use violation::postgres::PostgresViolationRepository;
pub use violation::{
    ComplianceViolation, InMemoryViolationRepository, ViolationFilter, ViolationRepository,
};
