//! Shared building blocks for the Vigil monitoring engine.
//!
//! Every other crate in the workspace speaks this vocabulary: finding
//! severities, operational risk levels, the one-way resolution outcome,
//! the bounded TTL cache used for violation deduplication, and the tick
//! scheduler that drives the rule evaluator and probe runner.

pub mod cache;
pub mod resolution;
pub mod scheduler;
pub mod severity;

pub use cache::TtlCache;
pub use resolution::ResolveOutcome;
pub use scheduler::{delay_until_next_midnight, Ticker};
pub use severity::{ParseSeverityError, RiskLevel, Severity};
