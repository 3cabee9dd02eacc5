//! Top-level facade over the Vigil monitoring engine.
//!
//! [`ComplianceMonitor`] wires the component crates into one handle:
//! the append-only audit trail (`audit-store`), the rule engine that
//! turns event patterns into violations (`compliance-engine`), the
//! security probes exercising the website surface (`security-probes`)
//! and the escalation sink they all report through (`escalation`).
//! Most callers build one monitor from a [`MonitorConfig`], log events
//! through it, call [`ComplianceMonitor::start`] and let the schedules
//! do the rest.

pub mod config;
pub mod error;
pub mod monitor;
pub mod report;

pub use config::{
    AnonymizationConfig, DateGranularity, MonitorConfig, ParseDateGranularityError,
};
pub use error::MonitorError;
pub use monitor::{
    ComplianceMonitor, MonitorStatus, MAX_HISTORY_LIMIT, MAX_METRICS_DAYS, MAX_QUERY_LIMIT,
};
pub use report::ComplianceReport;

// The types most facade calls take and return, re-exported so callers
// do not need the component crates on their own dependency lists.
pub use audit_store::{AuditEvent, AuditSummary, EventFilter, NewAuditEvent};
pub use compliance_engine::{ComplianceMetrics, ComplianceViolation, ViolationFilter};
pub use monitor_common::{RiskLevel, Severity};
pub use security_probes::{
    ProbeRunSummary, SecurityTestResult, SecurityVulnerability, TestStatus,
    VulnerabilityFilter,
};
