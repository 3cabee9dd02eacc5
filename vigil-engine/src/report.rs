//! Merged compliance reporting.
//!
//! A [`ComplianceReport`] folds the three monitoring angles into one
//! document: the audit trail summary, the rule engine's metrics and the
//! latest probe run. Each contributes a 0 to 100 sub-score; the overall
//! score is their mean and the overall risk the worst of the three, so
//! a single failing angle cannot be averaged away from the headline
//! risk figure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use audit_store::AuditSummary;
use compliance_engine::ComplianceMetrics;
use monitor_common::{RiskLevel, Severity};
use security_probes::ProbeRunSummary;

/// One compliance document covering a reporting period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
    /// Audit trail activity over the period.
    pub audit: AuditSummary,
    /// 100 minus the percentage of events at high or critical severity.
    pub audit_score: f64,
    /// Rule engine metrics over the same number of days.
    pub rules: ComplianceMetrics,
    /// Latest completed probe run, if any.
    pub probes: Option<ProbeRunSummary>,
    /// Passed share of the latest run as a percentage; 100 when no run
    /// has completed yet.
    pub probe_score: f64,
    /// Mean of the three sub-scores.
    pub overall_score: f64,
    /// Worst risk level among the three angles.
    pub risk_level: RiskLevel,
}

impl ComplianceReport {
    pub(crate) fn assemble(
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        audit: AuditSummary,
        rules: ComplianceMetrics,
        probes: Option<ProbeRunSummary>,
    ) -> Self {
        let audit_score = audit_score(&audit);
        let probe_score = probe_score(probes.as_ref());
        let overall_score = (audit_score + rules.compliance_score + probe_score) / 3.0;
        let risk_level = [
            RiskLevel::from_rate(100.0 - audit_score),
            rules.risk_level,
            RiskLevel::from_rate(100.0 - probe_score),
        ]
        .into_iter()
        .max()
        .unwrap_or(RiskLevel::Low);
        Self {
            period_start,
            period_end,
            generated_at: Utc::now(),
            audit,
            audit_score,
            rules,
            probes,
            probe_score,
            overall_score,
            risk_level,
        }
    }
}

/// An empty period scores 100: no activity is no observed risk.
fn audit_score(summary: &AuditSummary) -> f64 {
    if summary.total_events == 0 {
        return 100.0;
    }
    let elevated = summary.count_at_or_above(Severity::High) as f64;
    100.0 - (elevated / summary.total_events as f64) * 100.0
}

fn probe_score(summary: Option<&ProbeRunSummary>) -> f64 {
    match summary {
        Some(run) if run.total > 0 => (run.passed as f64 / run.total as f64) * 100.0,
        _ => 100.0,
    }
}
