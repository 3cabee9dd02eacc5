//! Probe outcomes: vulnerabilities, per-probe test results, run summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use monitor_common::Severity;

use crate::probe::ProbeCategory;

/// Outcome of a single probe execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    /// Probe ran and found no vulnerabilities.
    Passed,
    /// Probe found at least one vulnerability of high or critical severity.
    Failed,
    /// Probe found vulnerabilities, none above medium severity.
    Warning,
    /// Probe did not complete (panic guard, timeout, surface failure).
    Error,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Passed => "passed",
            TestStatus::Failed => "failed",
            TestStatus::Warning => "warning",
            TestStatus::Error => "error",
        }
    }

    /// Status implied by the vulnerabilities a completed probe reported.
    pub fn from_findings(vulnerabilities: &[SecurityVulnerability]) -> Self {
        if vulnerabilities.is_empty() {
            TestStatus::Passed
        } else if vulnerabilities
            .iter()
            .any(|v| v.severity >= Severity::High)
        {
            TestStatus::Failed
        } else {
            TestStatus::Warning
        }
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown test status: {0}")]
pub struct ParseTestStatusError(pub String);

impl std::str::FromStr for TestStatus {
    type Err = ParseTestStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "passed" => Ok(TestStatus::Passed),
            "failed" => Ok(TestStatus::Failed),
            "warning" => Ok(TestStatus::Warning),
            "error" => Ok(TestStatus::Error),
            other => Err(ParseTestStatusError(other.to_string())),
        }
    }
}

/// A weakness detected by a probe, tracked until someone resolves it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityVulnerability {
    pub id: Uuid,
    pub probe_id: String,
    pub category: ProbeCategory,
    pub severity: Severity,
    pub description: String,
    /// What the probe observed, without echoing attack payload responses
    /// or personal data back into storage.
    pub evidence: Value,
    pub detected_at: DateTime<Utc>,
    pub resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_notes: Option<String>,
}

/// Record of one probe execution inside a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityTestResult {
    pub id: Uuid,
    /// Groups every result produced by the same `run_all_tests` invocation.
    pub run_id: Uuid,
    pub probe_id: String,
    pub probe_name: String,
    pub category: ProbeCategory,
    pub status: TestStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
    /// Snapshot of the vulnerabilities this execution reported.
    pub vulnerabilities: Vec<SecurityVulnerability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Conjunctive filter for vulnerability queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VulnerabilityFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<ProbeCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl Default for VulnerabilityFilter {
    fn default() -> Self {
        Self {
            probe_id: None,
            category: None,
            severity: None,
            resolved: None,
            since: None,
            limit: 100,
        }
    }
}

impl VulnerabilityFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_probe(mut self, probe_id: impl Into<String>) -> Self {
        self.probe_id = Some(probe_id.into());
        self
    }

    pub fn with_category(mut self, category: ProbeCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_resolved(mut self, resolved: bool) -> Self {
        self.resolved = Some(resolved);
        self
    }

    pub fn since(mut self, from: DateTime<Utc>) -> Self {
        self.since = Some(from);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub(crate) fn matches(&self, vulnerability: &SecurityVulnerability) -> bool {
        if let Some(probe_id) = &self.probe_id {
            if &vulnerability.probe_id != probe_id {
                return false;
            }
        }
        if let Some(category) = self.category {
            if vulnerability.category != category {
                return false;
            }
        }
        if let Some(severity) = self.severity {
            if vulnerability.severity != severity {
                return false;
            }
        }
        if let Some(resolved) = self.resolved {
            if vulnerability.resolved != resolved {
                return false;
            }
        }
        if let Some(since) = self.since {
            if vulnerability.detected_at < since {
                return false;
            }
        }
        true
    }
}

/// Aggregate view of the most recent probe run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeRunSummary {
    pub run_id: Uuid,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub warnings: usize,
    pub errors: usize,
    pub completed_at: DateTime<Utc>,
}

impl ProbeRunSummary {
    /// Summarize one run's results. Returns `None` for an empty slice.
    pub fn from_results(results: &[SecurityTestResult]) -> Option<Self> {
        let first = results.first()?;
        let mut summary = ProbeRunSummary {
            run_id: first.run_id,
            total: results.len(),
            passed: 0,
            failed: 0,
            warnings: 0,
            errors: 0,
            completed_at: first.completed_at,
        };
        for result in results {
            match result.status {
                TestStatus::Passed => summary.passed += 1,
                TestStatus::Failed => summary.failed += 1,
                TestStatus::Warning => summary.warnings += 1,
                TestStatus::Error => summary.errors += 1,
            }
            if result.completed_at > summary.completed_at {
                summary.completed_at = result.completed_at;
            }
        }
        Some(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vulnerability(severity: Severity, resolved: bool) -> SecurityVulnerability {
        SecurityVulnerability {
            id: Uuid::new_v4(),
            probe_id: "sql-injection-forms".to_string(),
            category: ProbeCategory::InputValidation,
            severity,
            description: "payload accepted".to_string(),
            evidence: json!({"route": "/api/contact"}),
            detected_at: Utc::now(),
            resolved,
            resolved_at: None,
            resolved_by: None,
            resolution_notes: None,
        }
    }

    #[test]
    fn test_status_from_findings() {
        assert_eq!(TestStatus::from_findings(&[]), TestStatus::Passed);
        assert_eq!(
            TestStatus::from_findings(&[vulnerability(Severity::Medium, false)]),
            TestStatus::Warning
        );
        assert_eq!(
            TestStatus::from_findings(&[
                vulnerability(Severity::Low, false),
                vulnerability(Severity::Critical, false),
            ]),
            TestStatus::Failed
        );
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            TestStatus::Passed,
            TestStatus::Failed,
            TestStatus::Warning,
            TestStatus::Error,
        ] {
            assert_eq!(status.as_str().parse::<TestStatus>().unwrap(), status);
        }
        assert!("exploded".parse::<TestStatus>().is_err());
    }

    #[test]
    fn test_filter_matches_on_each_axis() {
        let open_high = vulnerability(Severity::High, false);
        let resolved_low = vulnerability(Severity::Low, true);

        let open_only = VulnerabilityFilter::default().with_resolved(false);
        assert!(open_only.matches(&open_high));
        assert!(!open_only.matches(&resolved_low));

        let wrong_probe = VulnerabilityFilter::default().with_probe("csrf-protection");
        assert!(!wrong_probe.matches(&open_high));

        let by_severity = VulnerabilityFilter::default().with_severity(Severity::High);
        assert!(by_severity.matches(&open_high));
        assert!(!by_severity.matches(&resolved_low));
    }

    #[test]
    fn test_run_summary_counts_statuses() {
        let run_id = Uuid::new_v4();
        let base = Utc::now();
        let mut results = Vec::new();
        for (i, status) in [
            TestStatus::Passed,
            TestStatus::Passed,
            TestStatus::Failed,
            TestStatus::Warning,
            TestStatus::Error,
        ]
        .into_iter()
        .enumerate()
        {
            results.push(SecurityTestResult {
                id: Uuid::new_v4(),
                run_id,
                probe_id: format!("probe-{i}"),
                probe_name: format!("Probe {i}"),
                category: ProbeCategory::InputValidation,
                status,
                started_at: base,
                completed_at: base + chrono::Duration::milliseconds(i as i64),
                duration_ms: i as i64,
                vulnerabilities: Vec::new(),
                error: None,
            });
        }

        let summary = ProbeRunSummary::from_results(&results).unwrap();
        assert_eq!(summary.run_id, run_id);
        assert_eq!(summary.total, 5);
        assert_eq!(summary.passed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.warnings, 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.completed_at, base + chrono::Duration::milliseconds(4));

        assert!(ProbeRunSummary::from_results(&[]).is_none());
    }
}
