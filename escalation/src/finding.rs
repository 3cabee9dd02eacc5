//! Findings raised by rule detectors and security probes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use monitor_common::Severity;

/// Where a finding originated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FindingSource {
    /// A compliance rule detector matched over its evaluation window.
    Rule {
        rule_id: String,
        rule_name: String,
        regulation: String,
    },
    /// A security probe uncovered a vulnerability.
    Probe { probe_id: String, category: String },
}

/// A violation or vulnerability on its way through the escalation sink.
///
/// The `id` mirrors the stored violation or vulnerability record, so the
/// re-recorded audit event can be traced back to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: Uuid,
    pub source: FindingSource,
    pub severity: Severity,
    pub description: String,
    pub detected_at: DateTime<Utc>,
}

impl Finding {
    /// Finding backed by a compliance rule violation.
    pub fn rule_violation(
        violation_id: Uuid,
        rule_id: impl Into<String>,
        rule_name: impl Into<String>,
        regulation: impl Into<String>,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: violation_id,
            source: FindingSource::Rule {
                rule_id: rule_id.into(),
                rule_name: rule_name.into(),
                regulation: regulation.into(),
            },
            severity,
            description: description.into(),
            detected_at: Utc::now(),
        }
    }

    /// Finding backed by a probe-detected vulnerability.
    pub fn probe_vulnerability(
        vulnerability_id: Uuid,
        probe_id: impl Into<String>,
        category: impl Into<String>,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: vulnerability_id,
            source: FindingSource::Probe {
                probe_id: probe_id.into(),
                category: category.into(),
            },
            severity,
            description: description.into(),
            detected_at: Utc::now(),
        }
    }

    /// Pin the detection time to the persisted record's timestamp.
    pub fn with_detected_at(mut self, detected_at: DateTime<Utc>) -> Self {
        self.detected_at = detected_at;
        self
    }

    /// Event type the finding is re-recorded under.
    pub fn event_type(&self) -> &'static str {
        match self.source {
            FindingSource::Rule { .. } => "compliance_violation_detected",
            FindingSource::Probe { .. } => "security_vulnerability_detected",
        }
    }

    /// Resource the re-recorded event points at: the rule or probe id.
    pub fn resource(&self) -> &str {
        match &self.source {
            FindingSource::Rule { rule_id, .. } => rule_id,
            FindingSource::Probe { probe_id, .. } => probe_id,
        }
    }

    /// Compliance flag tying the event back to its regulation or probe
    /// category, e.g. `gdpr_violation` or `input_validation_vulnerability`.
    pub fn compliance_flag(&self) -> String {
        match &self.source {
            FindingSource::Rule { regulation, .. } => {
                format!("{}_violation", regulation.to_lowercase())
            }
            FindingSource::Probe { category, .. } => format!("{category}_vulnerability"),
        }
    }
}
