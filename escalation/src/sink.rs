//! Routes findings to alert channels and back into the audit trail.

use std::sync::Arc;

use serde_json::json;
use tracing::{error, warn};

use audit_store::{EventStore, NewAuditEvent};
use monitor_common::Severity;

use crate::alert::AlertChannel;
use crate::finding::{Finding, FindingSource};

/// Fan-out point for violations and vulnerabilities.
///
/// By the time a finding reaches the sink its producer has already
/// persisted it, so everything here is best-effort: a failing alert
/// channel or audit write is logged and the batch continues.
pub struct EscalationSink {
    store: Arc<EventStore>,
    alerts: Arc<dyn AlertChannel>,
}

impl EscalationSink {
    pub fn new(store: Arc<EventStore>, alerts: Arc<dyn AlertChannel>) -> Self {
        Self { store, alerts }
    }

    /// Escalate a batch of findings. Critical findings go out on the
    /// alert channel, high ones are logged as warnings, and every finding
    /// is re-recorded as an audit event. Returns how many were recorded.
    pub async fn handle(&self, findings: &[Finding]) -> usize {
        let mut recorded = 0;
        for finding in findings {
            match finding.severity {
                Severity::Critical => {
                    error!(
                        target: "alert",
                        finding_id = %finding.id,
                        source = finding.resource(),
                        "critical finding: {}",
                        finding.description
                    );
                    if let Err(e) = self.alerts.notify(finding).await {
                        warn!(
                            target: "alert",
                            finding_id = %finding.id,
                            error = %e,
                            "alert delivery failed"
                        );
                    }
                }
                Severity::High => {
                    warn!(
                        target: "alert",
                        finding_id = %finding.id,
                        source = finding.resource(),
                        "high finding: {}",
                        finding.description
                    );
                }
                Severity::Medium | Severity::Low => {}
            }
            if self.record(finding).await {
                recorded += 1;
            }
        }
        recorded
    }

    /// Append the finding to the audit trail so it surfaces in metrics
    /// and reports alongside the events that triggered it.
    async fn record(&self, finding: &Finding) -> bool {
        let details = match &finding.source {
            FindingSource::Rule {
                rule_id,
                rule_name,
                regulation,
            } => json!({
                "finding_id": finding.id,
                "rule_id": rule_id,
                "rule_name": rule_name,
                "regulation": regulation,
                "description": finding.description,
                "detected_at": finding.detected_at,
            }),
            FindingSource::Probe { probe_id, category } => json!({
                "finding_id": finding.id,
                "probe_id": probe_id,
                "category": category,
                "description": finding.description,
                "detected_at": finding.detected_at,
            }),
        };

        let event = NewAuditEvent::new(finding.event_type(), finding.resource(), "detect")
            .with_details(details)
            .with_severity(finding.severity)
            .with_flag(finding.compliance_flag());

        match self.store.log(event).await {
            Ok(_) => true,
            Err(e) => {
                warn!(
                    target: "alert",
                    finding_id = %finding.id,
                    error = %e,
                    "failed to re-record finding in the audit trail"
                );
                false
            }
        }
    }
}
