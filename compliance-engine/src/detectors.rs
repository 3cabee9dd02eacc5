//! Detection strategies behind [`DetectorKind`](crate::rule::DetectorKind).
//!
//! Each detector reduces a window of audit events to zero or more drafts.
//! A draft's `group_key` identifies what was flagged (a user, an IP, an
//! event) and doubles as the deduplication key component.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, Utc};
use serde_json::Value;
use uuid::Uuid;

use audit_store::{AuditEvent, EventFilter, EventStore};

use crate::consent::ConsentRegistry;
use crate::rule::ComplianceRule;

/// How many stale event ids the retention detector samples as evidence.
const EVIDENCE_SAMPLE_LIMIT: i64 = 20;

const EXPORT_ACTIONS: &[&str] = &["export", "download"];
const PROCESSING_ACTIONS: &[&str] = &["process", "store", "collect"];
const GDPR_FLAG: &str = "gdpr_relevant";

/// A detection before it becomes a persisted violation.
pub(crate) struct ViolationDraft {
    pub group_key: String,
    pub description: String,
    pub evidence: Vec<Uuid>,
}

/// Flag users whose event count exceeds the threshold.
pub(crate) fn excessive_access(rule: &ComplianceRule, events: &[AuditEvent]) -> Vec<ViolationDraft> {
    let mut per_user: BTreeMap<Uuid, Vec<Uuid>> = BTreeMap::new();
    for event in events {
        if let Some(user_id) = event.user_id {
            per_user.entry(user_id).or_default().push(event.id);
        }
    }
    per_user
        .into_iter()
        .filter(|(_, evidence)| evidence.len() as u64 > rule.conditions.threshold)
        .map(|(user_id, evidence)| {
            let description = format!(
                "user {user_id} accessed {} records in {} minutes (threshold {})",
                evidence.len(),
                rule.conditions.window_minutes,
                rule.conditions.threshold
            );
            ViolationDraft {
                group_key: user_id.to_string(),
                description,
                evidence,
            }
        })
        .collect()
}

fn is_authorized(details: &Value) -> bool {
    match details.get("authorized") {
        Some(Value::Bool(authorized)) => *authorized,
        Some(Value::String(marker)) => marker.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Flag export/download events that carry no authorization marker.
/// Grouped per event: each unauthorized export is its own violation.
pub(crate) fn unauthorized_export(events: &[AuditEvent]) -> Vec<ViolationDraft> {
    events
        .iter()
        .filter(|event| EXPORT_ACTIONS.contains(&event.action.as_str()))
        .filter(|event| !is_authorized(&event.details))
        .map(|event| {
            let actor = event
                .user_id
                .map_or_else(|| "unknown user".to_string(), |u| format!("user {u}"));
            ViolationDraft {
                group_key: event.id.to_string(),
                description: format!(
                    "{} of {} by {actor} lacks an authorization marker",
                    event.action, event.resource
                ),
                evidence: vec![event.id],
            }
        })
        .collect()
}

/// Flag subjects whose GDPR-relevant processing events have no valid
/// consent on record.
pub(crate) async fn consent_violation(
    events: &[AuditEvent],
    registry: &dyn ConsentRegistry,
) -> anyhow::Result<Vec<ViolationDraft>> {
    let mut per_subject: BTreeMap<Uuid, Vec<Uuid>> = BTreeMap::new();
    for event in events {
        let relevant = event.compliance_flags.iter().any(|flag| flag == GDPR_FLAG)
            && PROCESSING_ACTIONS.contains(&event.action.as_str());
        if !relevant {
            continue;
        }
        if let Some(user_id) = event.user_id {
            per_subject.entry(user_id).or_default().push(event.id);
        }
    }

    let mut drafts = Vec::new();
    for (user_id, evidence) in per_subject {
        if registry.has_valid_consent(user_id).await? {
            continue;
        }
        let description = format!(
            "personal data of user {user_id} processed without valid consent ({} events)",
            evidence.len()
        );
        drafts.push(ViolationDraft {
            group_key: user_id.to_string(),
            description,
            evidence,
        });
    }
    Ok(drafts)
}

/// Flag the store when any events outlive the retention period. Ignores
/// the rule's window; the whole store is in scope.
pub(crate) async fn retention_violation(
    store: &EventStore,
    retention_days: i64,
) -> anyhow::Result<Vec<ViolationDraft>> {
    let stale = store.stale_event_count(retention_days).await?;
    if stale == 0 {
        return Ok(Vec::new());
    }
    // Evidence is a bounded sample; the count in the description is exact.
    let cutoff = Utc::now() - Duration::days(retention_days.max(0));
    let sample = store
        .query_raw(
            &EventFilter::new()
                .until(cutoff)
                .with_limit(EVIDENCE_SAMPLE_LIMIT),
        )
        .await?;
    Ok(vec![ViolationDraft {
        group_key: "retention".into(),
        description: format!("{stale} events exceed the {retention_days}-day retention period"),
        evidence: sample.iter().map(|event| event.id).collect(),
    }])
}

/// Flag source IPs whose failed-attempt count reaches the threshold.
pub(crate) fn failed_authentication(
    rule: &ComplianceRule,
    events: &[AuditEvent],
) -> Vec<ViolationDraft> {
    let mut per_ip: BTreeMap<String, Vec<Uuid>> = BTreeMap::new();
    for event in events {
        if let Some(ip) = &event.ip_address {
            per_ip.entry(ip.clone()).or_default().push(event.id);
        }
    }
    per_ip
        .into_iter()
        .filter(|(_, evidence)| evidence.len() as u64 >= rule.conditions.threshold)
        .map(|(ip, evidence)| {
            let description = format!(
                "{} failed authentication attempts from {ip} in {} minutes (threshold {})",
                evidence.len(),
                rule.conditions.window_minutes,
                rule.conditions.threshold
            );
            ViolationDraft {
                group_key: ip,
                description,
                evidence,
            }
        })
        .collect()
}

/// Flag accessors touching more distinct subjects than the threshold.
pub(crate) fn sensitive_access_pattern(
    rule: &ComplianceRule,
    events: &[AuditEvent],
) -> Vec<ViolationDraft> {
    #[derive(Default)]
    struct Access {
        targets: BTreeSet<String>,
        evidence: Vec<Uuid>,
    }

    let mut per_accessor: BTreeMap<Uuid, Access> = BTreeMap::new();
    for event in events {
        let Some(target) = event.details.get("target_user_id").and_then(Value::as_str) else {
            continue;
        };
        let Some(user_id) = event.user_id else {
            continue;
        };
        let access = per_accessor.entry(user_id).or_default();
        access.targets.insert(target.to_owned());
        access.evidence.push(event.id);
    }
    per_accessor
        .into_iter()
        .filter(|(_, access)| access.targets.len() as u64 > rule.conditions.threshold)
        .map(|(user_id, access)| {
            let description = format!(
                "user {user_id} accessed data of {} distinct users in {} minutes (threshold {})",
                access.targets.len(),
                rule.conditions.window_minutes,
                rule.conditions.threshold
            );
            ViolationDraft {
                group_key: user_id.to_string(),
                description,
                evidence: access.evidence,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consent::InMemoryConsentRegistry;
    use crate::rule::{DetectorKind, RuleConditions};
    use audit_store::{EventRepository, InMemoryEventRepository, NewAuditEvent};
    use field_crypto::NoOpCipher;
    use monitor_common::Severity;
    use serde_json::json;
    use std::sync::Arc;

    fn rule_with(threshold: u64, detector: DetectorKind) -> ComplianceRule {
        ComplianceRule {
            id: "test-rule".into(),
            name: "Test rule".into(),
            regulation: "SOC2".into(),
            severity: Severity::High,
            conditions: RuleConditions {
                event_type: None,
                action: None,
                resource: None,
                window_minutes: 60,
                threshold,
            },
            detector,
            enabled: true,
        }
    }

    fn event(action: &str, user_id: Option<Uuid>, details: Value) -> AuditEvent {
        AuditEvent {
            id: Uuid::new_v4(),
            event_type: "data_access".into(),
            user_id,
            session_id: None,
            resource: "records".into(),
            action: action.into(),
            details,
            ip_address: None,
            user_agent: None,
            timestamp: Utc::now(),
            severity: Severity::Low,
            compliance_flags: vec![],
        }
    }

    #[test]
    fn test_excessive_access_requires_exceeding_the_threshold() {
        let rule = rule_with(3, DetectorKind::ExcessiveAccess);
        let heavy = Uuid::new_v4();
        let light = Uuid::new_v4();

        let mut events = Vec::new();
        for _ in 0..4 {
            events.push(event("read", Some(heavy), json!({})));
        }
        for _ in 0..3 {
            // Exactly at the threshold: not flagged.
            events.push(event("read", Some(light), json!({})));
        }
        events.push(event("read", None, json!({})));

        let drafts = excessive_access(&rule, &events);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].group_key, heavy.to_string());
        assert_eq!(drafts[0].evidence.len(), 4);
    }

    #[test]
    fn test_unauthorized_export_checks_the_marker() {
        let user = Some(Uuid::new_v4());
        let events = vec![
            event("export", user, json!({"authorized": true})),
            event("export", user, json!({"authorized": "true"})),
            event("export", user, json!({})),
            event("download", user, json!({"authorized": false})),
            event("view", user, json!({})),
        ];

        let drafts = unauthorized_export(&events);
        assert_eq!(drafts.len(), 2);
        assert!(drafts.iter().all(|d| d.evidence.len() == 1));
    }

    #[test]
    fn test_failed_authentication_fires_at_the_threshold() {
        let rule = rule_with(3, DetectorKind::FailedAuthentication);
        let mut events = Vec::new();
        for _ in 0..3 {
            let mut e = event("login_failed", None, json!({}));
            e.ip_address = Some("10.0.0.5".into());
            events.push(e);
        }
        for _ in 0..2 {
            let mut e = event("login_failed", None, json!({}));
            e.ip_address = Some("10.0.0.9".into());
            events.push(e);
        }

        let drafts = failed_authentication(&rule, &events);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].group_key, "10.0.0.5");
        assert_eq!(drafts[0].evidence.len(), 3);
    }

    #[test]
    fn test_sensitive_access_counts_distinct_targets() {
        let rule = rule_with(2, DetectorKind::SensitiveAccessPattern);
        let accessor = Uuid::new_v4();

        let mut events = Vec::new();
        for target in ["subject-1", "subject-2", "subject-3", "subject-1"] {
            events.push(event(
                "read",
                Some(accessor),
                json!({"target_user_id": target}),
            ));
        }
        // Another accessor below the distinct-target threshold.
        events.push(event(
            "read",
            Some(Uuid::new_v4()),
            json!({"target_user_id": "subject-1"}),
        ));

        let drafts = sensitive_access_pattern(&rule, &events);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].group_key, accessor.to_string());
        // Evidence keeps every access, including the repeated target.
        assert_eq!(drafts[0].evidence.len(), 4);
    }

    #[tokio::test]
    async fn test_consent_violation_spares_consented_subjects() {
        let registry = InMemoryConsentRegistry::new();
        let consented = Uuid::new_v4();
        let unconsented = Uuid::new_v4();
        registry.grant(consented).await.unwrap();

        let mut events = Vec::new();
        for user in [consented, unconsented] {
            let mut e = event("process", Some(user), json!({}));
            e.compliance_flags = vec!["gdpr_relevant".into()];
            events.push(e);
        }
        // GDPR-relevant but not a processing action.
        let mut viewing = event("view", Some(unconsented), json!({}));
        viewing.compliance_flags = vec!["gdpr_relevant".into()];
        events.push(viewing);

        let drafts = consent_violation(&events, &registry).await.unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].group_key, unconsented.to_string());
        assert_eq!(drafts[0].evidence.len(), 1);
    }

    #[tokio::test]
    async fn test_retention_violation_scans_the_whole_store() {
        let repository = Arc::new(InMemoryEventRepository::new());
        let store = EventStore::new(repository.clone(), Arc::new(NoOpCipher));

        let drafts = retention_violation(&store, 30).await.unwrap();
        assert!(drafts.is_empty());

        let mut old = event("import", None, json!({}));
        old.timestamp = Utc::now() - Duration::days(45);
        repository.insert(old).await.unwrap();
        store
            .log(NewAuditEvent::new("page_view", "/home", "view"))
            .await
            .unwrap();

        let drafts = retention_violation(&store, 30).await.unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].group_key, "retention");
        assert_eq!(drafts[0].evidence.len(), 1);
        assert!(drafts[0].description.contains("30-day"));
    }
}
