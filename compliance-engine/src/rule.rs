//! Compliance rule definitions and the built-in catalogue.

use serde::{Deserialize, Serialize};

use monitor_common::Severity;

/// Detection strategy a rule dispatches to.
///
/// Rules are data, not closures; adding a strategy means adding a variant
/// and its detector, and existing rule definitions keep deserializing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    ExcessiveAccess,
    UnauthorizedExport,
    ConsentViolation,
    RetentionViolation,
    FailedAuthentication,
    SensitiveAccessPattern,
}

/// Event-shape filters and window parameters for a rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConditions {
    /// Restrict the window query to one event type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    /// Restrict the window query to one action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Restrict the window query to one resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    /// Sliding window the detector inspects, in minutes. The retention
    /// detector ignores this and scans the whole store.
    pub window_minutes: i64,
    /// Count the detector compares against; its exact meaning is per
    /// detector (events per user, attempts per IP, distinct targets).
    pub threshold: u64,
}

/// A declarative compliance rule.
///
/// Static configuration: after registration the only runtime mutation is
/// enable/disable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceRule {
    /// Stable slug, used in violations, dedup keys, and audit flags.
    pub id: String,
    pub name: String,
    /// Regulation the rule enforces, e.g. `GDPR` or `SOC2`.
    pub regulation: String,
    /// Severity assigned to violations this rule raises.
    pub severity: Severity,
    pub conditions: RuleConditions,
    pub detector: DetectorKind,
    pub enabled: bool,
}

/// The six built-in rules the engine ships with.
pub fn default_rules() -> Vec<ComplianceRule> {
    vec![
        ComplianceRule {
            id: "excessive-data-access".into(),
            name: "Excessive data access".into(),
            regulation: "SOC2".into(),
            severity: Severity::High,
            conditions: RuleConditions {
                event_type: Some("data_access".into()),
                action: None,
                resource: None,
                window_minutes: 60,
                threshold: 100,
            },
            detector: DetectorKind::ExcessiveAccess,
            enabled: true,
        },
        ComplianceRule {
            id: "unauthorized-data-export".into(),
            name: "Unauthorized data export".into(),
            regulation: "GDPR".into(),
            severity: Severity::Critical,
            conditions: RuleConditions {
                event_type: None,
                action: None,
                resource: None,
                window_minutes: 60,
                threshold: 1,
            },
            detector: DetectorKind::UnauthorizedExport,
            enabled: true,
        },
        ComplianceRule {
            id: "consent-before-processing".into(),
            name: "Consent before processing".into(),
            regulation: "GDPR".into(),
            severity: Severity::Critical,
            conditions: RuleConditions {
                event_type: None,
                action: None,
                resource: None,
                window_minutes: 1440,
                threshold: 1,
            },
            detector: DetectorKind::ConsentViolation,
            enabled: true,
        },
        ComplianceRule {
            id: "retention-limit-exceeded".into(),
            name: "Retention limit exceeded".into(),
            regulation: "GDPR".into(),
            severity: Severity::Medium,
            conditions: RuleConditions {
                event_type: None,
                action: None,
                resource: None,
                window_minutes: 1440,
                threshold: 1,
            },
            detector: DetectorKind::RetentionViolation,
            enabled: true,
        },
        ComplianceRule {
            id: "failed-authentication-burst".into(),
            name: "Failed authentication burst".into(),
            regulation: "SOC2".into(),
            severity: Severity::High,
            conditions: RuleConditions {
                event_type: Some("authentication".into()),
                action: Some("login_failed".into()),
                resource: None,
                window_minutes: 15,
                threshold: 5,
            },
            detector: DetectorKind::FailedAuthentication,
            enabled: true,
        },
        ComplianceRule {
            id: "sensitive-access-pattern".into(),
            name: "Cross-subject access pattern".into(),
            regulation: "SOC2".into(),
            severity: Severity::High,
            conditions: RuleConditions {
                event_type: None,
                action: None,
                resource: None,
                window_minutes: 60,
                threshold: 10,
            },
            detector: DetectorKind::SensitiveAccessPattern,
            enabled: true,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules_are_complete_and_enabled() {
        let rules = default_rules();
        assert_eq!(rules.len(), 6);
        assert!(rules.iter().all(|r| r.enabled));

        // Slugs are unique.
        let mut ids: Vec<&str> = rules.iter().map(|r| r.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 6);
    }

    #[test]
    fn test_failed_authentication_rule_parameters() {
        let rules = default_rules();
        let rule = rules
            .iter()
            .find(|r| r.detector == DetectorKind::FailedAuthentication)
            .unwrap();
        assert_eq!(rule.conditions.threshold, 5);
        assert_eq!(rule.conditions.window_minutes, 15);
        assert_eq!(rule.conditions.event_type.as_deref(), Some("authentication"));
        assert_eq!(rule.conditions.action.as_deref(), Some("login_failed"));
    }

    #[test]
    fn test_rule_roundtrips_through_json() {
        let rules = default_rules();
        let json = serde_json::to_string(&rules).unwrap();
        let parsed: Vec<ComplianceRule> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), rules.len());
        assert_eq!(parsed[0].detector, rules[0].detector);
    }
}
