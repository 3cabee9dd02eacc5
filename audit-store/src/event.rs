//! Audit event model and query types.

use chrono::{DateTime, Utc};
use monitor_common::Severity;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A single entry in the append-only audit trail.
///
/// Immutable once written. `timestamp` is assigned by the store at write
/// time; caller-supplied times are never trusted. `compliance_flags` has
/// set semantics and is stored sorted and deduplicated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub event_type: String,
    pub user_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
    pub resource: String,
    pub action: String,
    /// Structured context. Allow-listed top-level keys are encrypted in
    /// place before storage.
    pub details: Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub compliance_flags: Vec<String>,
}

/// Caller-supplied portion of an event; the store stamps id and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAuditEvent {
    pub event_type: String,
    pub resource: String,
    pub action: String,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub session_id: Option<Uuid>,
    #[serde(default = "empty_object")]
    pub details: Value,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub compliance_flags: Vec<String>,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

impl NewAuditEvent {
    pub fn new(
        event_type: impl Into<String>,
        resource: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            resource: resource.into(),
            action: action.into(),
            user_id: None,
            session_id: None,
            details: empty_object(),
            ip_address: None,
            user_agent: None,
            severity: Severity::Low,
            compliance_flags: Vec::new(),
        }
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_session(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_ip_address(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.compliance_flags.push(flag.into());
        self
    }
}

/// Conjunctive filter for event queries. `None` members match anything;
/// time bounds are inclusive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFilter {
    pub event_type: Option<String>,
    pub user_id: Option<Uuid>,
    pub resource: Option<String>,
    pub action: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Match any of these severities; empty means all.
    #[serde(default)]
    pub severities: Vec<Severity>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    100
}

impl Default for EventFilter {
    fn default() -> Self {
        Self {
            event_type: None,
            user_id: None,
            resource: None,
            action: None,
            from: None,
            to: None,
            severities: Vec::new(),
            limit: default_limit(),
            offset: 0,
        }
    }
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn since(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }

    pub fn until(mut self, to: DateTime<Utc>) -> Self {
        self.to = Some(to);
        self
    }

    pub fn with_severities(mut self, severities: Vec<Severity>) -> Self {
        self.severities = severities;
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    /// Whether an event satisfies every set member of the filter.
    pub fn matches(&self, event: &AuditEvent) -> bool {
        if let Some(ref event_type) = self.event_type {
            if event.event_type != *event_type {
                return false;
            }
        }
        if let Some(user_id) = self.user_id {
            if event.user_id != Some(user_id) {
                return false;
            }
        }
        if let Some(ref resource) = self.resource {
            if event.resource != *resource {
                return false;
            }
        }
        if let Some(ref action) = self.action {
            if event.action != *action {
                return false;
            }
        }
        if let Some(from) = self.from {
            if event.timestamp < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if event.timestamp > to {
                return false;
            }
        }
        if !self.severities.is_empty() && !self.severities.contains(&event.severity) {
            return false;
        }
        true
    }
}

/// One (event_type, action, severity, flags) bucket of a summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventGroup {
    pub event_type: String,
    pub action: String,
    pub severity: Severity,
    pub compliance_flags: Vec<String>,
    pub count: u64,
    pub distinct_users: u64,
    pub first_occurrence: DateTime<Utc>,
    pub last_occurrence: DateTime<Utc>,
}

/// Aggregated view of the trail over a reporting window.
///
/// Groups are ordered by descending count so the heaviest activity reads
/// first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSummary {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub total_events: u64,
    pub distinct_users: u64,
    pub groups: Vec<EventGroup>,
}

impl AuditSummary {
    /// Total events at or above the given severity.
    pub fn count_at_or_above(&self, severity: Severity) -> u64 {
        self.groups
            .iter()
            .filter(|group| group.severity >= severity)
            .map(|group| group.count)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event_with(event_type: &str, severity: Severity) -> AuditEvent {
        AuditEvent {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            user_id: Some(Uuid::new_v4()),
            session_id: None,
            resource: "contact_form".into(),
            action: "submit".into(),
            details: json!({}),
            ip_address: Some("203.0.113.9".into()),
            user_agent: None,
            timestamp: Utc::now(),
            severity,
            compliance_flags: vec![],
        }
    }

    #[test]
    fn test_filter_matches_conjunctively() {
        let event = event_with("data_access", Severity::Medium);

        assert!(EventFilter::new().matches(&event));
        assert!(EventFilter::new()
            .with_event_type("data_access")
            .with_action("submit")
            .matches(&event));
        assert!(!EventFilter::new()
            .with_event_type("data_access")
            .with_action("delete")
            .matches(&event));
        assert!(!EventFilter::new().with_user(Uuid::new_v4()).matches(&event));
    }

    #[test]
    fn test_filter_time_bounds_are_inclusive() {
        let event = event_with("data_access", Severity::Low);
        let at = event.timestamp;

        assert!(EventFilter::new().since(at).until(at).matches(&event));
        assert!(!EventFilter::new()
            .since(at + chrono::Duration::seconds(1))
            .matches(&event));
        assert!(!EventFilter::new()
            .until(at - chrono::Duration::seconds(1))
            .matches(&event));
    }

    #[test]
    fn test_filter_severities() {
        let event = event_with("auth", Severity::High);
        assert!(EventFilter::new()
            .with_severities(vec![Severity::High, Severity::Critical])
            .matches(&event));
        assert!(!EventFilter::new()
            .with_severities(vec![Severity::Low])
            .matches(&event));
    }

    #[test]
    fn test_summary_counts_at_or_above() {
        let now = Utc::now();
        let group = |severity: Severity, count: u64| EventGroup {
            event_type: "t".into(),
            action: "a".into(),
            severity,
            compliance_flags: vec![],
            count,
            distinct_users: 1,
            first_occurrence: now,
            last_occurrence: now,
        };
        let summary = AuditSummary {
            period_start: now,
            period_end: now,
            total_events: 10,
            distinct_users: 3,
            groups: vec![
                group(Severity::Low, 5),
                group(Severity::High, 3),
                group(Severity::Critical, 2),
            ],
        };

        assert_eq!(summary.count_at_or_above(Severity::High), 5);
        assert_eq!(summary.count_at_or_above(Severity::Critical), 2);
        assert_eq!(summary.count_at_or_above(Severity::Low), 10);
    }
}
