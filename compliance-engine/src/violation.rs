//! Violation records and their storage.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use monitor_common::{ResolveOutcome, Severity};

use crate::error::Result;

pub mod postgres;

/// A detected compliance violation.
///
/// Created only by the evaluator. The single allowed mutation is one-way
/// resolution; records are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceViolation {
    pub id: Uuid,
    pub rule_id: String,
    pub rule_name: String,
    pub severity: Severity,
    pub description: String,
    /// Ids of the audit events that triggered the detection. A read-only
    /// link: retention cleanup may later remove the events themselves.
    pub evidence: Vec<Uuid>,
    pub detected_at: DateTime<Utc>,
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Conjunctive filter for listing violations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl Default for ViolationFilter {
    fn default() -> Self {
        Self {
            rule_id: None,
            resolved: None,
            severity: None,
            since: None,
            limit: 100,
        }
    }
}

impl ViolationFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, rule_id: impl Into<String>) -> Self {
        self.rule_id = Some(rule_id.into());
        self
    }

    pub fn with_resolved(mut self, resolved: bool) -> Self {
        self.resolved = Some(resolved);
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    fn matches(&self, violation: &ComplianceViolation) -> bool {
        if let Some(rule_id) = &self.rule_id {
            if &violation.rule_id != rule_id {
                return false;
            }
        }
        if let Some(resolved) = self.resolved {
            if violation.resolved != resolved {
                return false;
            }
        }
        if let Some(severity) = self.severity {
            if violation.severity != severity {
                return false;
            }
        }
        if let Some(since) = self.since {
            if violation.detected_at < since {
                return false;
            }
        }
        true
    }
}

/// Violation persistence contract.
#[async_trait]
pub trait ViolationRepository: Send + Sync {
    async fn insert(&self, violation: ComplianceViolation) -> Result<()>;

    /// Fetch matching violations, newest first, up to the filter's limit.
    async fn fetch(&self, filter: &ViolationFilter) -> Result<Vec<ComplianceViolation>>;

    async fn get(&self, id: Uuid) -> Result<Option<ComplianceViolation>>;

    /// Violations detected at or after the cutoff, for metrics.
    async fn count_since(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Unresolved violations on record.
    async fn count_open(&self) -> Result<u64>;

    /// Apply resolution metadata only if the record is still unresolved.
    async fn resolve_if_unresolved(
        &self,
        id: Uuid,
        resolved_by: &str,
        notes: Option<&str>,
        resolved_at: DateTime<Utc>,
    ) -> Result<ResolveOutcome<ComplianceViolation>>;
}

/// Thread-safe in-memory repository for embedded and test use.
#[derive(Default, Clone)]
pub struct InMemoryViolationRepository {
    violations: Arc<DashMap<Uuid, ComplianceViolation>>,
}

impl InMemoryViolationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ViolationRepository for InMemoryViolationRepository {
    async fn insert(&self, violation: ComplianceViolation) -> Result<()> {
        self.violations.insert(violation.id, violation);
        Ok(())
    }

    async fn fetch(&self, filter: &ViolationFilter) -> Result<Vec<ComplianceViolation>> {
        let mut matching: Vec<ComplianceViolation> = self
            .violations
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        matching.sort_by(|a, b| {
            b.detected_at
                .cmp(&a.detected_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        matching.truncate(filter.limit);
        Ok(matching)
    }

    async fn get(&self, id: Uuid) -> Result<Option<ComplianceViolation>> {
        Ok(self.violations.get(&id).map(|entry| entry.value().clone()))
    }

    async fn count_since(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        Ok(self
            .violations
            .iter()
            .filter(|entry| entry.detected_at >= cutoff)
            .count() as u64)
    }

    async fn count_open(&self) -> Result<u64> {
        Ok(self
            .violations
            .iter()
            .filter(|entry| !entry.resolved)
            .count() as u64)
    }

    async fn resolve_if_unresolved(
        &self,
        id: Uuid,
        resolved_by: &str,
        notes: Option<&str>,
        resolved_at: DateTime<Utc>,
    ) -> Result<ResolveOutcome<ComplianceViolation>> {
        let Some(mut entry) = self.violations.get_mut(&id) else {
            return Ok(ResolveOutcome::NotFound);
        };
        if entry.resolved {
            return Ok(ResolveOutcome::AlreadyResolved(entry.clone()));
        }
        entry.resolved = true;
        entry.resolved_at = Some(resolved_at);
        entry.resolved_by = Some(resolved_by.to_owned());
        entry.notes = notes.map(str::to_owned);
        Ok(ResolveOutcome::Applied(entry.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation(rule_id: &str, severity: Severity) -> ComplianceViolation {
        ComplianceViolation {
            id: Uuid::new_v4(),
            rule_id: rule_id.into(),
            rule_name: "Test rule".into(),
            severity,
            description: "test".into(),
            evidence: vec![Uuid::new_v4()],
            detected_at: Utc::now(),
            resolved: false,
            resolved_at: None,
            resolved_by: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_fetch_applies_filters_and_limit() {
        let repo = InMemoryViolationRepository::new();
        repo.insert(violation("rule-a", Severity::High)).await.unwrap();
        repo.insert(violation("rule-a", Severity::Low)).await.unwrap();
        repo.insert(violation("rule-b", Severity::High)).await.unwrap();

        let by_rule = repo
            .fetch(&ViolationFilter::new().with_rule("rule-a"))
            .await
            .unwrap();
        assert_eq!(by_rule.len(), 2);

        let by_severity = repo
            .fetch(&ViolationFilter::new().with_severity(Severity::High))
            .await
            .unwrap();
        assert_eq!(by_severity.len(), 2);

        let limited = repo
            .fetch(&ViolationFilter::new().with_limit(1))
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_resolution_is_conditional() {
        let repo = InMemoryViolationRepository::new();
        let v = violation("rule-a", Severity::High);
        let id = v.id;
        repo.insert(v).await.unwrap();
        assert_eq!(repo.count_open().await.unwrap(), 1);

        let first = repo
            .resolve_if_unresolved(id, "admin", Some("fixed"), Utc::now())
            .await
            .unwrap();
        let ResolveOutcome::Applied(applied) = first else {
            panic!("first resolution should apply");
        };
        assert!(applied.resolved);
        assert_eq!(applied.resolved_by.as_deref(), Some("admin"));
        assert_eq!(repo.count_open().await.unwrap(), 0);

        // A second resolver changes nothing.
        let second = repo
            .resolve_if_unresolved(id, "intruder", Some("overwrite"), Utc::now())
            .await
            .unwrap();
        let ResolveOutcome::AlreadyResolved(kept) = second else {
            panic!("second resolution should be a no-op");
        };
        assert_eq!(kept.resolved_by.as_deref(), Some("admin"));
        assert_eq!(kept.notes.as_deref(), Some("fixed"));

        let missing = repo
            .resolve_if_unresolved(Uuid::new_v4(), "admin", None, Utc::now())
            .await
            .unwrap();
        assert!(matches!(missing, ResolveOutcome::NotFound));
    }
}
