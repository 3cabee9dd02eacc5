//! Scheduled rule evaluation over the audit trail.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use audit_store::{AuditEvent, EventFilter, EventStore, NewAuditEvent};
use escalation::{EscalationSink, Finding};
use monitor_common::{ResolveOutcome, RiskLevel, Severity, Ticker, TtlCache};

use crate::consent::ConsentRegistry;
use crate::detectors;
use crate::error::{EngineError, Result};
use crate::rule::{default_rules, ComplianceRule, DetectorKind};
use crate::violation::{ComplianceViolation, ViolationFilter, ViolationRepository};

/// Cap on events fetched per rule window. A window busier than this is
/// evaluated over its most recent events.
const WINDOW_EVENT_LIMIT: i64 = 10_000;

const DEDUP_CAPACITY: usize = 4096;

/// Compliance posture over a trailing period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceMetrics {
    pub period_days: i64,
    pub total_events: u64,
    pub violation_count: u64,
    /// Violations per hundred events.
    pub violation_rate: f64,
    /// `max(0, 100 - violation_rate * 10)`.
    pub compliance_score: f64,
    pub risk_level: RiskLevel,
}

/// Evaluates the rule registry against sliding windows of audit events.
///
/// One evaluation pass runs at a time: the scheduled ticker and manual
/// `evaluate` calls share a try-lock, and an overlapping attempt returns
/// [`EngineError::EvaluationInProgress`] instead of queueing.
pub struct RuleEvaluator {
    rules: RwLock<HashMap<String, ComplianceRule>>,
    store: Arc<EventStore>,
    violations: Arc<dyn ViolationRepository>,
    consent: Arc<dyn ConsentRegistry>,
    sink: Arc<EscalationSink>,
    dedup: TtlCache<String, ()>,
    evaluation_guard: tokio::sync::Mutex<()>,
    ticker: Mutex<Option<Ticker>>,
    ticker_busy: Arc<AtomicBool>,
}

impl RuleEvaluator {
    /// Evaluator preloaded with the built-in rule catalogue.
    pub fn new(
        store: Arc<EventStore>,
        violations: Arc<dyn ViolationRepository>,
        consent: Arc<dyn ConsentRegistry>,
        sink: Arc<EscalationSink>,
    ) -> Self {
        let mut rules = HashMap::new();
        for rule in default_rules() {
            rules.insert(rule.id.clone(), rule);
        }
        Self {
            rules: RwLock::new(rules),
            store,
            violations,
            consent,
            sink,
            dedup: TtlCache::new(DEDUP_CAPACITY, StdDuration::from_secs(900)),
            evaluation_guard: tokio::sync::Mutex::new(()),
            ticker: Mutex::new(None),
            ticker_busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Add a rule, replacing any existing rule with the same id.
    pub fn register_rule(&self, rule: ComplianceRule) {
        self.rules.write().insert(rule.id.clone(), rule);
    }

    /// Enable or disable a rule. Returns false for an unknown id.
    pub fn set_rule_enabled(&self, rule_id: &str, enabled: bool) -> bool {
        match self.rules.write().get_mut(rule_id) {
            Some(rule) => {
                rule.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Snapshot of the registry, ordered by rule id.
    pub fn rules(&self) -> Vec<ComplianceRule> {
        let mut rules: Vec<ComplianceRule> = self.rules.read().values().cloned().collect();
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        rules
    }

    /// Run every enabled rule once and return the newly raised violations.
    ///
    /// Rules are isolated: a failing query or detector is logged and the
    /// pass moves on. New violations are persisted first, then escalated.
    pub async fn evaluate(&self) -> Result<Vec<ComplianceViolation>> {
        let Ok(_guard) = self.evaluation_guard.try_lock() else {
            return Err(EngineError::EvaluationInProgress);
        };

        let mut rules: Vec<ComplianceRule> = {
            let registry = self.rules.read();
            registry
                .values()
                .filter(|rule| rule.enabled)
                .cloned()
                .collect()
        };
        rules.sort_by(|a, b| a.id.cmp(&b.id));

        let now = Utc::now();
        let mut raised = Vec::new();
        let mut findings = Vec::new();
        for rule in &rules {
            match self.evaluate_rule(rule, now).await {
                Ok(violations) => {
                    for violation in &violations {
                        findings.push(
                            Finding::rule_violation(
                                violation.id,
                                rule.id.clone(),
                                rule.name.clone(),
                                rule.regulation.clone(),
                                violation.severity,
                                violation.description.clone(),
                            )
                            .with_detected_at(violation.detected_at),
                        );
                    }
                    raised.extend(violations);
                }
                Err(e) => {
                    warn!(
                        target: "compliance",
                        rule_id = %rule.id,
                        error = %e,
                        "rule evaluation failed"
                    );
                }
            }
        }

        if !findings.is_empty() {
            self.sink.handle(&findings).await;
        }
        debug!(
            target: "compliance",
            rules = rules.len(),
            violations = raised.len(),
            "evaluation pass complete"
        );
        Ok(raised)
    }

    async fn evaluate_rule(
        &self,
        rule: &ComplianceRule,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<ComplianceViolation>> {
        let drafts = if rule.detector == DetectorKind::RetentionViolation {
            detectors::retention_violation(&self.store, self.store.retention_days()).await?
        } else {
            let window_start = now - Duration::minutes(rule.conditions.window_minutes);
            let events = self.window_events(rule, window_start, now).await?;
            match rule.detector {
                DetectorKind::ExcessiveAccess => detectors::excessive_access(rule, &events),
                DetectorKind::UnauthorizedExport => detectors::unauthorized_export(&events),
                DetectorKind::ConsentViolation => {
                    detectors::consent_violation(&events, self.consent.as_ref()).await?
                }
                DetectorKind::FailedAuthentication => {
                    detectors::failed_authentication(rule, &events)
                }
                DetectorKind::SensitiveAccessPattern => {
                    detectors::sensitive_access_pattern(rule, &events)
                }
                // Dispatched before the window query.
                DetectorKind::RetentionViolation => Vec::new(),
            }
        };

        let mut violations = Vec::new();
        for draft in drafts {
            let dedup_key = format!("{}:{}", rule.id, draft.group_key);
            if !self.dedup.insert_if_vacant(dedup_key, (), dedup_ttl(rule)) {
                debug!(
                    target: "compliance",
                    rule_id = %rule.id,
                    group = %draft.group_key,
                    "violation suppressed inside its dedup window"
                );
                continue;
            }
            let violation = ComplianceViolation {
                id: Uuid::new_v4(),
                rule_id: rule.id.clone(),
                rule_name: rule.name.clone(),
                severity: rule.severity,
                description: draft.description,
                evidence: draft.evidence,
                detected_at: now,
                resolved: false,
                resolved_at: None,
                resolved_by: None,
                notes: None,
            };
            self.violations.insert(violation.clone()).await?;
            info!(
                target: "compliance",
                rule_id = %rule.id,
                violation_id = %violation.id,
                severity = %violation.severity,
                "compliance violation detected"
            );
            violations.push(violation);
        }
        Ok(violations)
    }

    async fn window_events(
        &self,
        rule: &ComplianceRule,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AuditEvent>> {
        let mut filter = EventFilter::new()
            .since(from)
            .until(to)
            .with_limit(WINDOW_EVENT_LIMIT);
        if let Some(event_type) = &rule.conditions.event_type {
            filter = filter.with_event_type(event_type.clone());
        }
        if let Some(action) = &rule.conditions.action {
            filter = filter.with_action(action.clone());
        }
        if let Some(resource) = &rule.conditions.resource {
            filter = filter.with_resource(resource.clone());
        }
        Ok(self.store.query(&filter).await?)
    }

    /// Compliance posture over the trailing `days`.
    pub async fn metrics(&self, days: i64) -> Result<ComplianceMetrics> {
        let now = Utc::now();
        let start = now - Duration::days(days.max(0));
        let total_events = self
            .store
            .count(&EventFilter::new().since(start).until(now))
            .await?;
        let violation_count = self.violations.count_since(start).await?;

        let violation_rate = if total_events == 0 {
            0.0
        } else {
            (violation_count as f64 / total_events as f64) * 100.0
        };
        let compliance_score = (100.0 - violation_rate * 10.0).max(0.0);

        Ok(ComplianceMetrics {
            period_days: days,
            total_events,
            violation_count,
            violation_rate,
            compliance_score,
            risk_level: RiskLevel::from_rate(violation_rate),
        })
    }

    /// List stored violations, newest first.
    pub async fn list_violations(
        &self,
        filter: &ViolationFilter,
    ) -> Result<Vec<ComplianceViolation>> {
        self.violations.fetch(filter).await
    }

    pub async fn open_violation_count(&self) -> Result<u64> {
        self.violations.count_open().await
    }

    /// Resolve a violation. Resolution is one-way and first-writer-wins:
    /// resolving an already-resolved violation returns the stored record
    /// unchanged, with the original resolver's metadata.
    pub async fn resolve(
        &self,
        id: Uuid,
        resolved_by: &str,
        notes: Option<&str>,
    ) -> Result<ComplianceViolation> {
        match self
            .violations
            .resolve_if_unresolved(id, resolved_by, notes, Utc::now())
            .await?
        {
            ResolveOutcome::Applied(violation) => {
                let event = NewAuditEvent::new(
                    "violation_resolved",
                    violation.id.to_string(),
                    "resolve",
                )
                .with_severity(Severity::Low)
                .with_details(json!({
                    "rule_id": violation.rule_id,
                    "resolved_by": resolved_by,
                    "notes": notes,
                }));
                if let Err(e) = self.store.log(event).await {
                    warn!(
                        target: "compliance",
                        violation_id = %id,
                        error = %e,
                        "failed to record resolution in the audit trail"
                    );
                }
                info!(target: "compliance", violation_id = %id, resolved_by, "violation resolved");
                Ok(violation)
            }
            ResolveOutcome::AlreadyResolved(violation) => Ok(violation),
            ResolveOutcome::NotFound => Err(EngineError::ViolationNotFound(id)),
        }
    }

    /// Start scheduled evaluation, replacing any running schedule.
    pub fn start(self: Arc<Self>, interval: StdDuration) {
        let mut slot = self.ticker.lock();
        if let Some(previous) = slot.take() {
            previous.stop();
        }
        let evaluator = Arc::clone(&self);
        *slot = Some(Ticker::spawn(
            "rule-evaluation",
            interval,
            Arc::clone(&self.ticker_busy),
            move || {
                let evaluator = Arc::clone(&evaluator);
                async move {
                    match evaluator.evaluate().await {
                        Ok(violations) if violations.is_empty() => {}
                        Ok(violations) => {
                            info!(
                                target: "compliance",
                                count = violations.len(),
                                "scheduled evaluation raised violations"
                            );
                        }
                        Err(EngineError::EvaluationInProgress) => {
                            debug!(
                                target: "compliance",
                                "scheduled evaluation skipped, a pass is still running"
                            );
                        }
                        Err(e) => {
                            warn!(
                                target: "compliance",
                                error = %e,
                                "scheduled evaluation failed"
                            );
                        }
                    }
                }
            },
        ));
    }

    /// Cancel future scheduled evaluations. An in-flight pass completes.
    pub fn stop(&self) {
        if let Some(ticker) = self.ticker.lock().take() {
            ticker.stop();
        }
    }

    pub fn is_running(&self) -> bool {
        self.ticker
            .lock()
            .as_ref()
            .is_some_and(|ticker| !ticker.is_finished())
    }
}

fn dedup_ttl(rule: &ComplianceRule) -> StdDuration {
    let minutes = u64::try_from(rule.conditions.window_minutes)
        .unwrap_or(0)
        .max(1);
    StdDuration::from_secs(minutes * 60)
}
