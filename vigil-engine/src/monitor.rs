//! The compliance monitor facade.
//!
//! [`ComplianceMonitor`] wires the audit store, rule evaluator,
//! escalation sink and probe runner into one handle, validates
//! caller-supplied parameters before they reach a component, and owns
//! the start/stop lifecycle of the background schedules.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use audit_store::{
    AuditEvent, EventFilter, EventStore, InMemoryEventRepository, NewAuditEvent,
};
use compliance_engine::{
    ComplianceMetrics, ComplianceViolation, InMemoryConsentRegistry,
    InMemoryViolationRepository, RuleEvaluator, ViolationFilter,
};
use escalation::{EscalationSink, LogAlertChannel};
use field_crypto::Aes256GcmCipher;
use security_probes::{
    InMemoryTestResultRepository, InMemoryVulnerabilityRepository, ProbeRunner,
    SandboxSurface, SecurityTestResult, SecurityVulnerability, TargetSurface,
    VulnerabilityFilter,
};

use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::report::ComplianceReport;

/// Largest page a single event query may request.
pub const MAX_QUERY_LIMIT: i64 = 1000;
/// Largest metrics window, in days.
pub const MAX_METRICS_DAYS: i64 = 365;
/// Largest probe history page.
pub const MAX_HISTORY_LIMIT: usize = 1000;

/// Point-in-time operational counters.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    pub initialized: bool,
    pub monitoring_active: bool,
    pub total_events: u64,
    pub open_violations: u64,
    pub open_vulnerabilities: u64,
    pub enabled_rules: usize,
    pub enabled_probes: usize,
}

/// One handle over the whole monitoring engine.
///
/// `start` and `stop` are idempotent; everything else can be called
/// whether or not the schedules are running.
pub struct ComplianceMonitor {
    config: MonitorConfig,
    store: Arc<EventStore>,
    evaluator: Arc<RuleEvaluator>,
    runner: Arc<ProbeRunner>,
    active: AtomicBool,
}

impl ComplianceMonitor {
    /// Assemble a monitor from pre-built components. Production wiring
    /// builds the Postgres-backed repositories and passes them in here;
    /// [`ComplianceMonitor::in_memory`] covers everything else.
    pub fn new(
        config: MonitorConfig,
        store: Arc<EventStore>,
        evaluator: Arc<RuleEvaluator>,
        runner: Arc<ProbeRunner>,
    ) -> Self {
        Self {
            config,
            store,
            evaluator,
            runner,
            active: AtomicBool::new(false),
        }
    }

    /// Fully in-memory monitor probing the hardened sandbox surface,
    /// with a freshly generated encryption key.
    pub fn in_memory(config: MonitorConfig) -> Result<Self> {
        Self::in_memory_with_surface(config, Arc::new(SandboxSurface::hardened()))
    }

    /// In-memory monitor probing the given surface. Drills hand in a
    /// deliberately flawed sandbox to watch the probes catch it.
    pub fn in_memory_with_surface(
        config: MonitorConfig,
        surface: Arc<dyn TargetSurface>,
    ) -> Result<Self> {
        let cipher = Aes256GcmCipher::new(Aes256GcmCipher::generate_key())?
            .with_salt_length(config.anonymization.hash_salt_length);
        let store = Arc::new(
            EventStore::new(Arc::new(InMemoryEventRepository::new()), Arc::new(cipher))
                .with_sensitive_fields(config.sensitive_fields.clone())
                .with_retention_days(config.retention_days),
        );
        let sink = Arc::new(EscalationSink::new(
            Arc::clone(&store),
            Arc::new(LogAlertChannel),
        ));
        let evaluator = Arc::new(RuleEvaluator::new(
            Arc::clone(&store),
            Arc::new(InMemoryViolationRepository::new()),
            Arc::new(InMemoryConsentRegistry::new()),
            Arc::clone(&sink),
        ));
        let runner = Arc::new(
            ProbeRunner::new(
                surface,
                Arc::clone(&store),
                Arc::new(InMemoryVulnerabilityRepository::new()),
                Arc::new(InMemoryTestResultRepository::new()),
                sink,
            )
            .with_timeout(StdDuration::from_secs(config.probe_timeout_secs)),
        );
        Ok(Self::new(config, store, evaluator, runner))
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Underlying event store, for callers needing store-level
    /// operations the facade does not mirror.
    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    /// Underlying rule evaluator, for rule registry management.
    pub fn evaluator(&self) -> &Arc<RuleEvaluator> {
        &self.evaluator
    }

    /// Underlying probe runner, for probe registry management.
    pub fn runner(&self) -> &Arc<ProbeRunner> {
        &self.runner
    }

    // --- audit trail ---

    /// Record one event, encrypting sensitive detail fields.
    pub async fn log_event(&self, event: NewAuditEvent) -> Result<Uuid> {
        Ok(self.store.log(event).await?)
    }

    /// Query events with decrypted details. Pagination and time bounds
    /// are validated before the store sees them.
    pub async fn query_events(&self, filter: &EventFilter) -> Result<Vec<AuditEvent>> {
        if !(1..=MAX_QUERY_LIMIT).contains(&filter.limit) {
            return Err(MonitorError::Validation(format!(
                "limit must be between 1 and {MAX_QUERY_LIMIT}, got {}",
                filter.limit
            )));
        }
        if filter.offset < 0 {
            return Err(MonitorError::Validation(format!(
                "offset must not be negative, got {}",
                filter.offset
            )));
        }
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from > to {
                return Err(MonitorError::Validation(
                    "query window starts after it ends".to_owned(),
                ));
            }
        }
        Ok(self.store.query(filter).await?)
    }

    /// Delete events past the configured retention window.
    pub async fn cleanup_expired_events(&self) -> Result<u64> {
        Ok(self.store.cleanup_expired().await?)
    }

    // --- reporting ---

    /// Merged report over the period: audit summary, rule metrics over
    /// the same number of days, and the latest probe run.
    pub async fn report(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<ComplianceReport> {
        if start > end {
            return Err(MonitorError::Validation(
                "report period starts after it ends".to_owned(),
            ));
        }
        let days = (end - start).num_days().clamp(1, MAX_METRICS_DAYS);
        let audit = self.store.report(start, end).await?;
        let rules = self.evaluator.metrics(days).await?;
        let probes = self.runner.latest_run_summary().await?;
        Ok(ComplianceReport::assemble(start, end, audit, rules, probes))
    }

    /// Rule engine metrics over the trailing window.
    pub async fn metrics(&self, days: i64) -> Result<ComplianceMetrics> {
        if !(1..=MAX_METRICS_DAYS).contains(&days) {
            return Err(MonitorError::Validation(format!(
                "metrics window must be between 1 and {MAX_METRICS_DAYS} days, got {days}"
            )));
        }
        Ok(self.evaluator.metrics(days).await?)
    }

    // --- rule engine ---

    /// Run every enabled rule once, returning newly raised violations.
    pub async fn evaluate_rules_now(&self) -> Result<Vec<ComplianceViolation>> {
        Ok(self.evaluator.evaluate().await?)
    }

    pub async fn list_violations(
        &self,
        filter: &ViolationFilter,
    ) -> Result<Vec<ComplianceViolation>> {
        Ok(self.evaluator.list_violations(filter).await?)
    }

    /// Resolve a violation. Resolution is one-way; a repeat call
    /// returns the stored record with the original resolver's metadata.
    pub async fn resolve_violation(
        &self,
        id: Uuid,
        resolved_by: &str,
        notes: Option<&str>,
    ) -> Result<ComplianceViolation> {
        Ok(self.evaluator.resolve(id, resolved_by, notes).await?)
    }

    // --- security probes ---

    /// Run every enabled probe once, regardless of cadence.
    pub async fn run_probes_now(&self) -> Result<Vec<SecurityTestResult>> {
        Ok(self.runner.run_all_tests().await?)
    }

    pub async fn list_vulnerabilities(
        &self,
        filter: &VulnerabilityFilter,
    ) -> Result<Vec<SecurityVulnerability>> {
        Ok(self.runner.vulnerabilities(filter).await?)
    }

    /// Most recent probe results, newest first.
    pub async fn probe_history(&self, limit: usize) -> Result<Vec<SecurityTestResult>> {
        if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
            return Err(MonitorError::Validation(format!(
                "history limit must be between 1 and {MAX_HISTORY_LIMIT}, got {limit}"
            )));
        }
        Ok(self.runner.test_history(limit).await?)
    }

    /// Resolve a vulnerability. Resolution is one-way; a repeat call
    /// returns the stored record with the original resolver's metadata.
    pub async fn resolve_vulnerability(
        &self,
        id: Uuid,
        resolved_by: &str,
        notes: Option<&str>,
    ) -> Result<SecurityVulnerability> {
        Ok(self
            .runner
            .resolve_vulnerability(id, resolved_by, notes)
            .await?)
    }

    // --- lifecycle ---

    /// Start the rule evaluation schedule and, when enabled, the probe
    /// tickers. Calling `start` on an active monitor does nothing.
    pub fn start(&self) {
        if self.active.swap(true, Ordering::SeqCst) {
            return;
        }
        Arc::clone(&self.evaluator)
            .start(StdDuration::from_secs(self.config.rule_interval_minutes * 60));
        if self.config.probe_automation_enabled {
            Arc::clone(&self.runner).start_automation(StdDuration::from_secs(
                self.config.probe_interval_minutes * 60,
            ));
        }
        info!(
            target: "monitor",
            rule_interval_minutes = self.config.rule_interval_minutes,
            probe_automation = self.config.probe_automation_enabled,
            "monitoring started"
        );
    }

    /// Stop the background schedules. In-flight passes finish on their
    /// own; calling `stop` on an inactive monitor does nothing.
    pub fn stop(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        self.evaluator.stop();
        self.runner.stop_automation();
        info!(target: "monitor", "monitoring stopped");
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Operational counters across all three components.
    pub async fn status(&self) -> Result<MonitorStatus> {
        let total_events = self.store.count(&EventFilter::default()).await?;
        let open_violations = self.evaluator.open_violation_count().await?;
        let open_vulnerabilities = self.runner.open_vulnerability_count().await?;
        let enabled_rules = self
            .evaluator
            .rules()
            .iter()
            .filter(|rule| rule.enabled)
            .count();
        let enabled_probes = self
            .runner
            .probes()
            .iter()
            .filter(|probe| probe.enabled)
            .count();
        Ok(MonitorStatus {
            initialized: true,
            monitoring_active: self.is_active(),
            total_events,
            open_violations,
            open_vulnerabilities,
            enabled_rules,
            enabled_probes,
        })
    }
}
