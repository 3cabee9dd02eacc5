//! Probe execution, scheduling, and the vulnerability lifecycle.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Local, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use audit_store::{EventStore, NewAuditEvent};
use escalation::{EscalationSink, Finding};
use monitor_common::{delay_until_next_midnight, ResolveOutcome, Severity, Ticker};

use crate::checks;
use crate::error::{ProbeError, Result};
use crate::probe::{default_probes, ProbeCadence, SecurityProbe};
use crate::repository::{TestResultRepository, VulnerabilityRepository};
use crate::result::{
    ProbeRunSummary, SecurityTestResult, SecurityVulnerability, TestStatus, VulnerabilityFilter,
};
use crate::surface::TargetSurface;

const DEFAULT_PROBE_TIMEOUT: StdDuration = StdDuration::from_secs(30);
const DAILY_PERIOD: StdDuration = StdDuration::from_secs(24 * 60 * 60);

/// Runs the probe registry against a target surface.
///
/// One run executes at a time: the continuous and daily tickers and
/// manual run calls share a try-lock, and an overlapping attempt returns
/// [`ProbeError::RunInProgress`] instead of queueing. Probes execute in
/// registration order; input checks rely on running before the burst
/// check exhausts the surface's rate window.
pub struct ProbeRunner {
    probes: RwLock<Vec<SecurityProbe>>,
    surface: Arc<dyn TargetSurface>,
    store: Arc<EventStore>,
    vulnerabilities: Arc<dyn VulnerabilityRepository>,
    results: Arc<dyn TestResultRepository>,
    sink: Arc<EscalationSink>,
    probe_timeout: StdDuration,
    run_guard: tokio::sync::Mutex<()>,
    continuous_ticker: Mutex<Option<Ticker>>,
    daily_ticker: Mutex<Option<Ticker>>,
    ticker_busy: Arc<AtomicBool>,
}

impl ProbeRunner {
    /// Runner preloaded with the built-in probe catalogue.
    pub fn new(
        surface: Arc<dyn TargetSurface>,
        store: Arc<EventStore>,
        vulnerabilities: Arc<dyn VulnerabilityRepository>,
        results: Arc<dyn TestResultRepository>,
        sink: Arc<EscalationSink>,
    ) -> Self {
        Self {
            probes: RwLock::new(default_probes()),
            surface,
            store,
            vulnerabilities,
            results,
            sink,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            run_guard: tokio::sync::Mutex::new(()),
            continuous_ticker: Mutex::new(None),
            daily_ticker: Mutex::new(None),
            ticker_busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Per-probe execution deadline. A probe past it reports an error
    /// result; the run continues.
    pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Add a probe, replacing any existing probe with the same id.
    pub fn register_probe(&self, probe: SecurityProbe) {
        let mut registry = self.probes.write();
        if let Some(existing) = registry.iter_mut().find(|p| p.id == probe.id) {
            *existing = probe;
        } else {
            registry.push(probe);
        }
    }

    /// Enable or disable a probe. Returns false for an unknown id.
    pub fn set_probe_enabled(&self, probe_id: &str, enabled: bool) -> bool {
        match self.probes.write().iter_mut().find(|p| p.id == probe_id) {
            Some(probe) => {
                probe.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Snapshot of the registry in registration order.
    pub fn probes(&self) -> Vec<SecurityProbe> {
        self.probes.read().clone()
    }

    /// Run every enabled probe once.
    pub async fn run_all_tests(&self) -> Result<Vec<SecurityTestResult>> {
        self.run_filtered(None).await
    }

    /// Run the enabled probes of one cadence.
    pub async fn run_cadence(&self, cadence: ProbeCadence) -> Result<Vec<SecurityTestResult>> {
        self.run_filtered(Some(cadence)).await
    }

    async fn run_filtered(
        &self,
        cadence: Option<ProbeCadence>,
    ) -> Result<Vec<SecurityTestResult>> {
        let Ok(_guard) = self.run_guard.try_lock() else {
            return Err(ProbeError::RunInProgress);
        };

        let probes: Vec<SecurityProbe> = {
            let registry = self.probes.read();
            registry
                .iter()
                .filter(|probe| probe.enabled && cadence.map_or(true, |c| probe.cadence == c))
                .cloned()
                .collect()
        };

        let run_id = Uuid::new_v4();
        let mut results = Vec::new();
        let mut findings = Vec::new();
        for probe in &probes {
            let result = self.run_probe(run_id, probe).await;
            for vulnerability in &result.vulnerabilities {
                findings.push(
                    Finding::probe_vulnerability(
                        vulnerability.id,
                        probe.id.clone(),
                        probe.category.as_str(),
                        vulnerability.severity,
                        vulnerability.description.clone(),
                    )
                    .with_detected_at(vulnerability.detected_at),
                );
            }
            if let Err(e) = self.results.insert(result.clone()).await {
                warn!(
                    target: "security",
                    probe_id = %probe.id,
                    error = %e,
                    "failed to persist test result"
                );
            }
            results.push(result);
        }

        if !findings.is_empty() {
            self.sink.handle(&findings).await;
        }
        debug!(
            target: "security",
            run_id = %run_id,
            probes = results.len(),
            vulnerabilities = findings.len(),
            "probe run complete"
        );
        Ok(results)
    }

    /// Execute one probe under the deadline. Failures become an error
    /// result rather than failing the run.
    async fn run_probe(&self, run_id: Uuid, probe: &SecurityProbe) -> SecurityTestResult {
        let started_at = Utc::now();
        let clock = std::time::Instant::now();
        let outcome = tokio::time::timeout(
            self.probe_timeout,
            checks::execute(probe.kind, self.surface.as_ref(), &self.store),
        )
        .await;

        let (status, vulnerabilities, error) = match outcome {
            Err(_) => {
                warn!(
                    target: "security",
                    probe_id = %probe.id,
                    timeout = ?self.probe_timeout,
                    "probe timed out"
                );
                (
                    TestStatus::Error,
                    Vec::new(),
                    Some(format!("timed out after {:?}", self.probe_timeout)),
                )
            }
            Ok(Err(e)) => {
                warn!(target: "security", probe_id = %probe.id, error = %e, "probe failed");
                (TestStatus::Error, Vec::new(), Some(e.to_string()))
            }
            Ok(Ok(drafts)) => {
                let mut vulnerabilities = Vec::new();
                for draft in drafts {
                    let vulnerability = SecurityVulnerability {
                        id: Uuid::new_v4(),
                        probe_id: probe.id.clone(),
                        category: probe.category,
                        severity: probe.severity,
                        description: draft.description,
                        evidence: draft.evidence,
                        detected_at: Utc::now(),
                        resolved: false,
                        resolved_at: None,
                        resolved_by: None,
                        resolution_notes: None,
                    };
                    if let Err(e) = self.vulnerabilities.insert(vulnerability.clone()).await {
                        warn!(
                            target: "security",
                            probe_id = %probe.id,
                            error = %e,
                            "failed to persist vulnerability"
                        );
                    }
                    info!(
                        target: "security",
                        probe_id = %probe.id,
                        vulnerability_id = %vulnerability.id,
                        severity = %vulnerability.severity,
                        "security vulnerability detected"
                    );
                    vulnerabilities.push(vulnerability);
                }
                (TestStatus::from_findings(&vulnerabilities), vulnerabilities, None)
            }
        };

        let completed_at = Utc::now();
        SecurityTestResult {
            id: Uuid::new_v4(),
            run_id,
            probe_id: probe.id.clone(),
            probe_name: probe.name.clone(),
            category: probe.category,
            status,
            started_at,
            completed_at,
            duration_ms: i64::try_from(clock.elapsed().as_millis()).unwrap_or(i64::MAX),
            vulnerabilities,
            error,
        }
    }

    /// Aggregate view of the most recent run, if any run has completed.
    pub async fn latest_run_summary(&self) -> Result<Option<ProbeRunSummary>> {
        let results = self.results.latest_run().await?;
        Ok(ProbeRunSummary::from_results(&results))
    }

    /// Most recent probe executions across runs, newest first.
    pub async fn test_history(&self, limit: usize) -> Result<Vec<SecurityTestResult>> {
        self.results.recent(limit).await
    }

    /// List stored vulnerabilities, newest first.
    pub async fn vulnerabilities(
        &self,
        filter: &VulnerabilityFilter,
    ) -> Result<Vec<SecurityVulnerability>> {
        self.vulnerabilities.fetch(filter).await
    }

    pub async fn open_vulnerability_count(&self) -> Result<u64> {
        self.vulnerabilities.count_open().await
    }

    /// Resolve a vulnerability. Resolution is one-way and first-writer-
    /// wins: resolving an already-resolved vulnerability returns the
    /// stored record unchanged, with the original resolver's metadata.
    pub async fn resolve_vulnerability(
        &self,
        id: Uuid,
        resolved_by: &str,
        notes: Option<&str>,
    ) -> Result<SecurityVulnerability> {
        match self
            .vulnerabilities
            .resolve_if_unresolved(id, resolved_by, notes, Utc::now())
            .await?
        {
            ResolveOutcome::Applied(vulnerability) => {
                let event = NewAuditEvent::new(
                    "vulnerability_resolved",
                    vulnerability.id.to_string(),
                    "resolve",
                )
                .with_severity(Severity::Low)
                .with_details(json!({
                    "probe_id": vulnerability.probe_id,
                    "resolved_by": resolved_by,
                    "notes": notes,
                }));
                if let Err(e) = self.store.log(event).await {
                    warn!(
                        target: "security",
                        vulnerability_id = %id,
                        error = %e,
                        "failed to record resolution in the audit trail"
                    );
                }
                info!(
                    target: "security",
                    vulnerability_id = %id,
                    resolved_by,
                    "vulnerability resolved"
                );
                Ok(vulnerability)
            }
            ResolveOutcome::AlreadyResolved(vulnerability) => Ok(vulnerability),
            ResolveOutcome::NotFound => Err(ProbeError::VulnerabilityNotFound(id)),
        }
    }

    /// Start both probe schedules, replacing any running ones: continuous
    /// probes every `continuous_interval`, daily probes at local midnight.
    pub fn start_automation(self: Arc<Self>, continuous_interval: StdDuration) {
        {
            let mut slot = self.continuous_ticker.lock();
            if let Some(previous) = slot.take() {
                previous.stop();
            }
            let runner = Arc::clone(&self);
            *slot = Some(Ticker::spawn(
                "continuous-probes",
                continuous_interval,
                Arc::clone(&self.ticker_busy),
                move || {
                    let runner = Arc::clone(&runner);
                    async move { runner.scheduled_run(ProbeCadence::Continuous).await }
                },
            ));
        }

        let mut slot = self.daily_ticker.lock();
        if let Some(previous) = slot.take() {
            previous.stop();
        }
        let runner = Arc::clone(&self);
        *slot = Some(Ticker::spawn_after(
            "daily-probes",
            delay_until_next_midnight(Local::now()),
            DAILY_PERIOD,
            Arc::clone(&self.ticker_busy),
            move || {
                let runner = Arc::clone(&runner);
                async move { runner.scheduled_run(ProbeCadence::Daily).await }
            },
        ));
    }

    async fn scheduled_run(&self, cadence: ProbeCadence) {
        match self.run_cadence(cadence).await {
            Ok(results) => {
                let detected: usize = results.iter().map(|r| r.vulnerabilities.len()).sum();
                if detected > 0 {
                    info!(
                        target: "security",
                        cadence = ?cadence,
                        probes = results.len(),
                        vulnerabilities = detected,
                        "scheduled probe run raised vulnerabilities"
                    );
                }
            }
            Err(ProbeError::RunInProgress) => {
                debug!(
                    target: "security",
                    cadence = ?cadence,
                    "scheduled probe run skipped, a run is still in progress"
                );
            }
            Err(e) => {
                warn!(target: "security", cadence = ?cadence, error = %e, "scheduled probe run failed");
            }
        }
    }

    /// Cancel both schedules. An in-flight run completes.
    pub fn stop_automation(&self) {
        if let Some(ticker) = self.continuous_ticker.lock().take() {
            ticker.stop();
        }
        if let Some(ticker) = self.daily_ticker.lock().take() {
            ticker.stop();
        }
    }

    pub fn is_automated(&self) -> bool {
        let continuous = self
            .continuous_ticker
            .lock()
            .as_ref()
            .is_some_and(|ticker| !ticker.is_finished());
        let daily = self
            .daily_ticker
            .lock()
            .as_ref()
            .is_some_and(|ticker| !ticker.is_finished());
        continuous || daily
    }
}
