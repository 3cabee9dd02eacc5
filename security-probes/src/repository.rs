//! Persistence contracts for vulnerabilities and probe run history.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use monitor_common::ResolveOutcome;

use crate::error::Result;
use crate::result::{SecurityTestResult, SecurityVulnerability, VulnerabilityFilter};

pub mod postgres;

/// Vulnerability persistence contract.
#[async_trait]
pub trait VulnerabilityRepository: Send + Sync {
    async fn insert(&self, vulnerability: SecurityVulnerability) -> Result<()>;

    /// Fetch matching vulnerabilities, newest first, up to the filter's limit.
    async fn fetch(&self, filter: &VulnerabilityFilter) -> Result<Vec<SecurityVulnerability>>;

    async fn get(&self, id: Uuid) -> Result<Option<SecurityVulnerability>>;

    /// Unresolved vulnerabilities on record.
    async fn count_open(&self) -> Result<u64>;

    /// Apply resolution metadata only if the record is still unresolved.
    async fn resolve_if_unresolved(
        &self,
        id: Uuid,
        resolved_by: &str,
        notes: Option<&str>,
        resolved_at: DateTime<Utc>,
    ) -> Result<ResolveOutcome<SecurityVulnerability>>;
}

/// Run history persistence contract.
#[async_trait]
pub trait TestResultRepository: Send + Sync {
    async fn insert(&self, result: SecurityTestResult) -> Result<()>;

    /// Most recent executions across all runs, newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<SecurityTestResult>>;

    /// Every result belonging to the most recently started run.
    async fn latest_run(&self) -> Result<Vec<SecurityTestResult>>;
}

/// Thread-safe in-memory repositories for embedded and test use.
#[derive(Default, Clone)]
pub struct InMemoryVulnerabilityRepository {
    vulnerabilities: Arc<DashMap<Uuid, SecurityVulnerability>>,
}

impl InMemoryVulnerabilityRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VulnerabilityRepository for InMemoryVulnerabilityRepository {
    async fn insert(&self, vulnerability: SecurityVulnerability) -> Result<()> {
        self.vulnerabilities.insert(vulnerability.id, vulnerability);
        Ok(())
    }

    async fn fetch(&self, filter: &VulnerabilityFilter) -> Result<Vec<SecurityVulnerability>> {
        let mut matching: Vec<SecurityVulnerability> = self
            .vulnerabilities
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

    async fn get(&self, id: Uuid) -> Result<Option<SecurityVulnerability>> {
        Ok(self
            .vulnerabilities
            .get(&id)
            .map(|entry| entry.value().clone()))
    }

    async fn count_open(&self) -> Result<u64> {
        Ok(self
            .vulnerabilities
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
    ) -> Result<ResolveOutcome<SecurityVulnerability>> {
        let Some(mut entry) = self.vulnerabilities.get_mut(&id) else {
            return Ok(ResolveOutcome::NotFound);
        };
        if entry.resolved {
            return Ok(ResolveOutcome::AlreadyResolved(entry.clone()));
        }
        entry.resolved = true;
        entry.resolved_at = Some(resolved_at);
        entry.resolved_by = Some(resolved_by.to_owned());
        entry.resolution_notes = notes.map(str::to_owned);
        Ok(ResolveOutcome::Applied(entry.clone()))
    }
}

#[derive(Default, Clone)]
pub struct InMemoryTestResultRepository {
    results: Arc<DashMap<Uuid, SecurityTestResult>>,
}

impl InMemoryTestResultRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TestResultRepository for InMemoryTestResultRepository {
    async fn insert(&self, result: SecurityTestResult) -> Result<()> {
        self.results.insert(result.id, result);
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<SecurityTestResult>> {
        let mut all: Vec<SecurityTestResult> = self
            .results
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| {
            b.started_at
                .cmp(&a.started_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        all.truncate(limit);
        Ok(all)
    }

    async fn latest_run(&self) -> Result<Vec<SecurityTestResult>> {
        let latest = self
            .results
            .iter()
            .max_by_key(|entry| entry.started_at)
            .map(|entry| entry.run_id);
        let Some(run_id) = latest else {
            return Ok(Vec::new());
        };
        let mut run: Vec<SecurityTestResult> = self
            .results
            .iter()
            .filter(|entry| entry.run_id == run_id)
            .map(|entry| entry.value().clone())
            .collect();
        run.sort_by_key(|result| result.started_at);
        Ok(run)
    }
}
