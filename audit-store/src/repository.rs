//! Event persistence.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use monitor_common::Severity;
use uuid::Uuid;

use crate::error::AuditStoreError;
use crate::event::{AuditEvent, AuditSummary, EventFilter, EventGroup};

pub mod postgres;

/// Storage interface for the append-only audit trail.
///
/// Implementations never update rows: insert, read, and bulk-delete by age
/// are the only operations.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Append one event.
    async fn insert(&self, event: AuditEvent) -> Result<(), AuditStoreError>;

    /// Fetch events matching the filter, newest first, honoring the
    /// filter's limit and offset.
    async fn fetch(&self, filter: &EventFilter) -> Result<Vec<AuditEvent>, AuditStoreError>;

    /// Count events matching the filter, ignoring limit and offset.
    async fn count(&self, filter: &EventFilter) -> Result<u64, AuditStoreError>;

    /// Count events strictly older than the cutoff.
    async fn count_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, AuditStoreError>;

    /// Delete events strictly older than the cutoff, returning how many
    /// were removed.
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, AuditStoreError>;

    /// Aggregate the window into per-group counts.
    async fn summarize(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<AuditSummary, AuditStoreError>;
}

/// In-memory event repository for tests and embedded use.
pub struct InMemoryEventRepository {
    events: Arc<DashMap<Uuid, AuditEvent>>,
}

impl InMemoryEventRepository {
    pub fn new() -> Self {
        Self {
            events: Arc::new(DashMap::new()),
        }
    }
}

impl Default for InMemoryEventRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn insert(&self, event: AuditEvent) -> Result<(), AuditStoreError> {
        self.events.insert(event.id, event);
        Ok(())
    }

    async fn fetch(&self, filter: &EventFilter) -> Result<Vec<AuditEvent>, AuditStoreError> {
        let mut events: Vec<AuditEvent> = self
            .events
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();

        // Newest first; id breaks timestamp ties deterministically.
        events.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.id.cmp(&a.id))
        });

        let offset = usize::try_from(filter.offset).unwrap_or(0);
        let limit = usize::try_from(filter.limit).unwrap_or(0);
        Ok(events.into_iter().skip(offset).take(limit).collect())
    }

    async fn count(&self, filter: &EventFilter) -> Result<u64, AuditStoreError> {
        let count = self
            .events
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .count();
        Ok(count as u64)
    }

    async fn count_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, AuditStoreError> {
        let count = self
            .events
            .iter()
            .filter(|entry| entry.value().timestamp < cutoff)
            .count();
        Ok(count as u64)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, AuditStoreError> {
        let before = self.events.len();
        self.events.retain(|_, event| event.timestamp >= cutoff);
        Ok((before - self.events.len()) as u64)
    }

    async fn summarize(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<AuditSummary, AuditStoreError> {
        struct Bucket {
            count: u64,
            users: HashSet<Uuid>,
            first: DateTime<Utc>,
            last: DateTime<Utc>,
        }

        let mut buckets: HashMap<(String, String, Severity, Vec<String>), Bucket> = HashMap::new();
        let mut all_users: HashSet<Uuid> = HashSet::new();
        let mut total: u64 = 0;

        for entry in self.events.iter() {
            let event = entry.value();
            if event.timestamp < start || event.timestamp > end {
                continue;
            }
            total += 1;
            if let Some(user_id) = event.user_id {
                all_users.insert(user_id);
            }
            let key = (
                event.event_type.clone(),
                event.action.clone(),
                event.severity,
                event.compliance_flags.clone(),
            );
            let bucket = buckets.entry(key).or_insert(Bucket {
                count: 0,
                users: HashSet::new(),
                first: event.timestamp,
                last: event.timestamp,
            });
            bucket.count += 1;
            if let Some(user_id) = event.user_id {
                bucket.users.insert(user_id);
            }
            bucket.first = bucket.first.min(event.timestamp);
            bucket.last = bucket.last.max(event.timestamp);
        }

        let mut groups: Vec<EventGroup> = buckets
            .into_iter()
            .map(|((event_type, action, severity, flags), bucket)| EventGroup {
                event_type,
                action,
                severity,
                compliance_flags: flags,
                count: bucket.count,
                distinct_users: bucket.users.len() as u64,
                first_occurrence: bucket.first,
                last_occurrence: bucket.last,
            })
            .collect();
        groups.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.event_type.cmp(&b.event_type))
        });

        Ok(AuditSummary {
            period_start: start,
            period_end: end,
            total_events: total,
            distinct_users: all_users.len() as u64,
            groups,
        })
    }
}
