//! The audit event store service.
//!
//! Wraps a repository with field-level encryption, retention cleanup, and
//! summary reporting. Writes are append-only: once `log` returns, the
//! event is immutable and only retention cleanup can remove it.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use field_crypto::{EncryptedEnvelope, FieldCipher};

use crate::error::Result;
use crate::event::{AuditEvent, AuditSummary, EventFilter, NewAuditEvent};
use crate::repository::EventRepository;

/// Compliance flag attached when a sensitive field could not be encrypted.
pub const ENCRYPTION_FAILED_FLAG: &str = "encryption_failed";

const REDACTED_PLACEHOLDER: &str = "[redacted]";
const DECRYPTION_FAILED_PLACEHOLDER: &str = "[decryption failed]";

/// Detail fields encrypted by default: the contact-form members that carry
/// personal data.
pub fn default_sensitive_fields() -> HashSet<String> {
    ["email", "phone", "name", "company", "message"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

/// Append-only event store with selective field encryption.
pub struct EventStore {
    repository: Arc<dyn EventRepository>,
    cipher: Arc<dyn FieldCipher>,
    sensitive_fields: HashSet<String>,
    retention_days: i64,
}

impl EventStore {
    pub fn new(repository: Arc<dyn EventRepository>, cipher: Arc<dyn FieldCipher>) -> Self {
        Self {
            repository,
            cipher,
            sensitive_fields: default_sensitive_fields(),
            retention_days: 2555,
        }
    }

    /// Replace the sensitive-field allow-list.
    pub fn with_sensitive_fields<I>(mut self, fields: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.sensitive_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Retention horizon used by `cleanup_expired` and the retention rule.
    pub fn with_retention_days(mut self, days: i64) -> Self {
        self.retention_days = days.max(1);
        self
    }

    pub fn retention_days(&self) -> i64 {
        self.retention_days
    }

    /// Append an event, returning its assigned id.
    ///
    /// Sensitive detail fields are encrypted in place. A field the cipher
    /// cannot encrypt is stored redacted and the event gains the
    /// `encryption_failed` flag; the write itself still succeeds. Only a
    /// repository failure makes this return an error.
    pub async fn log(&self, new_event: NewAuditEvent) -> Result<Uuid> {
        let mut event = AuditEvent {
            id: Uuid::new_v4(),
            event_type: new_event.event_type,
            user_id: new_event.user_id,
            session_id: new_event.session_id,
            resource: new_event.resource,
            action: new_event.action,
            details: new_event.details,
            ip_address: new_event.ip_address,
            user_agent: new_event.user_agent,
            timestamp: Utc::now(),
            severity: new_event.severity,
            compliance_flags: new_event.compliance_flags,
        };

        let failed_fields = self.encrypt_details(&mut event.details);
        if failed_fields > 0 {
            event
                .compliance_flags
                .push(ENCRYPTION_FAILED_FLAG.to_owned());
            warn!(
                target: "audit",
                event_id = %event.id,
                failed_fields,
                "storing event with redacted fields after encryption failure"
            );
        }
        normalize_flags(&mut event.compliance_flags);

        let id = event.id;
        self.repository.insert(event).await?;
        debug!(target: "audit", event_id = %id, "audit event recorded");
        Ok(id)
    }

    /// Fetch events matching the filter, newest first, with sensitive
    /// fields decrypted.
    ///
    /// A field that fails decryption comes back as a placeholder; the rest
    /// of the record stays readable.
    pub async fn query(&self, filter: &EventFilter) -> Result<Vec<AuditEvent>> {
        let mut events = self.repository.fetch(filter).await?;
        for event in &mut events {
            self.decrypt_details(event.id, &mut event.details);
        }
        Ok(events)
    }

    /// Fetch events exactly as stored, envelopes included.
    ///
    /// The PII-at-rest probe reads through here: a plaintext pattern in a
    /// stored payload is a finding, an encrypted envelope is not.
    pub async fn query_raw(&self, filter: &EventFilter) -> Result<Vec<AuditEvent>> {
        self.repository.fetch(filter).await
    }

    /// Aggregate the window into per-group counts.
    pub async fn report(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<AuditSummary> {
        self.repository.summarize(start, end).await
    }

    /// Count events matching the filter, ignoring pagination.
    pub async fn count(&self, filter: &EventFilter) -> Result<u64> {
        self.repository.count(filter).await
    }

    /// Events already past the given retention horizon.
    pub async fn stale_event_count(&self, retention_days: i64) -> Result<u64> {
        self.repository
            .count_older_than(retention_cutoff(retention_days))
            .await
    }

    /// Delete events past the given retention horizon. Idempotent: a
    /// second consecutive run deletes nothing.
    pub async fn cleanup(&self, retention_days: i64) -> Result<u64> {
        let deleted = self
            .repository
            .delete_older_than(retention_cutoff(retention_days))
            .await?;
        if deleted > 0 {
            info!(
                target: "audit",
                deleted, retention_days, "retention cleanup removed expired events"
            );
        } else {
            debug!(target: "audit", retention_days, "retention cleanup found nothing to remove");
        }
        Ok(deleted)
    }

    /// Cleanup at the store's configured retention horizon.
    pub async fn cleanup_expired(&self) -> Result<u64> {
        self.cleanup(self.retention_days).await
    }

    /// Encrypt allow-listed top-level detail fields in place, returning
    /// how many fields failed and were redacted instead.
    fn encrypt_details(&self, details: &mut Value) -> usize {
        let Some(object) = details.as_object_mut() else {
            return 0;
        };
        let mut failures = 0;
        for field in &self.sensitive_fields {
            let Some(value) = object.get_mut(field) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            // JSON-serialize so non-string values survive the roundtrip.
            let plaintext = match serde_json::to_string(value) {
                Ok(plaintext) => plaintext,
                Err(e) => {
                    failures += 1;
                    warn!(target: "audit", field = %field, error = %e, "field serialization failed, storing redacted");
                    *value = Value::String(REDACTED_PLACEHOLDER.to_owned());
                    continue;
                }
            };
            match self.cipher.encrypt(&plaintext) {
                Ok(envelope) => {
                    *value = envelope.to_value();
                }
                Err(e) => {
                    failures += 1;
                    warn!(target: "audit", field = %field, error = %e, "field encryption failed, storing redacted");
                    *value = Value::String(REDACTED_PLACEHOLDER.to_owned());
                }
            }
        }
        failures
    }

    /// Decrypt every envelope-shaped top-level value in place. Scanning
    /// for envelopes rather than re-reading the allow-list means events
    /// written under an older list still decrypt.
    fn decrypt_details(&self, event_id: Uuid, details: &mut Value) {
        let Some(object) = details.as_object_mut() else {
            return;
        };
        for (field, value) in object.iter_mut() {
            let Some(envelope) = EncryptedEnvelope::from_value(value) else {
                continue;
            };
            match self.cipher.decrypt(&envelope) {
                Ok(plaintext) => {
                    *value = match serde_json::from_str(&plaintext) {
                        Ok(restored) => restored,
                        Err(_) => Value::String(plaintext),
                    };
                }
                Err(e) => {
                    warn!(
                        target: "audit",
                        event_id = %event_id,
                        field = %field,
                        error = %e,
                        "field decryption failed"
                    );
                    *value = Value::String(DECRYPTION_FAILED_PLACEHOLDER.to_owned());
                }
            }
        }
    }
}

fn retention_cutoff(retention_days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(retention_days.max(0))
}

fn normalize_flags(flags: &mut Vec<String>) {
    flags.sort();
    flags.dedup();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryEventRepository;
    use field_crypto::{Aes256GcmCipher, CryptoError, CryptoResult, HashedValue};
    use monitor_common::Severity;
    use serde_json::json;

    /// Cipher that refuses every operation, for degraded-write tests.
    struct FailingCipher;

    impl FieldCipher for FailingCipher {
        fn encrypt(&self, _plaintext: &str) -> CryptoResult<EncryptedEnvelope> {
            Err(CryptoError::EncryptionFailed("key service offline".into()))
        }

        fn decrypt(&self, _envelope: &EncryptedEnvelope) -> CryptoResult<String> {
            Err(CryptoError::DecryptionFailed("key service offline".into()))
        }

        fn hash(&self, _value: &str, _salt: Option<&str>) -> CryptoResult<HashedValue> {
            Err(CryptoError::EncryptionFailed("key service offline".into()))
        }

        fn algorithm(&self) -> &str {
            "failing"
        }
    }

    fn aes_store() -> EventStore {
        let cipher = Aes256GcmCipher::new(Aes256GcmCipher::generate_key()).unwrap();
        EventStore::new(
            Arc::new(InMemoryEventRepository::new()),
            Arc::new(cipher),
        )
    }

    fn contact_event() -> NewAuditEvent {
        NewAuditEvent::new("contact_submission", "contact_form", "submit")
            .with_user(Uuid::new_v4())
            .with_ip_address("203.0.113.7")
            .with_details(json!({
                "email": "visitor@example.com",
                "message": "please call me",
                "phone": 15551234,
                "page": "/contact"
            }))
    }

    #[tokio::test]
    async fn test_log_assigns_id_and_timestamp() {
        let store = aes_store();
        let before = Utc::now();
        let id = store.log(contact_event()).await.unwrap();

        let events = store.query(&EventFilter::new()).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, id);
        assert!(events[0].timestamp >= before);
        assert!(events[0].timestamp <= Utc::now());
    }

    #[tokio::test]
    async fn test_sensitive_fields_encrypted_at_rest_and_decrypted_on_read() {
        let store = aes_store();
        store.log(contact_event()).await.unwrap();

        // At rest: allow-listed fields are envelopes, others untouched.
        let raw = store.query_raw(&EventFilter::new()).await.unwrap();
        let details = &raw[0].details;
        assert!(EncryptedEnvelope::from_value(&details["email"]).is_some());
        assert!(EncryptedEnvelope::from_value(&details["message"]).is_some());
        assert!(EncryptedEnvelope::from_value(&details["phone"]).is_some());
        assert_eq!(details["page"], json!("/contact"));

        // On read: original values, including the non-string one.
        let events = store.query(&EventFilter::new()).await.unwrap();
        let details = &events[0].details;
        assert_eq!(details["email"], json!("visitor@example.com"));
        assert_eq!(details["message"], json!("please call me"));
        assert_eq!(details["phone"], json!(15551234));
    }

    #[tokio::test]
    async fn test_cipher_failure_degrades_write_but_succeeds() {
        let store = EventStore::new(
            Arc::new(InMemoryEventRepository::new()),
            Arc::new(FailingCipher),
        );

        let id = store.log(contact_event()).await.unwrap();
        assert!(!id.is_nil());

        let raw = store.query_raw(&EventFilter::new()).await.unwrap();
        assert_eq!(raw[0].details["email"], json!("[redacted]"));
        assert_eq!(raw[0].details["message"], json!("[redacted]"));
        // Non-sensitive fields are untouched.
        assert_eq!(raw[0].details["page"], json!("/contact"));
        assert!(raw[0]
            .compliance_flags
            .contains(&ENCRYPTION_FAILED_FLAG.to_string()));
    }

    #[tokio::test]
    async fn test_decryption_failure_yields_placeholder() {
        let repository = Arc::new(InMemoryEventRepository::new());
        let writer = EventStore::new(
            repository.clone(),
            Arc::new(Aes256GcmCipher::new(Aes256GcmCipher::generate_key()).unwrap()),
        );
        writer.log(contact_event()).await.unwrap();

        // A reader with the wrong key cannot recover the fields.
        let reader = EventStore::new(
            repository,
            Arc::new(Aes256GcmCipher::new(Aes256GcmCipher::generate_key()).unwrap()),
        );
        let events = reader.query(&EventFilter::new()).await.unwrap();
        assert_eq!(events[0].details["email"], json!("[decryption failed]"));
        // Unencrypted fields still read fine.
        assert_eq!(events[0].details["page"], json!("/contact"));
    }

    #[tokio::test]
    async fn test_query_returns_newest_first() {
        let store = aes_store();
        let mut ids = Vec::new();
        for n in 0..3 {
            let event = NewAuditEvent::new("page_view", format!("/page/{n}"), "view");
            ids.push(store.log(event).await.unwrap());
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let events = store.query(&EventFilter::new()).await.unwrap();
        let fetched: Vec<Uuid> = events.iter().map(|e| e.id).collect();
        let mut expected = ids.clone();
        expected.reverse();
        assert_eq!(fetched, expected);
    }

    #[tokio::test]
    async fn test_compliance_flags_deduplicated() {
        let store = aes_store();
        let event = NewAuditEvent::new("consent_update", "preferences", "update")
            .with_flag("gdpr")
            .with_flag("soc2")
            .with_flag("gdpr");
        store.log(event).await.unwrap();

        let events = store.query(&EventFilter::new()).await.unwrap();
        assert_eq!(
            events[0].compliance_flags,
            vec!["gdpr".to_string(), "soc2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent() {
        let repository = Arc::new(InMemoryEventRepository::new());
        let store = EventStore::new(
            repository.clone(),
            Arc::new(Aes256GcmCipher::new(Aes256GcmCipher::generate_key()).unwrap()),
        );

        // Two events well past a 2555-day horizon, one fresh.
        for days in [2600, 2900] {
            let event = AuditEvent {
                id: Uuid::new_v4(),
                event_type: "legacy".into(),
                user_id: None,
                session_id: None,
                resource: "archive".into(),
                action: "import".into(),
                details: json!({}),
                ip_address: None,
                user_agent: None,
                timestamp: Utc::now() - Duration::days(days),
                severity: Severity::Low,
                compliance_flags: vec![],
            };
            repository.insert(event).await.unwrap();
        }
        store.log(contact_event()).await.unwrap();

        assert_eq!(store.stale_event_count(2555).await.unwrap(), 2);
        assert_eq!(store.cleanup(2555).await.unwrap(), 2);
        assert_eq!(store.cleanup(2555).await.unwrap(), 0);
        assert_eq!(store.count(&EventFilter::new()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_non_object_details_pass_through() {
        let store = aes_store();
        let event = NewAuditEvent::new("raw_note", "system", "note")
            .with_details(json!("free-form text"));
        store.log(event).await.unwrap();

        let events = store.query(&EventFilter::new()).await.unwrap();
        assert_eq!(events[0].details, json!("free-form text"));
    }
}
