//! Append-only audit event store with selective field encryption.
//!
//! Everything the monitor observes lands here as an [`AuditEvent`]:
//! marketing-site actions, authentication outcomes, data exports, and the
//! monitor's own findings. Events are immutable once written; the only
//! deletion path is retention cleanup. A configured allow-list of detail
//! fields is encrypted before storage and transparently decrypted on read.

pub mod error;
pub mod event;
pub mod repository;
pub mod store;

pub use error::AuditStoreError;
pub use event::{AuditEvent, AuditSummary, EventFilter, EventGroup, NewAuditEvent};
pub use repository::postgres::PostgresEventRepository;
pub use repository::{EventRepository, InMemoryEventRepository};
pub use store::{default_sensitive_fields, EventStore, ENCRYPTION_FAILED_FLAG};
