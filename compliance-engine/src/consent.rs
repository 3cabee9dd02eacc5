//! Consent registry contract.
//!
//! Consent is owned by the auth collaborator; the engine only asks one
//! question of it: does this user currently have valid consent on record.
//! The in-memory implementation exists for wiring and tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

/// Consumed contract of the consent system.
#[async_trait]
pub trait ConsentRegistry: Send + Sync {
    async fn grant(&self, user_id: Uuid) -> anyhow::Result<()>;
    async fn withdraw(&self, user_id: Uuid) -> anyhow::Result<()>;
    async fn has_valid_consent(&self, user_id: Uuid) -> anyhow::Result<bool>;
}

#[derive(Debug, Clone)]
struct ConsentRecord {
    granted_at: DateTime<Utc>,
    withdrawn_at: Option<DateTime<Utc>>,
}

/// In-memory consent registry.
#[derive(Default)]
pub struct InMemoryConsentRegistry {
    records: Arc<DashMap<Uuid, ConsentRecord>>,
}

impl InMemoryConsentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// When the user's current consent was granted, if any.
    pub fn granted_at(&self, user_id: Uuid) -> Option<DateTime<Utc>> {
        self.records.get(&user_id).map(|record| record.granted_at)
    }
}

#[async_trait]
impl ConsentRegistry for InMemoryConsentRegistry {
    async fn grant(&self, user_id: Uuid) -> anyhow::Result<()> {
        self.records.insert(
            user_id,
            ConsentRecord {
                granted_at: Utc::now(),
                withdrawn_at: None,
            },
        );
        Ok(())
    }

    async fn withdraw(&self, user_id: Uuid) -> anyhow::Result<()> {
        if let Some(mut record) = self.records.get_mut(&user_id) {
            record.withdrawn_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn has_valid_consent(&self, user_id: Uuid) -> anyhow::Result<bool> {
        Ok(self
            .records
            .get(&user_id)
            .map(|record| record.withdrawn_at.is_none())
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_consent_lifecycle() {
        let registry = InMemoryConsentRegistry::new();
        let user = Uuid::new_v4();

        assert!(!registry.has_valid_consent(user).await.unwrap());

        registry.grant(user).await.unwrap();
        assert!(registry.has_valid_consent(user).await.unwrap());
        assert!(registry.granted_at(user).is_some());

        registry.withdraw(user).await.unwrap();
        assert!(!registry.has_valid_consent(user).await.unwrap());

        // Re-granting after withdrawal restores validity.
        registry.grant(user).await.unwrap();
        assert!(registry.has_valid_consent(user).await.unwrap());
    }

    #[tokio::test]
    async fn test_withdraw_without_grant_is_a_no_op() {
        let registry = InMemoryConsentRegistry::new();
        registry.withdraw(Uuid::new_v4()).await.unwrap();
        assert!(!registry.has_valid_consent(Uuid::new_v4()).await.unwrap());
    }
}
