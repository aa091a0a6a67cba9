//! In-memory directory store, used by tests and local development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{DirectoryStore, StoreError};
use crate::models::{email_key, DirectoryEntry, IdentityUserId, InviteStatus};

/// Entries keyed by lowercase email.
#[derive(Clone, Default)]
pub struct InMemoryDirectoryStore {
    entries: Arc<RwLock<HashMap<String, DirectoryEntry>>>,
}

impl InMemoryDirectoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl DirectoryStore for InMemoryDirectoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<DirectoryEntry>, StoreError> {
        Ok(self.entries.read().await.get(&email_key(email)).cloned())
    }

    async fn find_by_identity_user_id(
        &self,
        identity_user_id: &IdentityUserId,
    ) -> Result<Option<DirectoryEntry>, StoreError> {
        Ok(self
            .entries
            .read()
            .await
            .values()
            .find(|e| e.identity_user_id.as_ref() == Some(identity_user_id))
            .cloned())
    }

    async fn insert(&self, entry: &DirectoryEntry) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        let key = entry.email_key();

        let identity_taken = entry.identity_user_id.is_some()
            && entries
                .values()
                .any(|e| e.identity_user_id == entry.identity_user_id);
        if entries.contains_key(&key) || identity_taken {
            return Err(StoreError::UniqueViolation);
        }

        entries.insert(key, entry.clone());
        Ok(())
    }

    async fn mark_resent(
        &self,
        email: &str,
        at: DateTime<Utc>,
    ) -> Result<DirectoryEntry, StoreError> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(&email_key(email))
            .ok_or(StoreError::NotFound)?;

        if !entry.invite_status.is_resendable() {
            return Err(StoreError::InvalidTransition);
        }

        entry.invite_status = InviteStatus::Resent;
        entry.resent_at = Some(at);
        Ok(entry.clone())
    }

    async fn claim_identity(
        &self,
        email: &str,
        identity_user_id: &IdentityUserId,
    ) -> Result<DirectoryEntry, StoreError> {
        let mut entries = self.entries.write().await;

        let owned_elsewhere = entries.iter().any(|(key, e)| {
            key != &email_key(email) && e.identity_user_id.as_ref() == Some(identity_user_id)
        });
        if owned_elsewhere {
            return Err(StoreError::UniqueViolation);
        }

        let entry = entries
            .get_mut(&email_key(email))
            .ok_or(StoreError::NotFound)?;
        if entry.identity_user_id.is_some() {
            return Err(StoreError::IdentityAlreadySet);
        }

        entry.identity_user_id = Some(identity_user_id.clone());
        Ok(entry.clone())
    }

    async fn mark_active(
        &self,
        identity_user_id: &IdentityUserId,
    ) -> Result<Option<DirectoryEntry>, StoreError> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .values_mut()
            .find(|e| e.identity_user_id.as_ref() == Some(identity_user_id));

        Ok(entry.map(|e| {
            e.invite_status = InviteStatus::Active;
            e.clone()
        }))
    }

    async fn list_by_site(&self, site_id: i64) -> Result<Vec<DirectoryEntry>, StoreError> {
        let mut entries: Vec<DirectoryEntry> = self
            .entries
            .read()
            .await
            .values()
            .filter(|e| e.site_id == site_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.full_name.cmp(&b.full_name).then(a.email.cmp(&b.email)));
        Ok(entries)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AccessLevel;

    fn entry(email: &str, id: &str) -> DirectoryEntry {
        DirectoryEntry::invited(
            email.to_string(),
            "Test Person".to_string(),
            AccessLevel::Staff,
            None,
            7,
            IdentityUserId::new(id),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn insert_rejects_email_differing_only_in_case() {
        let store = InMemoryDirectoryStore::new();
        store.insert(&entry("sam@example.com", "id-1")).await.unwrap();

        let err = store
            .insert(&entry("SAM@Example.com", "id-2"))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::UniqueViolation));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn insert_rejects_reused_identity() {
        let store = InMemoryDirectoryStore::new();
        store.insert(&entry("a@example.com", "id-1")).await.unwrap();

        let err = store.insert(&entry("b@example.com", "id-1")).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation));
    }

    #[tokio::test]
    async fn claim_identity_is_write_once() {
        let store = InMemoryDirectoryStore::new();
        let mut legacy = entry("legacy@example.com", "unused");
        legacy.identity_user_id = None;
        store.insert(&legacy).await.unwrap();

        let claimed = store
            .claim_identity("legacy@example.com", &IdentityUserId::new("id-9"))
            .await
            .unwrap();
        assert_eq!(claimed.identity_user_id, Some(IdentityUserId::new("id-9")));

        let err = store
            .claim_identity("legacy@example.com", &IdentityUserId::new("id-10"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::IdentityAlreadySet));
    }

    #[tokio::test]
    async fn mark_resent_refuses_active_entries() {
        let store = InMemoryDirectoryStore::new();
        store.insert(&entry("a@example.com", "id-1")).await.unwrap();
        store
            .mark_active(&IdentityUserId::new("id-1"))
            .await
            .unwrap()
            .unwrap();

        let err = store
            .mark_resent("a@example.com", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition));
    }
}
