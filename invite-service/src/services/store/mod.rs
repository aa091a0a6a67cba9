//! User directory storage.
//!
//! The directory table is the only durable state the provisioning workflow
//! owns. Both implementations enforce the same constraints: one entry per
//! email (case-insensitive), one entry per identity-provider account, and a
//! write-once `identity_user_id`.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{DirectoryEntry, IdentityUserId};

pub use memory::InMemoryDirectoryStore;
pub use postgres::PostgresDirectoryStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("An entry with this email or identity already exists")]
    UniqueViolation,

    #[error("Entry already linked to an identity provider account")]
    IdentityAlreadySet,

    #[error("Entry not found")]
    NotFound,

    #[error("Entry is not in a state that allows this change")]
    InvalidTransition,

    #[error("Corrupt directory row: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<DirectoryEntry>, StoreError>;

    async fn find_by_identity_user_id(
        &self,
        identity_user_id: &IdentityUserId,
    ) -> Result<Option<DirectoryEntry>, StoreError>;

    /// Insert a new entry. Fails with `UniqueViolation` when the email (or
    /// identity) is already present.
    async fn insert(&self, entry: &DirectoryEntry) -> Result<(), StoreError>;

    /// Stamp `resent_at` and move the entry to `resent`. Entries that are no
    /// longer pending or resent fail with `InvalidTransition`.
    async fn mark_resent(
        &self,
        email: &str,
        at: DateTime<Utc>,
    ) -> Result<DirectoryEntry, StoreError>;

    /// Link an entry to its provider account. Only succeeds while the entry
    /// has no identity yet.
    async fn claim_identity(
        &self,
        email: &str,
        identity_user_id: &IdentityUserId,
    ) -> Result<DirectoryEntry, StoreError>;

    /// Move the entry owning `identity_user_id` to `active`.
    async fn mark_active(
        &self,
        identity_user_id: &IdentityUserId,
    ) -> Result<Option<DirectoryEntry>, StoreError>;

    async fn list_by_site(&self, site_id: i64) -> Result<Vec<DirectoryEntry>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}
