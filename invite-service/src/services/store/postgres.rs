//! PostgreSQL directory store.
//!
//! Uniqueness is enforced by the indexes in `migrations/`; a violation
//! surfaces as `StoreError::UniqueViolation` so callers can tell a lost race
//! apart from a real failure.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;

use super::{DirectoryStore, StoreError};
use crate::models::{DirectoryEntry, DirectoryEntryRow, IdentityUserId, InviteStatus};

const SELECT_COLUMNS: &str = r#"
    SELECT email, full_name, access_level, role_detail, site_id, identity_user_id,
           invite_status, invite_sent_at, resent_at, created_at
    FROM directory_entries
"#;

/// PostgreSQL-backed directory.
#[derive(Clone)]
pub struct PostgresDirectoryStore {
    pool: PgPool,
}

impl PostgresDirectoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            StoreError::UniqueViolation
        }
        _ => StoreError::Database(err),
    }
}

fn decode(row: DirectoryEntryRow) -> Result<DirectoryEntry, StoreError> {
    DirectoryEntry::try_from(row).map_err(StoreError::Corrupt)
}

fn decode_optional(row: Option<DirectoryEntryRow>) -> Result<Option<DirectoryEntry>, StoreError> {
    row.map(decode).transpose()
}

#[async_trait]
impl DirectoryStore for PostgresDirectoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<DirectoryEntry>, StoreError> {
        let query = format!("{} WHERE lower(email) = lower($1)", SELECT_COLUMNS);
        let row = sqlx::query_as::<_, DirectoryEntryRow>(&query)
            .bind(email.trim())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        decode_optional(row)
    }

    async fn find_by_identity_user_id(
        &self,
        identity_user_id: &IdentityUserId,
    ) -> Result<Option<DirectoryEntry>, StoreError> {
        let query = format!("{} WHERE identity_user_id = $1", SELECT_COLUMNS);
        let row = sqlx::query_as::<_, DirectoryEntryRow>(&query)
            .bind(identity_user_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        decode_optional(row)
    }

    async fn insert(&self, entry: &DirectoryEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO directory_entries (
                email, full_name, access_level, role_detail, site_id, identity_user_id,
                invite_status, invite_sent_at, resent_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&entry.email)
        .bind(&entry.full_name)
        .bind(entry.access_level.as_str())
        .bind(&entry.role_detail)
        .bind(entry.site_id)
        .bind(entry.identity_user_id.as_ref().map(|id| id.as_str()))
        .bind(entry.invite_status.as_str())
        .bind(entry.invite_sent_at)
        .bind(entry.resent_at)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn mark_resent(
        &self,
        email: &str,
        at: DateTime<Utc>,
    ) -> Result<DirectoryEntry, StoreError> {
        let row = sqlx::query_as::<_, DirectoryEntryRow>(
            r#"
            UPDATE directory_entries
            SET invite_status = $2, resent_at = $3
            WHERE lower(email) = lower($1) AND invite_status IN ('pending', 'resent')
            RETURNING email, full_name, access_level, role_detail, site_id, identity_user_id,
                      invite_status, invite_sent_at, resent_at, created_at
            "#,
        )
        .bind(email.trim())
        .bind(InviteStatus::Resent.as_str())
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some(row) => decode(row),
            None if self.find_by_email(email).await?.is_some() => {
                Err(StoreError::InvalidTransition)
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn claim_identity(
        &self,
        email: &str,
        identity_user_id: &IdentityUserId,
    ) -> Result<DirectoryEntry, StoreError> {
        let row = sqlx::query_as::<_, DirectoryEntryRow>(
            r#"
            UPDATE directory_entries
            SET identity_user_id = $2
            WHERE lower(email) = lower($1) AND identity_user_id IS NULL
            RETURNING email, full_name, access_level, role_detail, site_id, identity_user_id,
                      invite_status, invite_sent_at, resent_at, created_at
            "#,
        )
        .bind(email.trim())
        .bind(identity_user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some(row) => decode(row),
            None if self.find_by_email(email).await?.is_some() => {
                Err(StoreError::IdentityAlreadySet)
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn mark_active(
        &self,
        identity_user_id: &IdentityUserId,
    ) -> Result<Option<DirectoryEntry>, StoreError> {
        let row = sqlx::query_as::<_, DirectoryEntryRow>(
            r#"
            UPDATE directory_entries
            SET invite_status = $2
            WHERE identity_user_id = $1
            RETURNING email, full_name, access_level, role_detail, site_id, identity_user_id,
                      invite_status, invite_sent_at, resent_at, created_at
            "#,
        )
        .bind(identity_user_id.as_str())
        .bind(InviteStatus::Active.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        decode_optional(row)
    }

    async fn list_by_site(&self, site_id: i64) -> Result<Vec<DirectoryEntry>, StoreError> {
        let query = format!(
            "{} WHERE site_id = $1 ORDER BY full_name, email",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, DirectoryEntryRow>(&query)
            .bind(site_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.into_iter().map(decode).collect()
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                StoreError::Database(e)
            })?;
        Ok(())
    }
}
