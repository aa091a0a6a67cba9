//! Directory entry model - one row per person known to a practice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// Access level codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Staff,
    Admin,
    Owner,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Staff => "staff",
            AccessLevel::Admin => "admin",
            AccessLevel::Owner => "owner",
        }
    }

    /// Admins and owners may invite others and re-send their invitations.
    pub fn can_manage_invitations(&self) -> bool {
        matches!(self, AccessLevel::Admin | AccessLevel::Owner)
    }
}

impl FromStr for AccessLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "staff" => Ok(AccessLevel::Staff),
            "admin" => Ok(AccessLevel::Admin),
            "owner" => Ok(AccessLevel::Owner),
            _ => Err(format!("Invalid access level: {}", s)),
        }
    }
}

/// Invitation lifecycle codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InviteStatus {
    Pending,
    Active,
    Resent,
}

impl InviteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InviteStatus::Pending => "pending",
            InviteStatus::Active => "active",
            InviteStatus::Resent => "resent",
        }
    }

    /// Delivery can only be re-triggered before the person has onboarded.
    pub fn is_resendable(&self) -> bool {
        matches!(self, InviteStatus::Pending | InviteStatus::Resent)
    }
}

impl FromStr for InviteStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(InviteStatus::Pending),
            "active" => Ok(InviteStatus::Active),
            "resent" => Ok(InviteStatus::Resent),
            _ => Err(format!("Invalid invite status: {}", s)),
        }
    }
}

/// Opaque account id issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityUserId(String);

impl IdentityUserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityUserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Case-insensitive comparison key for an email address.
pub fn email_key(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Directory entry entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub email: String,
    pub full_name: String,
    pub access_level: AccessLevel,
    pub role_detail: Option<String>,
    pub site_id: i64,
    pub identity_user_id: Option<IdentityUserId>,
    pub invite_status: InviteStatus,
    pub invite_sent_at: Option<DateTime<Utc>>,
    pub resent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl DirectoryEntry {
    /// A freshly invited person whose provider account already exists.
    pub fn invited(
        email: String,
        full_name: String,
        access_level: AccessLevel,
        role_detail: Option<String>,
        site_id: i64,
        identity_user_id: IdentityUserId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            email,
            full_name,
            access_level,
            role_detail,
            site_id,
            identity_user_id: Some(identity_user_id),
            invite_status: InviteStatus::Pending,
            invite_sent_at: Some(now),
            resent_at: None,
            created_at: now,
        }
    }

    pub fn email_key(&self) -> String {
        email_key(&self.email)
    }

    pub fn is_active(&self) -> bool {
        self.invite_status == InviteStatus::Active
    }
}

/// Raw `directory_entries` row as stored in PostgreSQL.
#[derive(Debug, Clone, FromRow)]
pub struct DirectoryEntryRow {
    pub email: String,
    pub full_name: String,
    pub access_level: String,
    pub role_detail: Option<String>,
    pub site_id: i64,
    pub identity_user_id: Option<String>,
    pub invite_status: String,
    pub invite_sent_at: Option<DateTime<Utc>>,
    pub resent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DirectoryEntryRow> for DirectoryEntry {
    type Error = String;

    fn try_from(row: DirectoryEntryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            access_level: row.access_level.parse()?,
            invite_status: row.invite_status.parse()?,
            email: row.email,
            full_name: row.full_name,
            role_detail: row.role_detail,
            site_id: row.site_id,
            identity_user_id: row.identity_user_id.map(IdentityUserId::new),
            invite_sent_at: row.invite_sent_at,
            resent_at: row.resent_at,
            created_at: row.created_at,
        })
    }
}
