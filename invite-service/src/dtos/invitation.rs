use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{AccessLevel, DirectoryEntry, InviteStatus};

/// Body of `POST /invitations`.
///
/// Presence of `email` (and of `fullName` for first-time invites) is checked
/// by the invitation service so that both surface as the same 400.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct InviteRequestDto {
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,

    #[validate(length(max = 200, message = "Full name is too long"))]
    pub full_name: Option<String>,

    /// Defaults to `staff`.
    pub access_level: Option<AccessLevel>,

    /// Defaults to the caller's own site.
    pub site_id: Option<i64>,

    #[validate(length(max = 100, message = "Role detail is too long"))]
    pub role_detail: Option<String>,
}

/// Body of the single-email operations (resend, password reset).
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EmailRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationResponse {
    pub email: String,
    pub invite_status: InviteStatus,
}

impl From<&DirectoryEntry> for InvitationResponse {
    fn from(entry: &DirectoryEntry) -> Self {
        Self {
            email: entry.email.clone(),
            invite_status: entry.invite_status,
        }
    }
}

/// One row of the admin status table.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntryResponse {
    pub email: String,
    pub full_name: String,
    pub access_level: AccessLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_detail: Option<String>,
    pub invite_status: InviteStatus,
    pub invite_sent_at: Option<DateTime<Utc>>,
    pub resent_at: Option<DateTime<Utc>>,
}

impl From<DirectoryEntry> for DirectoryEntryResponse {
    fn from(entry: DirectoryEntry) -> Self {
        Self {
            email: entry.email,
            full_name: entry.full_name,
            access_level: entry.access_level,
            role_detail: entry.role_detail,
            invite_status: entry.invite_status,
            invite_sent_at: entry.invite_sent_at,
            resent_at: entry.resent_at,
        }
    }
}
