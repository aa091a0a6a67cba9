//! Admin invitation handlers.
//!
//! Every route here except `accept_invitation` sits behind
//! `admin_auth_middleware`, so the caller is already known to be an admin or
//! owner.

use axum::{extract::State, Json};
use service_core::error::AppError;

use crate::dtos::{DirectoryEntryResponse, EmailRequest, InvitationResponse, InviteRequestDto};
use crate::middleware::{AdminUser, AuthenticatedCaller};
use crate::models::AccessLevel;
use crate::services::InviteRequest;
use crate::utils::ValidatedJson;
use crate::AppState;

/// Invite a person, or re-send their pending invitation.
///
/// POST /invitations
#[tracing::instrument(skip_all, fields(caller = %caller.email))]
pub async fn create_invitation(
    State(state): State<AppState>,
    AdminUser(caller): AdminUser,
    ValidatedJson(req): ValidatedJson<InviteRequestDto>,
) -> Result<Json<InvitationResponse>, AppError> {
    let request = InviteRequest {
        email: req.email.unwrap_or_default(),
        full_name: req.full_name,
        access_level: req.access_level.unwrap_or(AccessLevel::Staff),
        site_id: req.site_id.unwrap_or(caller.site_id),
        role_detail: req.role_detail,
    };

    let outcome = state.invitations.invite(request).await?;
    Ok(Json(InvitationResponse::from(&outcome.entry)))
}

/// Re-send a pending invitation.
///
/// POST /invitations/resend
#[tracing::instrument(skip_all, fields(caller = %caller.email))]
pub async fn resend_invitation(
    State(state): State<AppState>,
    AdminUser(caller): AdminUser,
    ValidatedJson(req): ValidatedJson<EmailRequest>,
) -> Result<Json<InvitationResponse>, AppError> {
    let entry = state
        .invitations
        .resend(&req.email.unwrap_or_default())
        .await?;
    Ok(Json(InvitationResponse::from(&entry)))
}

/// Send a password-reset email to an active user.
///
/// POST /invitations/password-reset
#[tracing::instrument(skip_all, fields(caller = %caller.email))]
pub async fn force_password_reset(
    State(state): State<AppState>,
    AdminUser(caller): AdminUser,
    ValidatedJson(req): ValidatedJson<EmailRequest>,
) -> Result<Json<InvitationResponse>, AppError> {
    let entry = state
        .invitations
        .force_password_reset(&req.email.unwrap_or_default())
        .await?;
    Ok(Json(InvitationResponse::from(&entry)))
}

/// Directory rows for the caller's site.
///
/// GET /invitations
#[tracing::instrument(skip_all, fields(caller = %caller.email, site_id = caller.site_id))]
pub async fn list_invitations(
    State(state): State<AppState>,
    AdminUser(caller): AdminUser,
) -> Result<Json<Vec<DirectoryEntryResponse>>, AppError> {
    let entries = state.invitations.list_site(caller.site_id).await?;
    Ok(Json(entries.into_iter().map(Into::into).collect()))
}

/// Mark the caller's own invitation accepted once they have set a password.
///
/// POST /invitations/accept
#[tracing::instrument(skip_all, fields(identity_user_id = %caller.id))]
pub async fn accept_invitation(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
) -> Result<Json<InvitationResponse>, AppError> {
    let entry = state.invitations.confirm_activation(&caller.id).await?;
    Ok(Json(InvitationResponse::from(&entry)))
}
