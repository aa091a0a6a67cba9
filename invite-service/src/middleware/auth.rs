use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::models::DirectoryEntry;
use crate::services::{AuthenticatedUser, InviteError, ProviderError};
use crate::AppState;

/// Resolve the request's bearer token to a provider account.
async fn authenticate_bearer(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<AuthenticatedUser, AppError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            AppError::Unauthorized(anyhow::anyhow!("Missing or invalid Authorization header"))
        })?;

    match state.provider.authenticate(token).await {
        Ok(user) => Ok(user),
        Err(ProviderError::Unauthorized | ProviderError::UserNotFound) => Err(
            AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token")),
        ),
        Err(e) => Err(InviteError::Provider(e).into()),
    }
}

/// Require a bearer token belonging to an admin or owner.
///
/// The token is resolved by the identity provider; the caller's access level
/// comes from their own directory entry, which is stored on the request for
/// the `AdminUser` extractor.
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = authenticate_bearer(&state, req.headers()).await?;

    let caller = state
        .invitations
        .authorize_admin(&user.id)
        .await
        .map_err(|e| {
            tracing::warn!(identity_user_id = %user.id, error = %e, "Admin access denied");
            AppError::from(e)
        })?;

    req.extensions_mut().insert(caller);

    Ok(next.run(req).await)
}

/// Any signed-in account, admin or not.
pub struct AuthenticatedCaller(pub AuthenticatedUser);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthenticatedCaller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = authenticate_bearer(state, &parts.headers).await?;
        Ok(AuthenticatedCaller(user))
    }
}

/// The authenticated admin's directory entry.
pub struct AdminUser(pub DirectoryEntry);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let caller = parts.extensions.get::<DirectoryEntry>().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Caller missing from request extensions"
            ))
        })?;

        Ok(AdminUser(caller.clone()))
    }
}
