use service_core::error::AppError;
use thiserror::Error;

use super::identity::ProviderError;
use super::store::StoreError;

#[derive(Error, Debug)]
pub enum InviteError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not authorized: {0}")]
    Authorization(String),

    #[error("This person has already been invited and is active")]
    AlreadyExists,

    #[error("Not invitable: {0}")]
    NotInvitable(String),

    #[error("Identity provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Directory error: {0}")]
    Store(#[from] StoreError),
}

impl InviteError {
    /// Short label used for metrics.
    pub fn class(&self) -> &'static str {
        match self {
            InviteError::Validation(_) => "validation",
            InviteError::Authorization(_) => "authorization",
            InviteError::AlreadyExists => "already_exists",
            InviteError::NotInvitable(_) => "not_invitable",
            InviteError::Provider(_) => "provider",
            InviteError::Store(_) => "store",
        }
    }
}

impl From<InviteError> for AppError {
    fn from(err: InviteError) -> Self {
        match err {
            InviteError::Validation(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            InviteError::Authorization(msg) => AppError::Forbidden(anyhow::anyhow!(msg)),
            InviteError::AlreadyExists => AppError::BadRequest(anyhow::anyhow!(
                "This person has already been invited and is active. Use password reset instead"
            )),
            InviteError::NotInvitable(msg) => AppError::NotFound(anyhow::anyhow!(msg)),
            InviteError::Provider(e) => {
                tracing::warn!(error = %e, "Identity provider call failed");
                AppError::BadGateway(format!("identity provider {}", e.class()))
            }
            InviteError::Store(e) => AppError::DatabaseError(anyhow::Error::new(e)),
        }
    }
}
