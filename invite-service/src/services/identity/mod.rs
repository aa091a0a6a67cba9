//! Identity provider abstraction.
//!
//! The hosted auth service owns accounts and passwords; this module is the
//! only place that talks to it. `SupabaseAuthClient` is the production
//! adapter and `MockIdentityProvider` the in-memory double used in tests.

pub mod mock;
pub mod supabase;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::models::{AccessLevel, IdentityUserId};

pub use mock::MockIdentityProvider;
pub use supabase::SupabaseAuthClient;

/// Error type for identity provider calls.
///
/// Variants are passed through to the invitation state machine unchanged;
/// `AlreadyExists` in particular drives its reconcile path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Identity provider timed out")]
    Timeout,

    #[error("An account already exists for this email")]
    AlreadyExists,

    #[error("Rate limited")]
    RateLimited,

    #[error("Credential rejected")]
    Unauthorized,

    #[error("Account not found")]
    UserNotFound,

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
}

impl ProviderError {
    /// Short label used for metrics and client-facing messages.
    pub fn class(&self) -> &'static str {
        match self {
            ProviderError::Network(_) => "network",
            ProviderError::Timeout => "timeout",
            ProviderError::AlreadyExists => "already_exists",
            ProviderError::RateLimited => "rate_limited",
            ProviderError::Unauthorized => "unauthorized",
            ProviderError::UserNotFound => "user_not_found",
            ProviderError::Api { .. } => "api",
        }
    }
}

/// Profile data attached to a newly invited account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InviteMetadata {
    pub full_name: String,
    pub access_level: AccessLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_detail: Option<String>,
    pub site_id: i64,
    pub needs_onboarding: bool,
}

/// The account behind a bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: IdentityUserId,
    pub email: Option<String>,
}

/// Operations the provisioning workflow needs from the identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create an account and send its onboarding email.
    async fn create_invited_user(
        &self,
        email: &str,
        metadata: &InviteMetadata,
    ) -> Result<IdentityUserId, ProviderError>;

    /// Re-send the password-setup email for an existing account. Never
    /// creates an account.
    async fn resend_invite(
        &self,
        identity_user_id: &IdentityUserId,
        email: &str,
    ) -> Result<(), ProviderError>;

    /// Find the account registered for `email`, compared case-insensitively.
    async fn lookup_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<IdentityUserId>, ProviderError>;

    /// Resolve a caller's bearer token to their account.
    async fn authenticate(&self, access_token: &str) -> Result<AuthenticatedUser, ProviderError>;

    /// Send a password-reset email to an already onboarded account.
    async fn send_password_reset(
        &self,
        identity_user_id: &IdentityUserId,
        email: &str,
    ) -> Result<(), ProviderError>;

    async fn health_check(&self) -> Result<(), ProviderError>;
}
