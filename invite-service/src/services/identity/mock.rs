//! In-memory identity provider for tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

use super::{AuthenticatedUser, IdentityProvider, InviteMetadata, ProviderError};
use crate::models::{email_key, IdentityUserId};

/// A call observed by the mock, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    CreateInvitedUser { email: String },
    ResendInvite { identity_user_id: IdentityUserId, email: String },
    LookupUserByEmail { email: String },
    Authenticate,
    SendPasswordReset { identity_user_id: IdentityUserId, email: String },
}

#[derive(Debug, Clone)]
struct Account {
    id: IdentityUserId,
    email: String,
    metadata: Option<InviteMetadata>,
}

#[derive(Default)]
struct MockState {
    accounts: HashMap<String, Account>,
    tokens: HashMap<String, IdentityUserId>,
    calls: Vec<ProviderCall>,
    create_failure: Option<ProviderError>,
    resend_failure: Option<ProviderError>,
    health_failure: Option<ProviderError>,
    latency: Option<Duration>,
    emails_sent: usize,
}

/// Mock identity provider that enforces one account per email, like the
/// real service, and records every call.
#[derive(Clone, Default)]
pub struct MockIdentityProvider {
    state: Arc<Mutex<MockState>>,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the recorded calls from the others.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed an account that exists only on the provider side.
    pub fn register_account(&self, email: &str) -> IdentityUserId {
        let id = IdentityUserId::new(Uuid::new_v4().to_string());
        self.state().accounts.insert(
            email_key(email),
            Account {
                id: id.clone(),
                email: email.to_string(),
                metadata: None,
            },
        );
        id
    }

    /// Issue a bearer token that authenticates as `identity_user_id`.
    pub fn issue_token(&self, identity_user_id: &IdentityUserId) -> String {
        let token = format!("token-{}", Uuid::new_v4());
        self.state()
            .tokens
            .insert(token.clone(), identity_user_id.clone());
        token
    }

    /// Make every `create_invited_user` call fail with `error` (or succeed again with `None`).
    pub fn fail_creates_with(&self, error: Option<ProviderError>) {
        self.state().create_failure = error;
    }

    /// Make every `resend_invite` call fail with `error` (or succeed again with `None`).
    pub fn fail_resends_with(&self, error: Option<ProviderError>) {
        self.state().resend_failure = error;
    }

    pub fn fail_health_with(&self, error: Option<ProviderError>) {
        self.state().health_failure = error;
    }

    /// Delay account creation, e.g. to trip a caller-side timeout.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state().latency = latency;
    }

    pub fn account_count(&self) -> usize {
        self.state().accounts.len()
    }

    pub fn account_id(&self, email: &str) -> Option<IdentityUserId> {
        self.state().accounts.get(&email_key(email)).map(|a| a.id.clone())
    }

    pub fn account_metadata(&self, email: &str) -> Option<InviteMetadata> {
        self.state()
            .accounts
            .get(&email_key(email))
            .and_then(|a| a.metadata.clone())
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.state().calls.clone()
    }

    pub fn create_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, ProviderCall::CreateInvitedUser { .. }))
            .count()
    }

    pub fn resend_calls(&self) -> Vec<(IdentityUserId, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ProviderCall::ResendInvite {
                    identity_user_id,
                    email,
                } => Some((identity_user_id, email)),
                _ => None,
            })
            .collect()
    }

    /// Onboarding, resend and reset emails delivered so far.
    pub fn emails_sent(&self) -> usize {
        self.state().emails_sent
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn create_invited_user(
        &self,
        email: &str,
        metadata: &InviteMetadata,
    ) -> Result<IdentityUserId, ProviderError> {
        let latency = {
            let mut state = self.state();
            state.calls.push(ProviderCall::CreateInvitedUser {
                email: email.to_string(),
            });
            state.latency
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state();
        if let Some(err) = state.create_failure.clone() {
            return Err(err);
        }

        let key = email_key(email);
        if state.accounts.contains_key(&key) {
            return Err(ProviderError::AlreadyExists);
        }

        let id = IdentityUserId::new(Uuid::new_v4().to_string());
        state.accounts.insert(
            key,
            Account {
                id: id.clone(),
                email: email.to_string(),
                metadata: Some(metadata.clone()),
            },
        );
        state.emails_sent += 1;
        Ok(id)
    }

    async fn resend_invite(
        &self,
        identity_user_id: &IdentityUserId,
        email: &str,
    ) -> Result<(), ProviderError> {
        let mut state = self.state();
        state.calls.push(ProviderCall::ResendInvite {
            identity_user_id: identity_user_id.clone(),
            email: email.to_string(),
        });

        if let Some(err) = state.resend_failure.clone() {
            return Err(err);
        }

        let known = state
            .accounts
            .values()
            .any(|a| &a.id == identity_user_id && email_key(&a.email) == email_key(email));
        if !known {
            return Err(ProviderError::UserNotFound);
        }

        state.emails_sent += 1;
        Ok(())
    }

    async fn lookup_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<IdentityUserId>, ProviderError> {
        let mut state = self.state();
        state.calls.push(ProviderCall::LookupUserByEmail {
            email: email.to_string(),
        });
        Ok(state.accounts.get(&email_key(email)).map(|a| a.id.clone()))
    }

    async fn authenticate(&self, access_token: &str) -> Result<AuthenticatedUser, ProviderError> {
        let mut state = self.state();
        state.calls.push(ProviderCall::Authenticate);

        let id = state
            .tokens
            .get(access_token)
            .cloned()
            .ok_or(ProviderError::Unauthorized)?;
        let email = state
            .accounts
            .values()
            .find(|a| a.id == id)
            .map(|a| a.email.clone());

        Ok(AuthenticatedUser { id, email })
    }

    async fn send_password_reset(
        &self,
        identity_user_id: &IdentityUserId,
        email: &str,
    ) -> Result<(), ProviderError> {
        let mut state = self.state();
        state.calls.push(ProviderCall::SendPasswordReset {
            identity_user_id: identity_user_id.clone(),
            email: email.to_string(),
        });

        if !state.accounts.values().any(|a| &a.id == identity_user_id) {
            return Err(ProviderError::UserNotFound);
        }

        state.emails_sent += 1;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        match self.state().health_failure.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
