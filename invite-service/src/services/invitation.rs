//! Invitation state machine.
//!
//! Drives a directory entry through `pending -> resent -> active` while
//! keeping at most one identity-provider account per email. The provider's
//! own uniqueness and the directory's unique email index are the only
//! synchronisation points: every conflict either of them reports is folded
//! back into the resend path instead of creating a second account.

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;
use validator::ValidateEmail;

use super::error::InviteError;
use super::identity::{IdentityProvider, InviteMetadata, ProviderError};
use super::metrics::{record_invitation, record_invitation_failure};
use super::store::{DirectoryStore, StoreError};
use crate::models::{AccessLevel, DirectoryEntry, IdentityUserId, InviteStatus};

/// A first-time (or repeated) invitation for one person.
#[derive(Debug, Clone)]
pub struct InviteRequest {
    pub email: String,
    /// Required only when no directory entry exists yet.
    pub full_name: Option<String>,
    pub access_level: AccessLevel,
    pub site_id: i64,
    pub role_detail: Option<String>,
}

/// What `invite` ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteAction {
    /// A provider account and a directory entry were created.
    Created,
    /// The provider account already existed; its invitation was re-sent.
    Resent,
}

impl InviteAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            InviteAction::Created => "created",
            InviteAction::Resent => "resent",
        }
    }
}

#[derive(Debug, Clone)]
pub struct InviteOutcome {
    pub entry: DirectoryEntry,
    pub action: InviteAction,
}

impl InviteOutcome {
    fn new(entry: DirectoryEntry, action: InviteAction) -> Self {
        Self { entry, action }
    }
}

/// Normalise and check an email address.
pub fn validate_email(email: &str) -> Result<String, InviteError> {
    let email = email.trim().to_string();
    if email.is_empty() {
        return Err(InviteError::Validation("Email is required".to_string()));
    }
    if !email.validate_email() {
        return Err(InviteError::Validation(format!(
            "Invalid email address: {}",
            email
        )));
    }
    Ok(email)
}

fn validate_full_name(full_name: Option<&str>) -> Result<String, InviteError> {
    match full_name.map(str::trim) {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => Err(InviteError::Validation(
            "Full name is required for a new invitation".to_string(),
        )),
    }
}

#[derive(Clone)]
pub struct InvitationService {
    store: Arc<dyn DirectoryStore>,
    provider: Arc<dyn IdentityProvider>,
    provider_timeout: Duration,
}

impl InvitationService {
    pub fn new(
        store: Arc<dyn DirectoryStore>,
        provider: Arc<dyn IdentityProvider>,
        provider_timeout: Duration,
    ) -> Self {
        Self {
            store,
            provider,
            provider_timeout,
        }
    }

    /// Bound a provider call by the configured timeout.
    async fn call_provider<T, F>(&self, call: F) -> Result<T, ProviderError>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        match tokio::time::timeout(self.provider_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.provider_timeout.as_millis() as u64,
                    "Identity provider call timed out"
                );
                Err(ProviderError::Timeout)
            }
        }
    }

    /// Invite a person, or re-send their invitation if one is outstanding.
    #[instrument(skip(self, request), fields(email = %request.email, site_id = request.site_id))]
    pub async fn invite(&self, request: InviteRequest) -> Result<InviteOutcome, InviteError> {
        let result = self.invite_inner(request).await;
        match &result {
            Ok(outcome) => {
                tracing::info!(
                    action = outcome.action.as_str(),
                    identity_user_id = ?outcome.entry.identity_user_id,
                    "Invitation processed"
                );
                record_invitation("invite", outcome.action.as_str());
            }
            Err(e) => record_invitation_failure("invite", e.class()),
        }
        result
    }

    async fn invite_inner(&self, request: InviteRequest) -> Result<InviteOutcome, InviteError> {
        let email = validate_email(&request.email)?;

        match self.store.find_by_email(&email).await? {
            Some(entry) => self.redirect_existing(entry).await,
            None => {
                let full_name = validate_full_name(request.full_name.as_deref())?;
                let metadata = InviteMetadata {
                    full_name,
                    access_level: request.access_level,
                    role_detail: request
                        .role_detail
                        .map(|r| r.trim().to_string())
                        .filter(|r| !r.is_empty()),
                    site_id: request.site_id,
                    needs_onboarding: true,
                };
                self.provision(&email, metadata).await
            }
        }
    }

    /// An entry exists: active ones are final, anything else gets a resend.
    async fn redirect_existing(&self, entry: DirectoryEntry) -> Result<InviteOutcome, InviteError> {
        if entry.is_active() {
            return Err(InviteError::AlreadyExists);
        }
        tracing::info!(email = %entry.email, "Entry already pending, re-sending instead");
        let entry = self.resend_entry(entry).await?;
        Ok(InviteOutcome::new(entry, InviteAction::Resent))
    }

    /// Create the provider account, then persist the entry. A failure of the
    /// first step leaves no row behind.
    async fn provision(
        &self,
        email: &str,
        metadata: InviteMetadata,
    ) -> Result<InviteOutcome, InviteError> {
        let created = self
            .call_provider(self.provider.create_invited_user(email, &metadata))
            .await;

        let identity_user_id = match created {
            Ok(id) => id,
            Err(ProviderError::AlreadyExists) => return self.reconcile(email, metadata).await,
            Err(e) => return Err(e.into()),
        };

        let entry = self.entry_for(email, &metadata, identity_user_id.clone());
        match self.store.insert(&entry).await {
            Ok(()) => Ok(InviteOutcome::new(entry, InviteAction::Created)),
            Err(StoreError::UniqueViolation) => {
                self.after_conflict(email, &identity_user_id, InviteAction::Created)
                    .await
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The provider already holds an account for this email. Either a
    /// concurrent invite got there first or an earlier run failed between
    /// account creation and the insert. The account's creation already sent
    /// one email, so whatever goes out from here is recorded as a resend.
    async fn reconcile(
        &self,
        email: &str,
        metadata: InviteMetadata,
    ) -> Result<InviteOutcome, InviteError> {
        let identity_user_id = self
            .call_provider(self.provider.lookup_user_by_email(email))
            .await?
            .ok_or(ProviderError::UserNotFound)?;

        if let Some(entry) = self.store.find_by_email(email).await? {
            return self.redirect_existing(entry).await;
        }

        tracing::info!(%identity_user_id, "Adopting existing provider account");
        self.call_provider(self.provider.resend_invite(&identity_user_id, email))
            .await?;

        let mut entry = self.entry_for(email, &metadata, identity_user_id.clone());
        entry.invite_status = InviteStatus::Resent;
        entry.resent_at = Some(Utc::now());
        match self.store.insert(&entry).await {
            Ok(()) => Ok(InviteOutcome::new(entry, InviteAction::Resent)),
            Err(StoreError::UniqueViolation) => {
                self.after_conflict(email, &identity_user_id, InviteAction::Resent)
                    .await
            }
            Err(e) => Err(e.into()),
        }
    }

    /// An insert lost a race. If the winning row points at the account this
    /// call already used, keep it: the creator reports `Created`, a resender
    /// stamps its email on the row. Otherwise re-derive.
    async fn after_conflict(
        &self,
        email: &str,
        identity_user_id: &IdentityUserId,
        action: InviteAction,
    ) -> Result<InviteOutcome, InviteError> {
        let entry = self
            .store
            .find_by_email(email)
            .await?
            .ok_or(StoreError::UniqueViolation)?;

        if entry.identity_user_id.as_ref() != Some(identity_user_id) {
            return self.redirect_existing(entry).await;
        }
        if entry.is_active() {
            return Err(InviteError::AlreadyExists);
        }

        match action {
            InviteAction::Created => Ok(InviteOutcome::new(entry, action)),
            InviteAction::Resent => {
                let updated = self.record_resend(&entry.email).await?;
                Ok(InviteOutcome::new(updated, action))
            }
        }
    }

    fn entry_for(
        &self,
        email: &str,
        metadata: &InviteMetadata,
        identity_user_id: IdentityUserId,
    ) -> DirectoryEntry {
        DirectoryEntry::invited(
            email.to_string(),
            metadata.full_name.clone(),
            metadata.access_level,
            metadata.role_detail.clone(),
            metadata.site_id,
            identity_user_id,
            Utc::now(),
        )
    }

    /// Re-send the invitation for a pending entry. Never creates an account
    /// for an entry that already has one.
    #[instrument(skip(self))]
    pub async fn resend(&self, email: &str) -> Result<DirectoryEntry, InviteError> {
        let result = self.resend_by_email(email).await;
        match &result {
            Ok(_) => record_invitation("resend", InviteAction::Resent.as_str()),
            Err(e) => record_invitation_failure("resend", e.class()),
        }
        result
    }

    async fn resend_by_email(&self, email: &str) -> Result<DirectoryEntry, InviteError> {
        let email = validate_email(email)?;
        let entry = self
            .store
            .find_by_email(&email)
            .await?
            .ok_or_else(|| InviteError::NotInvitable("No invitation found for this email".to_string()))?;
        self.resend_entry(entry).await
    }

    async fn resend_entry(&self, entry: DirectoryEntry) -> Result<DirectoryEntry, InviteError> {
        if !entry.invite_status.is_resendable() {
            return Err(InviteError::NotInvitable(
                "Invitation already accepted".to_string(),
            ));
        }

        let (identity_user_id, already_emailed) = match entry.identity_user_id.clone() {
            Some(id) => (id, false),
            None => self.claim_identity(&entry).await?,
        };

        if !already_emailed {
            self.call_provider(self.provider.resend_invite(&identity_user_id, &entry.email))
                .await?;
        }

        self.record_resend(&entry.email).await
    }

    /// Stamp a sent resend on the entry.
    async fn record_resend(&self, email: &str) -> Result<DirectoryEntry, InviteError> {
        match self.store.mark_resent(email, Utc::now()).await {
            Ok(updated) => Ok(updated),
            Err(StoreError::InvalidTransition) => Err(InviteError::NotInvitable(
                "Invitation already accepted".to_string(),
            )),
            Err(StoreError::NotFound) => Err(InviteError::NotInvitable(
                "No invitation found for this email".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Link a legacy entry (no identity recorded) to its provider account,
    /// creating the account only when the provider has none. Returns whether
    /// the onboarding email already went out as part of the creation.
    async fn claim_identity(
        &self,
        entry: &DirectoryEntry,
    ) -> Result<(IdentityUserId, bool), InviteError> {
        let found = self
            .call_provider(self.provider.lookup_user_by_email(&entry.email))
            .await?;

        let (identity_user_id, created) = match found {
            Some(id) => (id, false),
            None => {
                let metadata = InviteMetadata {
                    full_name: entry.full_name.clone(),
                    access_level: entry.access_level,
                    role_detail: entry.role_detail.clone(),
                    site_id: entry.site_id,
                    needs_onboarding: true,
                };
                match self
                    .call_provider(self.provider.create_invited_user(&entry.email, &metadata))
                    .await
                {
                    Ok(id) => (id, true),
                    Err(ProviderError::AlreadyExists) => {
                        let id = self
                            .call_provider(self.provider.lookup_user_by_email(&entry.email))
                            .await?
                            .ok_or(ProviderError::UserNotFound)?;
                        (id, false)
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };

        match self
            .store
            .claim_identity(&entry.email, &identity_user_id)
            .await
        {
            Ok(_) => {
                tracing::info!(%identity_user_id, "Linked legacy entry to provider account");
                Ok((identity_user_id, created))
            }
            Err(StoreError::IdentityAlreadySet) => {
                let current = self
                    .store
                    .find_by_email(&entry.email)
                    .await?
                    .and_then(|e| e.identity_user_id)
                    .ok_or(StoreError::NotFound)?;
                let created = created && current == identity_user_id;
                Ok((current, created))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Send a password-reset email to someone who has already onboarded.
    #[instrument(skip(self))]
    pub async fn force_password_reset(&self, email: &str) -> Result<DirectoryEntry, InviteError> {
        let email = validate_email(email)?;
        let entry = self
            .store
            .find_by_email(&email)
            .await?
            .ok_or_else(|| InviteError::NotInvitable("No directory entry for this email".to_string()))?;

        let identity_user_id = match (&entry.identity_user_id, entry.is_active()) {
            (Some(id), true) => id.clone(),
            _ => {
                return Err(InviteError::NotInvitable(
                    "Invitation not yet accepted, resend it instead".to_string(),
                ))
            }
        };

        match self
            .call_provider(self.provider.send_password_reset(&identity_user_id, &entry.email))
            .await
        {
            Ok(()) => {
                record_invitation("password_reset", "sent");
                Ok(entry)
            }
            Err(e) => {
                record_invitation_failure("password_reset", "provider");
                Err(e.into())
            }
        }
    }

    /// Mark the entry owning `identity_user_id` active once its owner has set
    /// a password.
    #[instrument(skip(self))]
    pub async fn confirm_activation(
        &self,
        identity_user_id: &IdentityUserId,
    ) -> Result<DirectoryEntry, InviteError> {
        let entry = self
            .store
            .mark_active(identity_user_id)
            .await?
            .ok_or_else(|| InviteError::NotInvitable("No entry for this account".to_string()))?;
        record_invitation("activation", "active");
        Ok(entry)
    }

    pub async fn list_site(&self, site_id: i64) -> Result<Vec<DirectoryEntry>, InviteError> {
        Ok(self.store.list_by_site(site_id).await?)
    }

    /// Resolve the caller's entry and require admin or owner access.
    pub async fn authorize_admin(
        &self,
        identity_user_id: &IdentityUserId,
    ) -> Result<DirectoryEntry, InviteError> {
        let entry = self
            .store
            .find_by_identity_user_id(identity_user_id)
            .await?
            .ok_or_else(|| {
                InviteError::Authorization("Caller has no directory entry".to_string())
            })?;

        if !entry.access_level.can_manage_invitations() {
            return Err(InviteError::Authorization(
                "Admin or owner access required".to_string(),
            ));
        }
        Ok(entry)
    }
}
