//! Supabase (GoTrue) admin API adapter.
//!
//! Every call authenticates with the service credential from
//! `IdentityProviderConfig`; nothing is read from ambient process state.

use async_trait::async_trait;
use reqwest::{header::HeaderMap, Client, Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use service_core::observability::inject_trace_context;
use std::time::Duration;
use tracing::instrument;

use super::{AuthenticatedUser, IdentityProvider, InviteMetadata, ProviderError};
use crate::config::IdentityProviderConfig;
use crate::models::{email_key, IdentityUserId};

/// Page size used when scanning the user list for an email.
const USERS_PER_PAGE: usize = 1000;

/// Upper bound on pages scanned by `lookup_user_by_email`.
const MAX_USER_PAGES: u32 = 100;

/// GoTrue user object (only the fields this service reads).
#[derive(Debug, Deserialize)]
struct GoTrueUser {
    id: String,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserPage {
    #[serde(default)]
    users: Vec<GoTrueUser>,
}

/// GoTrue error body. Different endpoints use different field names.
#[derive(Debug, Default, Deserialize)]
struct GoTrueError {
    error_code: Option<String>,
    msg: Option<String>,
    message: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl GoTrueError {
    fn text(&self) -> String {
        self.msg
            .clone()
            .or_else(|| self.message.clone())
            .or_else(|| self.error_description.clone())
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| "unknown error".to_string())
    }
}

#[derive(Serialize)]
struct InviteBody<'a> {
    email: &'a str,
    data: &'a InviteMetadata,
}

#[derive(Serialize)]
struct RecoverBody<'a> {
    email: &'a str,
}

/// Client for the hosted auth service's admin endpoints.
#[derive(Clone)]
pub struct SupabaseAuthClient {
    client: Client,
    base_url: String,
    service_key: Secret<String>,
    redirect_url: Option<String>,
}

impl SupabaseAuthClient {
    pub fn new(config: &IdentityProviderConfig) -> Result<Self, anyhow::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        tracing::info!(base_url = %config.base_url, "Identity provider client configured");

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            service_key: config.service_key.clone(),
            redirect_url: config.redirect_url.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/auth/v1{}", self.base_url, path)
    }

    fn trace_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        inject_trace_context(&mut headers);
        headers
    }

    /// Request authenticated with the service credential.
    fn admin_request(&self, method: Method, path: &str) -> RequestBuilder {
        let key = self.service_key.expose_secret();
        self.client
            .request(method, self.url(path))
            .headers(Self::trace_headers())
            .header("apikey", key.as_str())
            .bearer_auth(key)
    }

    fn with_redirect(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.redirect_url {
            Some(url) => request.query(&[("redirect_to", url.as_str())]),
            None => request,
        }
    }

    async fn send(request: RequestBuilder) -> Result<Response, ProviderError> {
        let response = request.send().await.map_err(map_transport_error)?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let err = map_status_error(status, &body);
        tracing::warn!(status = %status, error = %err, "Identity provider request failed");
        Err(err)
    }

    async fn json<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T, ProviderError> {
        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::Api {
                status: 200,
                message: format!("Unexpected response body: {}", e),
            })
    }

    async fn get_user(&self, identity_user_id: &IdentityUserId) -> Result<GoTrueUser, ProviderError> {
        let path = format!("/admin/users/{}", identity_user_id);
        let response = Self::send(self.admin_request(Method::GET, &path)).await?;
        Self::json(response).await
    }

    /// Send a recovery (set-password) email to the account, after checking
    /// that `identity_user_id` really is the account registered for `email`.
    async fn send_recovery(
        &self,
        identity_user_id: &IdentityUserId,
        email: &str,
    ) -> Result<(), ProviderError> {
        let user = self.get_user(identity_user_id).await?;
        let matches = user
            .email
            .as_deref()
            .map(|e| email_key(e) == email_key(email))
            .unwrap_or(false);
        if !matches {
            return Err(ProviderError::Api {
                status: StatusCode::CONFLICT.as_u16(),
                message: "Account email does not match the directory entry".to_string(),
            });
        }

        let request = self
            .with_redirect(self.admin_request(Method::POST, "/recover"))
            .json(&RecoverBody { email });
        Self::send(request).await?;
        Ok(())
    }
}

fn map_transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Network(err.to_string())
    }
}

fn map_status_error(status: StatusCode, body: &str) -> ProviderError {
    let parsed: GoTrueError = serde_json::from_str(body).unwrap_or_default();
    let text = parsed.text();
    let lowered = text.to_lowercase();

    let already_exists = parsed.error_code.as_deref() == Some("email_exists")
        || parsed.error_code.as_deref() == Some("user_already_exists")
        || lowered.contains("already been registered")
        || lowered.contains("already registered")
        || lowered.contains("already exists");

    match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Unauthorized,
        StatusCode::NOT_FOUND => ProviderError::UserNotFound,
        StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY
            if already_exists =>
        {
            ProviderError::AlreadyExists
        }
        _ if lowered.contains("rate limit") => ProviderError::RateLimited,
        _ => ProviderError::Api {
            status: status.as_u16(),
            message: text,
        },
    }
}

#[async_trait]
impl IdentityProvider for SupabaseAuthClient {
    #[instrument(skip(self, metadata), fields(email = %email))]
    async fn create_invited_user(
        &self,
        email: &str,
        metadata: &InviteMetadata,
    ) -> Result<IdentityUserId, ProviderError> {
        let request = self
            .with_redirect(self.admin_request(Method::POST, "/invite"))
            .json(&InviteBody {
                email,
                data: metadata,
            });

        let user: GoTrueUser = Self::json(Self::send(request).await?).await?;
        tracing::info!(identity_user_id = %user.id, "Invited account created");
        Ok(IdentityUserId::new(user.id))
    }

    #[instrument(skip(self), fields(identity_user_id = %identity_user_id))]
    async fn resend_invite(
        &self,
        identity_user_id: &IdentityUserId,
        email: &str,
    ) -> Result<(), ProviderError> {
        self.send_recovery(identity_user_id, email).await?;
        tracing::info!("Invitation email re-sent");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn lookup_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<IdentityUserId>, ProviderError> {
        let wanted = email_key(email);

        for page in 1..=MAX_USER_PAGES {
            let request = self.admin_request(Method::GET, "/admin/users").query(&[
                ("page", page.to_string()),
                ("per_page", USERS_PER_PAGE.to_string()),
            ]);
            let users: UserPage = Self::json(Self::send(request).await?).await?;
            let count = users.users.len();

            if let Some(user) = users
                .users
                .into_iter()
                .find(|u| u.email.as_deref().map(email_key).as_deref() == Some(wanted.as_str()))
            {
                return Ok(Some(IdentityUserId::new(user.id)));
            }

            if count < USERS_PER_PAGE {
                return Ok(None);
            }
        }

        tracing::warn!(pages = MAX_USER_PAGES, "User scan stopped at page limit");
        Ok(None)
    }

    #[instrument(skip_all)]
    async fn authenticate(&self, access_token: &str) -> Result<AuthenticatedUser, ProviderError> {
        let request = self
            .client
            .get(self.url("/user"))
            .headers(Self::trace_headers())
            .header("apikey", self.service_key.expose_secret().as_str())
            .bearer_auth(access_token);

        let user: GoTrueUser = Self::json(Self::send(request).await?).await?;
        Ok(AuthenticatedUser {
            id: IdentityUserId::new(user.id),
            email: user.email,
        })
    }

    #[instrument(skip(self), fields(identity_user_id = %identity_user_id))]
    async fn send_password_reset(
        &self,
        identity_user_id: &IdentityUserId,
        email: &str,
    ) -> Result<(), ProviderError> {
        self.send_recovery(identity_user_id, email).await?;
        tracing::info!("Password reset email sent");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Self::send(self.admin_request(Method::GET, "/health")).await?;
        Ok(())
    }
}
