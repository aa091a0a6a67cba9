//! Test helpers for invite-service integration tests.
//!
//! Builds the real router over an in-memory directory and the mock identity
//! provider, so no external service is needed.

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use invite_service::{
    build_router,
    config::{DatabaseConfig, Environment, IdentityProviderConfig, InviteConfig, SecurityConfig},
    models::{AccessLevel, DirectoryEntry},
    services::{DirectoryStore, InMemoryDirectoryStore, MockIdentityProvider},
    AppState,
};
use secrecy::Secret;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

pub const CALLER_SITE: i64 = 42;

pub fn test_config() -> InviteConfig {
    InviteConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "invite-service-test".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        identity_provider: IdentityProviderConfig {
            base_url: "http://identity.invalid".to_string(),
            service_key: Secret::new("test-service-key".to_string()),
            timeout_seconds: 1,
            redirect_url: None,
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: InMemoryDirectoryStore,
    pub provider: MockIdentityProvider,
}

impl TestApp {
    pub fn new() -> Self {
        let store = InMemoryDirectoryStore::new();
        let provider = MockIdentityProvider::new();
        let state = AppState::new(
            test_config(),
            Arc::new(store.clone()),
            Arc::new(provider.clone()),
            None,
        );

        Self {
            router: build_router(state.clone()),
            state,
            store,
            provider,
        }
    }

    /// Seed an onboarded caller at `CALLER_SITE` and return their bearer token.
    pub async fn caller(&self, email: &str, access_level: AccessLevel) -> String {
        let identity_user_id = self.provider.register_account(email);
        let mut entry = DirectoryEntry::invited(
            email.to_string(),
            "Caller".to_string(),
            access_level,
            None,
            CALLER_SITE,
            identity_user_id.clone(),
            Utc::now(),
        );
        entry.invite_status = invite_service::models::InviteStatus::Active;
        self.store
            .insert(&entry)
            .await
            .expect("Failed to seed caller");
        self.provider.issue_token(&identity_user_id)
    }

    pub async fn owner(&self) -> String {
        self.caller("owner@practice.example.com", AccessLevel::Owner)
            .await
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, token, Some(body)).await
    }
}
