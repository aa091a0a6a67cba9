mod common;

use axum::http::{Method, StatusCode};
use common::{TestApp, CALLER_SITE};
use invite_service::models::{AccessLevel, InviteStatus};
use invite_service::services::{DirectoryStore, ProviderError};
use serde_json::json;
use std::time::Duration;

fn invite_body(email: &str) -> serde_json::Value {
    json!({
        "email": email,
        "fullName": "New Person",
        "accessLevel": "staff",
        "siteId": CALLER_SITE,
    })
}

#[tokio::test]
async fn owner_invites_new_person() {
    let app = TestApp::new();
    let token = app.owner().await;

    let (status, body) = app
        .post("/invitations", Some(&token), invite_body("new.person@example.com"))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"email": "new.person@example.com", "inviteStatus": "pending"})
    );

    let entry = app
        .store
        .find_by_email("new.person@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.invite_status, InviteStatus::Pending);
    assert_eq!(
        entry.identity_user_id,
        app.provider.account_id("new.person@example.com")
    );
    assert!(entry.identity_user_id.is_some());
    assert_eq!(app.provider.create_calls(), 1);
}

#[tokio::test]
async fn repeated_invite_redirects_to_resend() {
    let app = TestApp::new();
    let token = app.owner().await;
    // owner account + invitee
    let accounts_before = app.provider.account_count() + 1;

    app.post("/invitations", Some(&token), invite_body("new.person@example.com"))
        .await;
    let (status, body) = app
        .post("/invitations", Some(&token), invite_body("new.person@example.com"))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["inviteStatus"], "resent");
    assert_eq!(app.provider.account_count(), accounts_before);
    assert_eq!(app.provider.create_calls(), 1);
    assert_eq!(app.provider.resend_calls().len(), 1);
}

#[tokio::test]
async fn staff_caller_is_forbidden_without_side_effects() {
    let app = TestApp::new();
    let token = app
        .caller("staff@practice.example.com", AccessLevel::Staff)
        .await;
    let rows_before = app.store.len().await;

    let (status, _) = app
        .post("/invitations", Some(&token), invite_body("new.person@example.com"))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .post(
            "/invitations/resend",
            Some(&token),
            json!({"email": "new.person@example.com"}),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    assert_eq!(app.provider.create_calls(), 0);
    assert!(app.provider.resend_calls().is_empty());
    assert_eq!(app.store.len().await, rows_before);
}

#[tokio::test]
async fn staff_caller_is_forbidden_even_with_invalid_payload() {
    let app = TestApp::new();
    let token = app
        .caller("staff@practice.example.com", AccessLevel::Staff)
        .await;

    let (status, _) = app
        .post("/invitations", Some(&token), json!({"email": "not-an-email"}))
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn caller_without_directory_entry_is_forbidden() {
    let app = TestApp::new();
    let stranger = app.provider.register_account("stranger@example.com");
    let token = app.provider.issue_token(&stranger);

    let (status, _) = app
        .post("/invitations", Some(&token), invite_body("x@example.com"))
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn missing_or_invalid_token_is_unauthorized() {
    let app = TestApp::new();

    let (status, _) = app
        .post("/invitations", None, invite_body("x@example.com"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post("/invitations", Some("forged-token"), invite_body("x@example.com"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post(
            "/invitations/resend",
            None,
            json!({"email": "x@example.com"}),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn resend_for_unknown_email_is_not_found() {
    let app = TestApp::new();
    let token = app.owner().await;

    let (status, body) = app
        .post(
            "/invitations/resend",
            Some(&token),
            json!({"email": "ghost@example.com"}),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
    assert!(app.provider.resend_calls().is_empty());
}

#[tokio::test]
async fn resend_uses_original_identity() {
    let app = TestApp::new();
    let token = app.owner().await;
    app.post("/invitations", Some(&token), invite_body("pending@example.com"))
        .await;
    let identity = app.provider.account_id("pending@example.com").unwrap();

    let (status, body) = app
        .post(
            "/invitations/resend",
            Some(&token),
            json!({"email": "Pending@Example.com"}),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"email": "pending@example.com", "inviteStatus": "resent"})
    );
    assert_eq!(app.provider.create_calls(), 1);
    assert_eq!(
        app.provider.resend_calls(),
        vec![(identity, "pending@example.com".to_string())]
    );
}

#[tokio::test]
async fn resend_for_active_entry_is_not_found() {
    let app = TestApp::new();
    let token = app.owner().await;

    let (status, _) = app
        .post(
            "/invitations/resend",
            Some(&token),
            json!({"email": "owner@practice.example.com"}),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invite_for_active_entry_is_bad_request() {
    let app = TestApp::new();
    let token = app.owner().await;

    let (status, body) = app
        .post(
            "/invitations",
            Some(&token),
            invite_body("owner@practice.example.com"),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("already been invited"));
}

#[tokio::test]
async fn missing_email_is_bad_request() {
    let app = TestApp::new();
    let token = app.owner().await;

    let (status, _) = app
        .post("/invitations", Some(&token), json!({"fullName": "No Email"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post("/invitations/resend", Some(&token), json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_full_name_on_first_invite_is_bad_request() {
    let app = TestApp::new();
    let token = app.owner().await;

    let (status, _) = app
        .post(
            "/invitations",
            Some(&token),
            json!({"email": "nameless@example.com"}),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.provider.create_calls(), 0);
}

#[tokio::test]
async fn malformed_email_and_body_are_bad_request() {
    let app = TestApp::new();
    let token = app.owner().await;

    let (status, body) = app
        .post("/invitations", Some(&token), invite_body("not-an-email"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Validation error");

    let (status, _) = app
        .post(
            "/invitations",
            Some(&token),
            json!({"email": "a@example.com", "fullName": "A", "accessLevel": "superuser"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn site_and_access_level_default_from_caller() {
    let app = TestApp::new();
    let token = app.owner().await;

    let (status, _) = app
        .post(
            "/invitations",
            Some(&token),
            json!({"email": "defaults@example.com", "fullName": "Default Person"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let entry = app
        .store
        .find_by_email("defaults@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.site_id, CALLER_SITE);
    assert_eq!(entry.access_level, AccessLevel::Staff);
}

#[tokio::test]
async fn provider_timeout_writes_nothing_and_retry_succeeds() {
    let app = TestApp::new();
    let token = app.owner().await;
    app.provider.set_latency(Some(Duration::from_secs(3)));

    let (status, body) = app
        .post("/invitations", Some(&token), invite_body("flaky@example.com"))
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(!body["error"].as_str().unwrap().contains("3"));
    assert!(app
        .store
        .find_by_email("flaky@example.com")
        .await
        .unwrap()
        .is_none());

    app.provider.set_latency(None);
    let (status, body) = app
        .post("/invitations", Some(&token), invite_body("flaky@example.com"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["inviteStatus"], "pending");
    assert!(app.provider.account_id("flaky@example.com").is_some());
}

#[tokio::test]
async fn provider_network_failure_is_bad_gateway_without_row() {
    let app = TestApp::new();
    let token = app.owner().await;
    app.provider
        .fail_creates_with(Some(ProviderError::Network("connection refused".into())));

    let (status, body) = app
        .post("/invitations", Some(&token), invite_body("down@example.com"))
        .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(!body["error"]
        .as_str()
        .unwrap()
        .contains("connection refused"));
    assert!(app
        .store
        .find_by_email("down@example.com")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn password_reset_is_distinct_from_resend() {
    let app = TestApp::new();
    let token = app.owner().await;
    app.caller("active.staff@practice.example.com", AccessLevel::Staff)
        .await;
    app.post("/invitations", Some(&token), invite_body("pending@example.com"))
        .await;

    let (status, body) = app
        .post(
            "/invitations/password-reset",
            Some(&token),
            json!({"email": "active.staff@practice.example.com"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["inviteStatus"], "active");

    let (status, _) = app
        .post(
            "/invitations/password-reset",
            Some(&token),
            json!({"email": "pending@example.com"}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(app.provider.resend_calls().is_empty());
}

#[tokio::test]
async fn list_returns_only_callers_site() {
    let app = TestApp::new();
    let token = app.owner().await;
    app.post("/invitations", Some(&token), invite_body("here@example.com"))
        .await;
    app.post(
        "/invitations",
        Some(&token),
        json!({"email": "elsewhere@example.com", "fullName": "Far Away", "siteId": 7}),
    )
    .await;

    let (status, body) = app
        .request(Method::GET, "/invitations", Some(&token), None)
        .await;

    assert_eq!(status, StatusCode::OK);
    let emails: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["email"].as_str().unwrap())
        .collect();
    assert!(emails.contains(&"here@example.com"));
    assert!(emails.contains(&"owner@practice.example.com"));
    assert!(!emails.contains(&"elsewhere@example.com"));
    assert!(body[0].get("identityUserId").is_none());
}

#[tokio::test]
async fn health_reports_store_status() {
    let app = TestApp::new();

    let (status, body) = app.request(Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["database"], "up");
    assert_eq!(body["checks"]["identity_provider"], "up");
}

#[tokio::test]
async fn health_is_degraded_when_provider_is_down() {
    let app = TestApp::new();
    app.provider
        .fail_health_with(Some(ProviderError::Network("connection refused".into())));

    let (status, body) = app.request(Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["checks"]["database"], "up");
    assert_eq!(body["checks"]["identity_provider"], "down");
}

#[tokio::test]
async fn invitee_accepts_their_own_invitation() {
    let app = TestApp::new();
    let token = app.owner().await;
    app.post("/invitations", Some(&token), invite_body("joiner@example.com"))
        .await;
    let identity = app.provider.account_id("joiner@example.com").unwrap();
    let invitee_token = app.provider.issue_token(&identity);

    let (status, body) = app
        .request(Method::POST, "/invitations/accept", Some(&invitee_token), None)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"email": "joiner@example.com", "inviteStatus": "active"})
    );

    let (status, _) = app
        .post(
            "/invitations/resend",
            Some(&token),
            json!({"email": "joiner@example.com"}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn accept_requires_a_known_account() {
    let app = TestApp::new();

    let (status, _) = app
        .request(Method::POST, "/invitations/accept", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let stranger = app.provider.register_account("stranger@example.com");
    let token = app.provider.issue_token(&stranger);
    let (status, _) = app
        .request(Method::POST, "/invitations/accept", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
