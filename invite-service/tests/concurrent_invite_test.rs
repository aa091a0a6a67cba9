mod common;

use axum::http::StatusCode;
use common::{TestApp, CALLER_SITE};
use invite_service::services::{
    DirectoryStore, InMemoryDirectoryStore, InvitationService, InviteAction, InviteRequest,
    MockIdentityProvider,
};
use invite_service::models::{AccessLevel, InviteStatus};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn request(email: &str) -> InviteRequest {
    InviteRequest {
        email: email.to_string(),
        full_name: Some("Racing Person".to_string()),
        access_level: AccessLevel::Staff,
        site_id: CALLER_SITE,
        role_detail: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_invites_create_one_account() {
    for round in 0..20 {
        let store = InMemoryDirectoryStore::new();
        let provider = MockIdentityProvider::new();
        if round % 2 == 0 {
            // Widen the window between the existence check and the create.
            provider.set_latency(Some(Duration::from_millis(5)));
        }
        let service = InvitationService::new(
            Arc::new(store.clone()),
            Arc::new(provider.clone()),
            Duration::from_secs(5),
        );
        let email = format!("race{}@example.com", round);

        let (a, b) = tokio::join!(
            service.invite(request(&email)),
            service.invite(request(&email)),
        );
        let outcomes = [a.unwrap(), b.unwrap()];

        assert_eq!(provider.account_count(), 1, "round {}", round);
        assert_eq!(store.len().await, 1, "round {}", round);

        let created = outcomes
            .iter()
            .filter(|o| o.action == InviteAction::Created)
            .count();
        let resent = outcomes
            .iter()
            .filter(|o| o.action == InviteAction::Resent)
            .count();
        assert_eq!((created, resent), (1, 1), "round {}", round);

        // The second email is always recorded on the row.
        assert_eq!(provider.emails_sent(), 2, "round {}", round);
        let stored = store.find_by_email(&email).await.unwrap().unwrap();
        assert_eq!(stored.invite_status, InviteStatus::Resent, "round {}", round);
        assert!(stored.resent_at.is_some(), "round {}", round);

        let account = provider.account_id(&email);
        assert!(outcomes
            .iter()
            .all(|o| o.entry.identity_user_id == account));
        assert_eq!(stored.identity_user_id, account);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_http_invites_create_one_account() {
    let app = TestApp::new();
    let token = app.owner().await;
    app.provider.set_latency(Some(Duration::from_millis(20)));
    let body = json!({
        "email": "same.time@example.com",
        "fullName": "Same Time",
        "accessLevel": "staff",
        "siteId": CALLER_SITE,
    });

    let requests = (0..4).map(|_| app.post("/invitations", Some(&token), body.clone()));
    let responses = futures::future::join_all(requests).await;

    for (status, body) in &responses {
        assert_eq!(*status, StatusCode::OK);
        assert_eq!(body["email"], "same.time@example.com");
    }
    assert!(app.provider.account_id("same.time@example.com").is_some());
    // owner + invitee
    assert_eq!(app.provider.account_count(), 2);
    let entry = app
        .store
        .find_by_email("same.time@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        entry.identity_user_id,
        app.provider.account_id("same.time@example.com")
    );
}
