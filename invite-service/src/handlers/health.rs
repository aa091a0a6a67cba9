use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::AppState;

/// GET /health
///
/// The directory store decides liveness; an unreachable identity provider
/// only degrades the report.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let database = match state.store.health_check().await {
        Ok(()) => "up",
        Err(e) => {
            tracing::error!(error = %e, "Directory store health check failed");
            "down"
        }
    };

    let identity_provider = match tokio::time::timeout(
        state.config.identity_provider.timeout(),
        state.provider.health_check(),
    )
    .await
    {
        Ok(Ok(())) => "up",
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Identity provider health check failed");
            "down"
        }
        Err(_) => {
            tracing::warn!("Identity provider health check timed out");
            "down"
        }
    };

    let (status, label) = match (database, identity_provider) {
        ("up", "up") => (StatusCode::OK, "healthy"),
        ("up", _) => (StatusCode::OK, "degraded"),
        _ => (StatusCode::SERVICE_UNAVAILABLE, "unhealthy"),
    };

    (
        status,
        Json(json!({
            "status": label,
            "service": state.config.service_name,
            "version": env!("CARGO_PKG_VERSION"),
            "checks": {
                "database": database,
                "identity_provider": identity_provider,
            },
        })),
    )
}

/// GET /metrics
pub async fn metrics(State(state): State<AppState>) -> String {
    state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default()
}
