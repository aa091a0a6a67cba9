pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use metrics_exporter_prometheus::PrometheusHandle;
use service_core::axum::{
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use service_core::middleware::{
    metrics::metrics_middleware, security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::InviteConfig;
use crate::services::{DirectoryStore, IdentityProvider, InvitationService};

#[derive(Clone)]
pub struct AppState {
    pub config: InviteConfig,
    pub invitations: InvitationService,
    pub provider: Arc<dyn IdentityProvider>,
    pub store: Arc<dyn DirectoryStore>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        config: InviteConfig,
        store: Arc<dyn DirectoryStore>,
        provider: Arc<dyn IdentityProvider>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        let invitations = InvitationService::new(
            store.clone(),
            provider.clone(),
            config.identity_provider.timeout(),
        );

        Self {
            config,
            invitations,
            provider,
            store,
            metrics,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route(
            "/invitations",
            post(handlers::create_invitation).get(handlers::list_invitations),
        )
        .route("/invitations/resend", post(handlers::resend_invitation))
        .route(
            "/invitations/password-reset",
            post(handlers::force_password_reset),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::admin_auth_middleware,
        ));

    let origins: Vec<HeaderValue> = state
        .config
        .security
        .allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}. Skipping.", o, e);
                None
            }
        })
        .collect();

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
        .route("/invitations/accept", post(handlers::accept_invitation))
        .merge(admin_routes)
        // Route templates are only known once a route matched.
        .route_layer(from_fn(metrics_middleware))
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &service_core::axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
        )
}
