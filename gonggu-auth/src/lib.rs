pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use std::sync::Arc;

use service_core::axum::{
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    request_id::{request_id_middleware, REQUEST_ID_HEADER},
    security_headers::security_headers_middleware,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::AuthConfig;
use crate::services::{
    AuthBackend, KakaoClient, OwnerSessionIssuer, SessionVerifier, WebhookVerifier,
};

#[derive(Clone)]
pub struct AppState {
    pub config: AuthConfig,
    pub backend: Arc<dyn AuthBackend>,
    pub sessions: SessionVerifier,
    pub issuer: OwnerSessionIssuer,
    pub kakao: Arc<KakaoClient>,
    pub webhook: Arc<WebhookVerifier>,
}

impl AppState {
    pub fn new(
        config: AuthConfig,
        backend: Arc<dyn AuthBackend>,
        kakao: KakaoClient,
        webhook: WebhookVerifier,
    ) -> Self {
        Self {
            sessions: SessionVerifier::new(backend.clone()),
            issuer: OwnerSessionIssuer::new(backend.clone(), &config.session),
            kakao: Arc::new(kakao),
            webhook: Arc::new(webhook),
            backend,
            config,
        }
    }
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    let admin_pages = Router::new()
        .route("/admin/login", get(handlers::admin::login_page))
        .route("/admin", get(handlers::admin::console))
        .route("/admin/*path", get(handlers::admin::console));

    let admin_api = Router::new()
        .route(
            "/api/admin/session",
            get(handlers::admin::check_session)
                .post(handlers::admin::create_session)
                .delete(handlers::admin::delete_session),
        )
        .route(
            "/api/admin/users/:uid/role",
            service_core::axum::routing::put(handlers::admin::assign_role),
        );

    let kakao_routes = Router::new()
        .route("/api/auth/kakao", get(handlers::kakao::start))
        .route("/api/auth/kakao/callback", get(handlers::kakao::callback))
        .route(
            "/api/auth/kakao/webhook",
            get(handlers::webhook::describe).post(handlers::webhook::receive_event),
        );

    let profile_routes = Router::new()
        .route(
            "/api/profile/ensure",
            service_core::axum::routing::post(handlers::profile::ensure),
        )
        .route("/api/profile/me", get(handlers::profile::me))
        .route(
            "/api/profile/nickname/check",
            get(handlers::profile::check_nickname),
        )
        .route(
            "/api/profile/nickname",
            service_core::axum::routing::put(handlers::profile::set_nickname),
        )
        .route(
            "/api/profile/terms",
            service_core::axum::routing::post(handlers::profile::agree_terms),
        )
        .route(
            "/api/profile/organizer-application",
            service_core::axum::routing::post(handlers::profile::apply_organizer),
        );

    let allowed_origins: Vec<HeaderValue> = state
        .config
        .allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(origin) => Some(origin),
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}. Skipping.", o, e);
                None
            }
        })
        .collect();

    let app = Router::new()
        .route("/health", get(health_check))
        .merge(admin_pages)
        .merge(admin_api)
        .merge(kakao_routes)
        .merge(profile_routes)
        .layer(from_fn_with_state(state.clone(), middleware::admin_guard))
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &service_core::axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    path = %request.uri().path(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(allowed_origins)
                .allow_credentials(true)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
        );

    Ok(app)
}

/// Service health check
pub async fn health_check(
    service_core::axum::extract::State(state): service_core::axum::extract::State<AppState>,
) -> Result<service_core::axum::Json<serde_json::Value>, AppError> {
    state.backend.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Backend health check failed");
        AppError::ServiceUnavailable
    })?;

    Ok(service_core::axum::Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "backend": "up"
        }
    })))
}
