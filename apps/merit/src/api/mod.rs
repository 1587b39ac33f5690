//! # Merit HTTP API Module
//!
//! REST surface over the achievement workflow, built on axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET|POST /achievements` - List visible / create Draft
//! - `GET|PUT|DELETE /achievements/{id}` - Fetch / edit / delete
//! - `POST /achievements/{id}/submit|verify|reject` - Status transitions
//! - `POST /achievements/{id}/attachments` - Append attachment metadata
//! - `GET /achievements/{id}/history` - Status timeline
//! - `GET /reports/statistics` - Aggregates over the visible set
//! - `GET /reports/student/{id}` - One student's report
//! - `GET /admin/consistency` - Cross-store reconciliation report
//!
//! ## Security Configuration
//!
//! - `MERIT_CORS_ORIGINS`: Comma-separated allowed origins, or "*" (default: localhost only)
//! - `MERIT_RATE_LIMIT`: Requests per second (default: 100, 0 to disable)
//! - `MERIT_API_KEY`: If set, requires Bearer token authentication

pub mod auth;
pub mod handlers;
pub mod middleware;
pub mod types;

pub use auth::Caller;
pub use types::{ApiError, ApiResponse, ErrorResponse, HealthResponse, RejectRequest};

use crate::config::SecurityConfig;
use crate::service::AchievementService;
use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use merit_core::MeritError;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Request bodies are small JSON documents; details are capped well below.
const MAX_BODY_BYTES: usize = 256 * 1024;

// =============================================================================
// SERVER STATE
// =============================================================================

#[derive(Clone, Debug)]
pub struct AppState {
    pub service: AchievementService,
}

impl AppState {
    #[must_use]
    pub fn new(service: AchievementService) -> Self {
        Self { service }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

fn allowed_headers() -> [HeaderName; 5] {
    [
        header::CONTENT_TYPE,
        header::AUTHORIZATION,
        HeaderName::from_static(auth::USER_ID_HEADER),
        HeaderName::from_static(auth::USER_ROLE_HEADER),
        HeaderName::from_static(auth::USER_PERMISSIONS_HEADER),
    ]
}

fn restricted_cors(origins: Vec<HeaderValue>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(allowed_headers())
}

fn localhost_origins() -> Vec<HeaderValue> {
    [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .into_iter()
    .map(HeaderValue::from_static)
    .collect()
}

/// CORS from `cors_origins`: `*` is permissive, a list is parsed leniently,
/// and anything else falls back to localhost.
fn build_cors_layer(origins: Option<&str>) -> CorsLayer {
    match origins.map(str::trim) {
        Some("*") => {
            tracing::warn!("CORS: allowing ALL origins; do not use this in production");
            CorsLayer::permissive()
        }
        Some(list) => {
            let parsed: Vec<HeaderValue> = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .filter_map(|s| match s.parse::<HeaderValue>() {
                    Ok(value) => {
                        tracing::info!(origin = s, "CORS: allowing origin");
                        Some(value)
                    }
                    Err(e) => {
                        tracing::warn!(origin = s, error = %e, "CORS: invalid origin");
                        None
                    }
                })
                .collect();
            if parsed.is_empty() {
                tracing::warn!("CORS: no valid origins configured, defaulting to localhost only");
                restricted_cors(localhost_origins())
            } else {
                restricted_cors(parsed)
            }
        }
        None => restricted_cors(localhost_origins()),
    }
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Build the router with all endpoints and middleware.
///
/// Middleware stack (outer to inner): tracing, CORS, body limit, rate
/// limiting, service key.
pub fn create_router(state: AppState, security: &SecurityConfig) -> Router {
    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route(
            "/achievements",
            get(handlers::list_handler).post(handlers::create_handler),
        )
        .route(
            "/achievements/{id}",
            get(handlers::get_handler)
                .put(handlers::edit_handler)
                .delete(handlers::delete_handler),
        )
        .route("/achievements/{id}/submit", post(handlers::submit_handler))
        .route("/achievements/{id}/verify", post(handlers::verify_handler))
        .route("/achievements/{id}/reject", post(handlers::reject_handler))
        .route(
            "/achievements/{id}/attachments",
            post(handlers::attachment_handler),
        )
        .route("/achievements/{id}/history", get(handlers::history_handler))
        .route("/reports/statistics", get(handlers::statistics_handler))
        .route(
            "/reports/student/{id}",
            get(handlers::student_report_handler),
        )
        .route("/admin/consistency", get(handlers::consistency_handler));

    match security.api_key.as_deref().filter(|k| !k.is_empty()) {
        Some(key) => {
            tracing::info!("API key authentication enabled");
            router = router.layer(axum_middleware::from_fn_with_state(
                Arc::<str>::from(key),
                auth::api_key_auth_middleware,
            ));
        }
        None => tracing::warn!(
            "API key authentication DISABLED; set MERIT_API_KEY unless a gateway guards this service"
        ),
    }

    match middleware::create_rate_limiter(security.rate_limit) {
        Some(limiter) => {
            tracing::info!(rps = security.rate_limit, "rate limiting enabled");
            router = router.layer(axum_middleware::from_fn_with_state(
                limiter,
                middleware::rate_limit_middleware,
            ));
        }
        None => tracing::info!("rate limiting disabled"),
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors_layer(security.cors_origins.as_deref()))
                .layer(axum::extract::DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Bind `addr` and serve until Ctrl+C.
pub async fn run_server(
    addr: &str,
    service: AchievementService,
    security: &SecurityConfig,
) -> Result<(), MeritError> {
    let router = create_router(AppState::new(service), security);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| MeritError::Storage(format!("bind {} failed: {}", addr, e)))?;

    tracing::info!("merit HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| MeritError::Storage(format!("server error: {}", e)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
