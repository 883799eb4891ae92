//! # entl-api — Course Entitlements API Service
//!
//! Axum service exposing the staff-only course entitlement endpoint.
//!
//! ## Architecture
//!
//! Requests pass through, outermost first:
//!
//! ```text
//! TraceLayer → metrics → auth → site/request hooks → handler
//! ```
//!
//! - `auth` resolves a [`auth::CallerIdentity`] from a token or session
//!   cookie.
//! - The site layer opens a [`request_context::RequestScope`] for the
//!   `Host` site, so handlers receive the site's configuration (and its
//!   `ENTITLEMENT_POLICY`) as an explicit [`request_context::RequestContext`].
//!   Background code opens the same scope with
//!   [`request_context::emulate_request`].
//! - Handlers delegate to [`lifecycle`], which owns lazy expiration,
//!   revocation, and write-through persistence.
//!
//! `/health/*` and `/metrics` are unauthenticated.

pub mod auth;
pub mod bootstrap;
pub mod db;
pub mod error;
pub mod extractors;
pub mod lifecycle;
pub mod lms;
pub mod middleware;
pub mod openapi;
pub mod request_context;
pub mod routes;
pub mod state;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Router};
use entl_core::EntitlementState;
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;
use crate::middleware::metrics::ApiMetrics;
use crate::state::AppState;

/// Whether Prometheus metrics are collected and served.
///
/// Controlled by `ENTL_METRICS_ENABLED` (default `true`).
fn metrics_enabled() -> bool {
    std::env::var("ENTL_METRICS_ENABLED")
        .map(|v| v.to_lowercase() != "false")
        .unwrap_or(true)
}

/// Build the complete application router.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
        sessions: state.sessions.clone(),
    };
    let metrics = ApiMetrics::new();
    let metrics_on = metrics_enabled();

    let mut api = Router::new()
        .merge(routes::entitlements::router())
        .merge(openapi::router())
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(from_fn_with_state(
            state.clone(),
            request_context::site_middleware,
        ))
        .layer(from_fn(auth::auth_middleware));

    if metrics_on {
        api = api
            .layer(from_fn(middleware::metrics::metrics_middleware))
            .layer(Extension(metrics.clone()));
    }

    let api = api
        .layer(TraceLayer::new_for_http())
        .layer(Extension(auth_config))
        .with_state(state.clone());

    let mut unauthenticated = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness));

    if metrics_on {
        unauthenticated = unauthenticated
            .route("/metrics", get(prometheus_metrics))
            .layer(Extension(metrics));
    }

    let unauthenticated = unauthenticated.with_state(state);

    Router::new().merge(unauthenticated).merge(api)
}

/// GET /metrics — Prometheus scrape endpoint.
///
/// Entitlement gauges are recomputed from the store on every scrape.
async fn prometheus_metrics(
    State(state): State<AppState>,
    Extension(metrics): Extension<ApiMetrics>,
) -> impl IntoResponse {
    let entitlements = state.entitlements.list();
    let expired = entitlements.iter().filter(|e| e.is_expired()).count();
    let redeemed = entitlements.iter().filter(|e| e.is_redeemed()).count();

    metrics.entitlements_total().reset();
    metrics
        .entitlements_total()
        .with_label_values(&[EntitlementState::Active.as_str()])
        .set((entitlements.len() - expired) as f64);
    metrics
        .entitlements_total()
        .with_label_values(&[EntitlementState::Expired.as_str()])
        .set(expired as f64);
    metrics.entitlements_redeemed().set(redeemed as f64);
    metrics
        .lms_remote()
        .set(if state.lms.is_remote() { 1.0 } else { 0.0 });

    match metrics.gather_and_encode() {
        Ok(body) => (
            StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to encode Prometheus metrics: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e).into_response()
        }
    }
}

/// Liveness probe. The process is up.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe. Checks the database when one is configured.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    if let Some(pool) = &state.db_pool {
        if let Err(e) = sqlx::query("SELECT 1").execute(pool).await {
            tracing::warn!("Database health check failed: {e}");
            return (StatusCode::SERVICE_UNAVAILABLE, "database unreachable").into_response();
        }
    }
    (StatusCode::OK, "ready").into_response()
}
