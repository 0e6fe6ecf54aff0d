// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP handlers for the waitlist submission gate.

use crate::client_ip::resolve_client_key;
use crate::config::Config;
use crate::error::{X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING};
use crate::gate::{SubmissionGate, SubmissionRequest};
use crate::limiter::RateLimitDecision;
use crate::metrics::Metrics;
use crate::store::SubmissionRecord;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

/// Shared application state.
pub struct AppState {
    pub gate: SubmissionGate,
    pub metrics: Arc<Metrics>,
    pub config: Config,
}

/// Success response body.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub success: bool,
    pub message: &'static str,
    pub data: SubmissionRecord,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Build the service router.
pub fn router(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/api/submit-form", post(submit_form));

    if state.config.metrics.enabled {
        app = app.route(&state.config.metrics.path, get(metrics));
    }

    let origins: Vec<HeaderValue> = state
        .config
        .cors
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    if !origins.is_empty() {
        let cors = CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([axum::http::Method::POST, axum::http::Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE]);
        app = app.layer(cors);
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "waitlist-gate",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Prometheus scrape endpoint.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// `POST /api/submit-form`
///
/// The connection address comes from `ConnectInfo` when the server was
/// started with it; otherwise only headers are available for the client key.
pub async fn submit_form(State(state): State<Arc<AppState>>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();

    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client_key = resolve_client_key(&state.config.client_ip, peer, &parts.headers);

    let content_length = parts
        .headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let user_agent = parts
        .headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let request = SubmissionRequest {
        client_key,
        content_length,
        user_agent,
    };

    match state.gate.handle(request, body).await {
        Ok(accepted) => {
            let (limit, remaining) = match accepted.rate_limit {
                RateLimitDecision::Allowed {
                    limit, remaining, ..
                } => (limit, remaining),
                RateLimitDecision::Limited { limit, .. } => (limit, 0),
            };
            (
                StatusCode::OK,
                [
                    (X_RATELIMIT_LIMIT, HeaderValue::from(limit)),
                    (X_RATELIMIT_REMAINING, HeaderValue::from(remaining)),
                ],
                Json(SubmitResponse {
                    success: true,
                    message: "Data saved successfully",
                    data: accepted.record,
                }),
            )
                .into_response()
        }
        Err(err) => err.into_response(),
    }
}
