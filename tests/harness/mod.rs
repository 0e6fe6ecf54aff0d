// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Shared test harness: an in-process gate wired to a memory store and a
//! manual clock, plus request builders and abuse-scenario helpers.

#![allow(dead_code)]

pub mod generators;
pub mod outcomes;

use axum::{
    body::Body,
    http::{header, Request},
    response::Response,
    Router,
};
use std::sync::Arc;
use tower::ServiceExt;
use waitlist_gate::{
    clock::ManualClock,
    config::Config,
    gate::SubmissionGate,
    handlers::{router, AppState},
    limiter::{RateLimitEntry, RateLimiter},
    metrics::Metrics,
    store::{MemoryStore, RecordStore},
    validator::SubmissionValidator,
};

/// A gate with in-memory collaborators.
pub struct TestApp {
    state: Arc<AppState>,
    limiter: Arc<RateLimiter>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub metrics: Arc<Metrics>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self::build(config, true)
    }

    /// A gate whose store credentials are missing.
    pub fn without_store() -> Self {
        Self::build(Config::default(), false)
    }

    fn build(config: Config, with_store: bool) -> Self {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let metrics = Arc::new(Metrics::new());
        let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone(), clock.clone()));

        let gate_store = if with_store {
            Some(store.clone() as Arc<dyn RecordStore>)
        } else {
            None
        };

        let gate = SubmissionGate::new(
            limiter.clone(),
            SubmissionValidator::new(config.validation.clone()),
            gate_store,
            config.store.clone(),
            clock.clone(),
            metrics.clone(),
        );

        let state = Arc::new(AppState {
            gate,
            metrics: metrics.clone(),
            config,
        });

        Self {
            state,
            limiter,
            store,
            clock,
            metrics,
        }
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    pub async fn limiter_entry(&self, key: &str) -> Option<RateLimitEntry> {
        self.limiter.entry(key).await
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }
}

/// `POST /api/submit-form` from `ip` (via `x-forwarded-for`) with a JSON body.
pub fn post_json(ip: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/submit-form")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", ip)
        .body(Body::from(body.to_string()))
        .expect("valid request")
}

pub async fn read_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("readable body");
    serde_json::from_slice(&bytes).expect("JSON body")
}
