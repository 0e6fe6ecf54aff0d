// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! The submission pipeline.
//!
//! Steps run in order and stop at the first failure:
//! 1. declared body size
//! 2. per-client rate limit
//! 3. store credentials present
//! 4. body read and JSON parse, bounded by a timeout
//! 5. field validation and content scan
//! 6. duplicate email look-back (fails open)
//! 7. insert

use crate::clock::Clock;
use crate::config::StoreConfig;
use crate::error::GateError;
use crate::limiter::{RateLimitDecision, RateLimiter};
use crate::metrics::{Metrics, Outcome};
use crate::store::{NewSubmission, RecordStore, StoreError, SubmissionRecord};
use crate::validator::{SubmissionForm, SubmissionValidator, ValidatedSubmission, ValidationError};
use axum::body::{Body, Bytes, HttpBody};
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Transport details the pipeline needs besides the body.
#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    /// Rate-limit key, see [`crate::client_ip`]
    pub client_key: String,
    /// Declared `Content-Length`, if any
    pub content_length: Option<u64>,
    pub user_agent: String,
}

/// A stored submission plus the rate-limit state it was admitted under.
#[derive(Debug, Clone)]
pub struct Accepted {
    pub record: SubmissionRecord,
    pub rate_limit: RateLimitDecision,
}

pub struct SubmissionGate {
    limiter: Arc<RateLimiter>,
    validator: SubmissionValidator,
    store: Option<Arc<dyn RecordStore>>,
    store_config: StoreConfig,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
}

impl SubmissionGate {
    /// `store` is `None` when credentials are missing; every submission then
    /// fails closed with a configuration error.
    pub fn new(
        limiter: Arc<RateLimiter>,
        validator: SubmissionValidator,
        store: Option<Arc<dyn RecordStore>>,
        store_config: StoreConfig,
        clock: Arc<dyn Clock>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            limiter,
            validator,
            store,
            store_config,
            clock,
            metrics,
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Run one submission through the pipeline.
    pub async fn handle(
        &self,
        request: SubmissionRequest,
        body: Body,
    ) -> Result<Accepted, GateError> {
        let result = self.process(&request, body).await;
        match &result {
            Ok(_) => self.metrics.record(Outcome::Accepted),
            Err(err) => self.metrics.record(err.outcome()),
        }
        result
    }

    async fn process(&self, request: &SubmissionRequest, body: Body) -> Result<Accepted, GateError> {
        let client = request.client_key.as_str();
        let limits = self.validator.config();

        if request
            .content_length
            .is_some_and(|len| len > limits.max_body_bytes)
        {
            debug!(client, content_length = ?request.content_length, "Declared body too large");
            return Err(GateError::PayloadTooLarge);
        }

        let rate_limit = self.limiter.check_and_consume(client).await;
        if let RateLimitDecision::Limited {
            limit,
            retry_after,
            reset_at,
        } = rate_limit
        {
            info!(
                client,
                retry_after_secs = retry_after.as_secs(),
                "Rate limit exceeded"
            );
            return Err(GateError::RateLimited {
                limit,
                retry_after,
                reset_at,
            });
        }

        let Some(store) = self.store.as_ref() else {
            error!("Record store credentials are not configured");
            return Err(GateError::Misconfigured);
        };

        let bytes = match tokio::time::timeout(
            limits.body_timeout(),
            read_body(body, limits.max_body_bytes),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                warn!(client, "Timed out reading request body");
                return Err(GateError::BodyTimeout);
            }
        };

        let form: SubmissionForm = serde_json::from_slice(&bytes).map_err(|e| {
            debug!(client, error = %e, "Request body is not a valid submission");
            GateError::InvalidBody {
                detail: e.to_string(),
            }
        })?;

        let submission = self.validator.validate(form).map_err(|err| {
            match &err {
                ValidationError::HoneypotFilled => info!(client, "Honeypot triggered"),
                ValidationError::SuspiciousContent(pattern) => {
                    info!(client, %pattern, "Suspicious pattern detected")
                }
                _ => debug!(client, error = %err, "Validation failed"),
            }
            err
        })?;

        if self.is_recent_duplicate(store.as_ref(), &submission.email).await {
            info!(client, "Duplicate submission attempt");
            return Err(GateError::Duplicate);
        }

        let new = build_record(submission, request);
        let insert = tokio::time::timeout(self.store_config.timeout(), store.insert(&new));
        let record = match insert.await {
            Ok(Ok(record)) => record,
            Ok(Err(err)) => {
                error!(client, error = %err, "Failed to store submission");
                return Err(GateError::Store(err));
            }
            Err(_) => {
                error!(client, "Timed out storing submission");
                return Err(GateError::Store(StoreError::Timeout));
            }
        };

        info!(client, remaining = rate_limit.remaining(), "Submission stored");
        Ok(Accepted { record, rate_limit })
    }

    /// Whether `email` already has a row inside the duplicate window.
    ///
    /// Lookup failures count as "no duplicate".
    async fn is_recent_duplicate(&self, store: &dyn RecordStore, email: &str) -> bool {
        let window = chrono::Duration::from_std(self.store_config.duplicate_window())
            .unwrap_or(chrono::Duration::zero());
        let since = self.clock.now() - window;

        match tokio::time::timeout(
            self.store_config.timeout(),
            store.count_recent_submissions(email, since),
        )
        .await
        {
            Ok(Ok(count)) => count > 0,
            Ok(Err(err)) => {
                warn!(error = %err, "Duplicate check failed, continuing");
                false
            }
            Err(_) => {
                warn!("Duplicate check timed out, continuing");
                false
            }
        }
    }
}

fn build_record(submission: ValidatedSubmission, request: &SubmissionRequest) -> NewSubmission {
    NewSubmission {
        role: submission
            .role
            .map(|role| role.as_str().to_string())
            .unwrap_or_default(),
        email: submission.email,
        company: submission.company,
        expertise_looking_for: submission.details,
        utm_source: submission.utm_source,
        utm_campaign: submission.utm_campaign,
        utm_ad: submission.utm_ad,
        ip_address: request.client_key.clone(),
        user_agent: request.user_agent.clone(),
        honeypot: submission.honeypot,
    }
}

/// Collect the body, refusing anything past `limit` bytes.
async fn read_body(mut body: Body, limit: u64) -> Result<Bytes, GateError> {
    let mut buf: Vec<u8> = Vec::new();

    while let Some(frame) = std::future::poll_fn(|cx| Pin::new(&mut body).poll_frame(cx)).await {
        let frame = frame.map_err(|e| GateError::InvalidBody {
            detail: e.to_string(),
        })?;
        if let Ok(data) = frame.into_data() {
            if (buf.len() + data.len()) as u64 > limit {
                return Err(GateError::PayloadTooLarge);
            }
            buf.extend_from_slice(&data);
        }
    }

    Ok(Bytes::from(buf))
}
