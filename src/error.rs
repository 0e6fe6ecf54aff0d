// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Error types for the submission gate and their HTTP mapping.

use crate::metrics::Outcome;
use crate::store::StoreError;
use crate::validator::ValidationError;
use axum::{
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Reasons a submission is refused. The display text is the client-facing message.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("Request too large")]
    PayloadTooLarge,

    #[error("Too many requests. Please try again later.")]
    RateLimited {
        limit: u32,
        retry_after: Duration,
        reset_at: DateTime<Utc>,
    },

    /// Store credentials are missing. Which one is only logged server-side.
    #[error("Server configuration error")]
    Misconfigured,

    /// Body could not be read or is not a JSON object of the expected shape.
    #[error("Internal server error: Invalid request body")]
    InvalidBody { detail: String },

    #[error("Internal server error: Request timeout")]
    BodyTimeout,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("You have already submitted recently. Please wait before submitting again.")]
    Duplicate,

    #[error("Database error: {0}")]
    Store(#[from] StoreError),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(rename = "retryAfter", skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl GateError {
    pub fn status(&self) -> StatusCode {
        match self {
            GateError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            GateError::RateLimited { .. } | GateError::Duplicate => StatusCode::TOO_MANY_REQUESTS,
            GateError::Validation(_) => StatusCode::BAD_REQUEST,
            GateError::Misconfigured
            | GateError::InvalidBody { .. }
            | GateError::BodyTimeout
            | GateError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn outcome(&self) -> Outcome {
        match self {
            GateError::PayloadTooLarge => Outcome::TooLarge,
            GateError::RateLimited { .. } => Outcome::RateLimited,
            GateError::Misconfigured => Outcome::Misconfigured,
            GateError::Validation(_) => Outcome::Invalid,
            GateError::InvalidBody { .. } | GateError::BodyTimeout => Outcome::Internal,
            GateError::Duplicate => Outcome::Duplicate,
            GateError::Store(_) => Outcome::StoreError,
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let status = self.status();

        if let GateError::RateLimited {
            limit,
            retry_after,
            reset_at,
        } = &self
        {
            let retry_secs = retry_after.as_secs();
            let body = ErrorResponse {
                success: false,
                error: self.to_string(),
                retry_after: Some(retry_secs),
            };
            return (
                status,
                [
                    (header::RETRY_AFTER, HeaderValue::from(retry_secs)),
                    (X_RATELIMIT_LIMIT, HeaderValue::from(*limit)),
                    (X_RATELIMIT_REMAINING, HeaderValue::from(0u32)),
                    (X_RATELIMIT_RESET, HeaderValue::from(reset_at.timestamp_millis())),
                ],
                Json(body),
            )
                .into_response();
        }

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            retry_after: None,
        };
        (status, Json(body)).into_response()
    }
}
