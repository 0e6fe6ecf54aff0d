// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Waitlist Submission Gate
//!
//! A single endpoint, `POST /api/submit-form`, that sits in front of a
//! managed record store and admits waitlist sign-ups:
//!
//! - Per-client fixed-window rate limiting (5 per 15 minutes by default)
//! - Request size limit and bounded body read
//! - Email, length and honeypot validation
//! - Heuristic content scan for markup and script injection
//! - Duplicate email suppression over the last hour
//! - Insert into the store, returning the stored row

pub mod client_ip;
pub mod clock;
pub mod config;
pub mod error;
pub mod gate;
pub mod handlers;
pub mod limiter;
pub mod metrics;
pub mod store;
pub mod validator;

pub use config::Config;
pub use error::GateError;
pub use gate::SubmissionGate;
pub use limiter::{RateLimitDecision, RateLimiter};
pub use store::{MemoryStore, PostgrestStore, RecordStore};
pub use validator::{SubmissionValidator, ValidationError};
