// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Prometheus metrics for the submission gate.
//!
//! Metrics live on a private registry owned by the app state rather than the
//! process-global default registry, so several gates can coexist in tests.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Outcome label for `waitlist_submissions_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Accepted,
    RateLimited,
    Invalid,
    Duplicate,
    TooLarge,
    Misconfigured,
    StoreError,
    Internal,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Accepted => "accepted",
            Outcome::RateLimited => "rate_limited",
            Outcome::Invalid => "invalid",
            Outcome::Duplicate => "duplicate",
            Outcome::TooLarge => "too_large",
            Outcome::Misconfigured => "misconfigured",
            Outcome::StoreError => "store_error",
            Outcome::Internal => "internal",
        }
    }
}

pub struct Metrics {
    registry: Registry,
    submissions: IntCounterVec,
    rate_limit_entries: IntGauge,
    swept: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let submissions = IntCounterVec::new(
            Opts::new("waitlist_submissions_total", "Submissions by outcome"),
            &["outcome"],
        )
        .expect("valid metric definition");
        let rate_limit_entries = IntGauge::new(
            "waitlist_rate_limit_entries",
            "Client keys tracked by the rate limiter",
        )
        .expect("valid metric definition");
        let swept = IntCounter::new(
            "waitlist_rate_limit_swept_total",
            "Rate limit entries removed by the sweeper",
        )
        .expect("valid metric definition");

        registry
            .register(Box::new(submissions.clone()))
            .expect("metric registered once");
        registry
            .register(Box::new(rate_limit_entries.clone()))
            .expect("metric registered once");
        registry
            .register(Box::new(swept.clone()))
            .expect("metric registered once");

        Self {
            registry,
            submissions,
            rate_limit_entries,
            swept,
        }
    }

    pub fn record(&self, outcome: Outcome) {
        self.submissions.with_label_values(&[outcome.as_str()]).inc();
    }

    pub fn submissions(&self, outcome: Outcome) -> u64 {
        self.submissions.with_label_values(&[outcome.as_str()]).get()
    }

    pub fn record_sweep(&self, removed: usize, tracked: usize) {
        self.swept.inc_by(removed as u64);
        self.rate_limit_entries.set(tracked as i64);
    }

    /// Render all metrics in the Prometheus text format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
