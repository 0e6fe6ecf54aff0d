// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Tally of responses during abuse simulation.

use axum::http::StatusCode;
use std::collections::HashMap;

/// Counts responses by status code and client.
#[derive(Debug, Default)]
pub struct OutcomeTally {
    by_status: HashMap<StatusCode, usize>,
    accepted_per_ip: HashMap<String, usize>,
}

impl OutcomeTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, ip: &str, status: StatusCode) {
        *self.by_status.entry(status).or_insert(0) += 1;
        if status == StatusCode::OK {
            *self.accepted_per_ip.entry(ip.to_string()).or_insert(0) += 1;
        }
    }

    pub fn total(&self) -> usize {
        self.by_status.values().sum()
    }

    pub fn count(&self, status: StatusCode) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }

    /// Most submissions any single client got accepted.
    pub fn max_accepted_per_ip(&self) -> usize {
        self.accepted_per_ip.values().copied().max().unwrap_or(0)
    }

    /// Ratio of non-200 responses to total.
    pub fn block_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        (total - self.count(StatusCode::OK)) as f64 / total as f64
    }
}
