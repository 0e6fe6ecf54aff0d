// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Fixed-window rate limiter keyed by client address.
//!
//! Each key gets `max_requests` accepted calls per window. The first call
//! opens the window; once the count reaches the maximum, further calls are
//! rejected until the window's reset instant passes. Expired entries are
//! kept for `block_duration` and then dropped by the sweeper.
//!
//! State lives only in memory and is lost on restart. Two concurrent calls
//! from the same key serialize on the table lock, so counts are exact within
//! a single process.

use crate::clock::Clock;
use crate::config::RateLimitConfig;
use crate::metrics::Metrics;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Per-key window state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    /// Calls accepted in the current window
    pub count: u32,
    /// When the current window closes
    pub window_reset_at: DateTime<Utc>,
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Request is allowed
    Allowed {
        limit: u32,
        /// Calls left in the current window after this one
        remaining: u32,
        reset_at: DateTime<Utc>,
    },
    /// Request is rate limited
    Limited {
        limit: u32,
        /// Time until the window resets, rounded up to whole seconds
        retry_after: Duration,
        reset_at: DateTime<Utc>,
    },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed { .. })
    }

    pub fn remaining(&self) -> u32 {
        match self {
            RateLimitDecision::Allowed { remaining, .. } => *remaining,
            RateLimitDecision::Limited { .. } => 0,
        }
    }
}

/// Thread-safe rate limiter.
pub struct RateLimiter {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<String, RateLimitEntry>>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given configuration.
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Count a request against `key` and decide whether it may proceed.
    pub async fn check_and_consume(&self, key: &str) -> RateLimitDecision {
        let now = self.clock.now();
        let limit = self.config.max_requests;
        let window = chrono::Duration::from_std(self.config.window())
            .unwrap_or(chrono::Duration::zero());

        let mut entries = self.entries.write().await;

        match entries.get_mut(key) {
            Some(entry) if now <= entry.window_reset_at => {
                if entry.count >= limit {
                    let retry_after = retry_after(now, entry.window_reset_at);
                    debug!(client = %key, ?retry_after, "Rate limit exceeded");
                    return RateLimitDecision::Limited {
                        limit,
                        retry_after,
                        reset_at: entry.window_reset_at,
                    };
                }

                entry.count += 1;
                RateLimitDecision::Allowed {
                    limit,
                    remaining: limit - entry.count,
                    reset_at: entry.window_reset_at,
                }
            }
            _ => {
                // No entry, or the old window has closed: open a fresh one.
                let entry = RateLimitEntry {
                    count: 1,
                    window_reset_at: now + window,
                };
                entries.insert(key.to_string(), entry);
                RateLimitDecision::Allowed {
                    limit,
                    remaining: limit.saturating_sub(1),
                    reset_at: entry.window_reset_at,
                }
            }
        }
    }

    /// Current entry for `key`, if tracked.
    pub async fn entry(&self, key: &str) -> Option<RateLimitEntry> {
        self.entries.read().await.get(key).copied()
    }

    /// Number of tracked keys.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drop entries whose window closed more than `block_duration` ago.
    ///
    /// Returns the number of entries removed.
    pub async fn cleanup(&self) -> usize {
        let now = self.clock.now();
        let retention = chrono::Duration::from_std(self.config.block_duration())
            .unwrap_or(chrono::Duration::zero());

        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| now <= entry.window_reset_at + retention);
        before - entries.len()
    }

    /// Start the periodic cleanup task.
    ///
    /// The task runs until [`SweeperHandle::shutdown`] is awaited or the
    /// handle is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, metrics: Arc<Metrics>) -> SweeperHandle {
        let limiter = Arc::clone(self);
        let period = self.config.sweep_interval().max(Duration::from_millis(1));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = interval.tick() => {
                        let removed = limiter.cleanup().await;
                        let tracked = limiter.len().await;
                        metrics.record_sweep(removed, tracked);
                        if removed > 0 {
                            debug!(removed, tracked, "Swept expired rate limit entries");
                        }
                    }
                }
            }

            info!("Rate limit sweeper stopped");
        });

        SweeperHandle {
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

/// Owner of the background sweep task.
pub struct SweeperHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Signal the sweeper to stop and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn retry_after(now: DateTime<Utc>, reset_at: DateTime<Utc>) -> Duration {
    let millis = (reset_at - now).num_milliseconds().max(0) as u64;
    let secs = millis.div_ceil(1000).max(1);
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn limiter_with_clock() -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let limiter = RateLimiter::new(RateLimitConfig::default(), clock.clone());
        (limiter, clock)
    }

    #[tokio::test]
    async fn test_five_allowed_then_limited() {
        let (limiter, _clock) = limiter_with_clock();
        let mut last_remaining = u32::MAX;

        for _ in 0..5 {
            let decision = limiter.check_and_consume("10.0.0.1").await;
            assert!(decision.is_allowed(), "Should not be limited");
            assert!(decision.remaining() < last_remaining);
            last_remaining = decision.remaining();
        }
        assert_eq!(last_remaining, 0);

        match limiter.check_and_consume("10.0.0.1").await {
            RateLimitDecision::Limited {
                limit, retry_after, ..
            } => {
                assert_eq!(limit, 5);
                assert_eq!(retry_after, Duration::from_secs(900));
            }
            RateLimitDecision::Allowed { .. } => panic!("Should be limited"),
        }

        let entry = limiter.entry("10.0.0.1").await.unwrap();
        assert_eq!(entry.count, 5);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let (limiter, _clock) = limiter_with_clock();
        for _ in 0..5 {
            limiter.check_and_consume("10.0.0.1").await;
        }
        assert!(!limiter.check_and_consume("10.0.0.1").await.is_allowed());
        assert!(limiter.check_and_consume("10.0.0.2").await.is_allowed());
    }

    #[tokio::test]
    async fn test_window_expiry_resets_count() {
        let (limiter, clock) = limiter_with_clock();
        for _ in 0..5 {
            limiter.check_and_consume("10.0.0.1").await;
        }
        assert!(!limiter.check_and_consume("10.0.0.1").await.is_allowed());

        clock.advance(Duration::from_secs(901));
        let decision = limiter.check_and_consume("10.0.0.1").await;
        assert_eq!(decision.remaining(), 4);
        assert_eq!(limiter.entry("10.0.0.1").await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_retry_after_shrinks_with_time() {
        let (limiter, clock) = limiter_with_clock();
        for _ in 0..5 {
            limiter.check_and_consume("k").await;
        }
        clock.advance(Duration::from_millis(600_500));

        match limiter.check_and_consume("k").await {
            RateLimitDecision::Limited { retry_after, .. } => {
                // 299.5s left rounds up
                assert_eq!(retry_after, Duration::from_secs(300));
            }
            RateLimitDecision::Allowed { .. } => panic!("Should be limited"),
        }
    }

    #[tokio::test]
    async fn test_cleanup_removes_long_expired_entries() {
        let (limiter, clock) = limiter_with_clock();
        limiter.check_and_consume("old").await;

        clock.advance(Duration::from_secs(30 * 60));
        limiter.check_and_consume("recent").await;

        // "old" window closed 15m + 1h ago, "recent" closes in 15m.
        clock.advance(Duration::from_secs(60 * 60 + 1));
        assert_eq!(limiter.cleanup().await, 1);
        assert!(limiter.entry("old").await.is_none());
        assert!(limiter.entry("recent").await.is_some());
    }

    #[tokio::test]
    async fn test_cleanup_keeps_recently_expired_entries() {
        let (limiter, clock) = limiter_with_clock();
        limiter.check_and_consume("k").await;

        clock.advance(Duration::from_secs(30 * 60));
        assert_eq!(limiter.cleanup().await, 0);
        assert_eq!(limiter.len().await, 1);
    }

    #[tokio::test]
    async fn test_sweeper_runs_and_stops() {
        let clock = Arc::new(ManualClock::default());
        let config = RateLimitConfig {
            sweep_interval_secs: 0,
            ..Default::default()
        };
        let limiter = Arc::new(RateLimiter::new(config, clock.clone()));
        limiter.check_and_consume("k").await;
        clock.advance(Duration::from_secs(2 * 60 * 60));

        let sweeper = limiter.spawn_sweeper(Arc::new(Metrics::new()));
        for _ in 0..100 {
            if limiter.is_empty().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(limiter.is_empty().await);

        sweeper.shutdown().await;
    }
}
