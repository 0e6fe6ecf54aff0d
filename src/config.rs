// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the waitlist submission gate.
//!
//! Configuration comes from the environment. `Config::from_env` reads a
//! `.env` file if present, then layers environment variables over the
//! defaults. Every field also carries a serde default.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the submission gate service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Payload and field validation configuration
    #[serde(default)]
    pub validation: ValidationConfig,

    /// External record store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Client address resolution policy
    #[serde(default)]
    pub client_ip: ClientIpConfig,

    /// CORS configuration
    #[serde(default)]
    pub cors: CorsConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Fixed-window rate limiting per client key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum accepted requests per window (default: 5)
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Window length in seconds (default: 900)
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// How long an expired entry is retained before the sweep drops it (default: 3600)
    #[serde(default = "default_block_duration_secs")]
    pub block_duration_secs: u64,

    /// Sweep period in seconds (default: 300)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

/// Limits applied to the inbound submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Largest accepted request body (default: 1 MiB)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: u64,

    /// Upper bound on reading and parsing the body (default: 5s)
    #[serde(default = "default_body_timeout_secs")]
    pub body_timeout_secs: u64,

    #[serde(default = "default_max_email_len")]
    pub max_email_len: usize,

    #[serde(default = "default_max_company_len")]
    pub max_company_len: usize,

    #[serde(default = "default_max_details_len")]
    pub max_details_len: usize,
}

/// Managed record store connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base URL of the store project
    #[serde(default)]
    pub url: Option<String>,

    /// Service API key
    #[serde(default)]
    pub service_key: Option<String>,

    /// Table submissions are written to (default: waitlist_submissions)
    #[serde(default = "default_table")]
    pub table: String,

    /// Per-call timeout in seconds (default: 10)
    #[serde(default = "default_store_timeout_secs")]
    pub timeout_secs: u64,

    /// Look-back for duplicate email suppression in seconds (default: 3600)
    #[serde(default = "default_duplicate_window_secs")]
    pub duplicate_window_secs: u64,
}

/// Where the rate-limit key comes from.
///
/// Forwarded headers are client-controlled unless a trusted proxy rewrites
/// them, so they are only preferred when `trust_forwarded_headers` is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientIpConfig {
    #[serde(default)]
    pub trust_forwarded_headers: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Origins allowed to POST submissions. Empty disables the CORS layer.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_max_requests() -> u32 {
    5
}

fn default_window_secs() -> u64 {
    15 * 60
}

fn default_block_duration_secs() -> u64 {
    60 * 60
}

fn default_sweep_interval_secs() -> u64 {
    5 * 60
}

fn default_max_body_bytes() -> u64 {
    1024 * 1024
}

fn default_body_timeout_secs() -> u64 {
    5
}

fn default_max_email_len() -> usize {
    254
}

fn default_max_company_len() -> usize {
    200
}

fn default_max_details_len() -> usize {
    1000
}

fn default_table() -> String {
    "waitlist_submissions".to_string()
}

fn default_store_timeout_secs() -> u64 {
    10
}

fn default_duplicate_window_secs() -> u64 {
    60 * 60
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            rate_limit: RateLimitConfig::default(),
            validation: ValidationConfig::default(),
            store: StoreConfig::default(),
            client_ip: ClientIpConfig::default(),
            cors: CorsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
            block_duration_secs: default_block_duration_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: default_max_body_bytes(),
            body_timeout_secs: default_body_timeout_secs(),
            max_email_len: default_max_email_len(),
            max_company_len: default_max_company_len(),
            max_details_len: default_max_details_len(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            service_key: None,
            table: default_table(),
            timeout_secs: default_store_timeout_secs(),
            duplicate_window_secs: default_duplicate_window_secs(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_metrics_path(),
        }
    }
}

impl RateLimitConfig {
    /// Get the rate window duration
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Retention of an expired entry before it is swept
    pub fn block_duration(&self) -> Duration {
        Duration::from_secs(self.block_duration_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl ValidationConfig {
    pub fn body_timeout(&self) -> Duration {
        Duration::from_secs(self.body_timeout_secs)
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn duplicate_window(&self) -> Duration {
        Duration::from_secs(self.duplicate_window_secs)
    }

    /// Both credentials, if both are present and non-blank.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let url = self.url.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let key = self
            .service_key
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())?;
        Some((url, key))
    }

    /// Names of the environment variables that are missing, for startup diagnostics.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
        let mut missing = Vec::new();
        if blank(&self.url) {
            missing.push("SUPABASE_URL");
        }
        if blank(&self.service_key) {
            missing.push("SUPABASE_SERVICE_ROLE_KEY");
        }
        missing
    }
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// A `.env` file in the working directory is read first; real environment
    /// variables win over it. Unparseable numeric values fall back to defaults.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        Config {
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            rate_limit: RateLimitConfig {
                max_requests: parse_var(&lookup, "RATE_LIMIT_MAX_REQUESTS")
                    .unwrap_or(defaults.rate_limit.max_requests),
                window_secs: parse_var(&lookup, "RATE_LIMIT_WINDOW_SECS")
                    .unwrap_or(defaults.rate_limit.window_secs),
                block_duration_secs: parse_var(&lookup, "RATE_LIMIT_BLOCK_SECS")
                    .unwrap_or(defaults.rate_limit.block_duration_secs),
                sweep_interval_secs: parse_var(&lookup, "RATE_LIMIT_SWEEP_SECS")
                    .unwrap_or(defaults.rate_limit.sweep_interval_secs),
            },
            validation: ValidationConfig {
                max_body_bytes: parse_var(&lookup, "MAX_BODY_BYTES")
                    .unwrap_or(defaults.validation.max_body_bytes),
                body_timeout_secs: parse_var(&lookup, "BODY_TIMEOUT_SECS")
                    .unwrap_or(defaults.validation.body_timeout_secs),
                ..defaults.validation
            },
            store: StoreConfig {
                url: lookup("SUPABASE_URL").or_else(|| lookup("NEXT_PUBLIC_SUPABASE_URL")),
                service_key: lookup("SUPABASE_SERVICE_ROLE_KEY"),
                table: lookup("STORE_TABLE").unwrap_or(defaults.store.table),
                timeout_secs: parse_var(&lookup, "STORE_TIMEOUT_SECS")
                    .unwrap_or(defaults.store.timeout_secs),
                duplicate_window_secs: parse_var(&lookup, "DUPLICATE_WINDOW_SECS")
                    .unwrap_or(defaults.store.duplicate_window_secs),
            },
            client_ip: ClientIpConfig {
                trust_forwarded_headers: parse_var(&lookup, "TRUST_FORWARDED_HEADERS")
                    .unwrap_or(false),
            },
            cors: CorsConfig {
                allowed_origins: lookup("ALLOWED_ORIGINS")
                    .map(|v| {
                        v.split(',')
                            .map(str::trim)
                            .filter(|o| !o.is_empty())
                            .map(String::from)
                            .collect()
                    })
                    .unwrap_or_default(),
            },
            metrics: MetricsConfig {
                enabled: parse_var(&lookup, "METRICS_ENABLED")
                    .unwrap_or(defaults.metrics.enabled),
                ..defaults.metrics
            },
        }
    }
}

fn parse_var<F, T>(lookup: &F, name: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(name).and_then(|v| v.trim().parse().ok())
}
