// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Record store for accepted waitlist submissions.
//!
//! Persistence is delegated to a managed Postgres behind a PostgREST-style
//! HTTP API (`/rest/v1/<table>`), authenticated with a service key. The gate
//! needs only two calls: count recent rows for an email, and insert one
//! row returning it.

use crate::clock::Clock;
use crate::config::StoreConfig;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use url::Url;

/// Row written for an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSubmission {
    pub role: String,
    pub email: String,
    pub company: String,
    pub expertise_looking_for: String,
    pub utm_source: String,
    pub utm_campaign: String,
    pub utm_ad: String,
    pub ip_address: String,
    pub user_agent: String,
    pub honeypot: String,
}

/// A stored submission as returned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    #[serde(flatten)]
    pub submission: NewSubmission,
    pub created_at: DateTime<Utc>,
}

impl SubmissionRecord {
    /// Record for a row the store returned after inserting `sent`.
    ///
    /// Only `id` and `created_at` are read from the row; other columns may
    /// be null or reshaped by the store, so the submitted values stand in.
    pub fn from_row(row: &serde_json::Value, sent: &NewSubmission) -> Self {
        let id = row.get("id").filter(|id| !id.is_null()).cloned();
        let created_at = row
            .get("created_at")
            .and_then(serde_json::Value::as_str)
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Self {
            id,
            submission: sent.clone(),
            created_at,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Request(#[from] reqwest::Error),

    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("invalid store URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unexpected store response: {0}")]
    Decode(String),

    #[error("request timed out")]
    Timeout,
}

/// The two operations the gate consumes.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Number of rows for `email` created at or after `since`.
    async fn count_recent_submissions(
        &self,
        email: &str,
        since: DateTime<Utc>,
    ) -> Result<usize, StoreError>;

    /// Insert one row and return it as stored.
    async fn insert(&self, submission: &NewSubmission) -> Result<SubmissionRecord, StoreError>;
}

/// Error body returned by the REST API on failure.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

/// HTTP client for a PostgREST-compatible store.
pub struct PostgrestStore {
    endpoint: Url,
    service_key: String,
    client: reqwest::Client,
}

impl PostgrestStore {
    /// Create a client for `table` under the project at `base_url`.
    pub fn new(
        base_url: &str,
        service_key: &str,
        table: &str,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base.join(&format!("rest/v1/{}", table))?;

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            endpoint,
            service_key: service_key.to_string(),
            client,
        })
    }

    /// Build a store from config, or `None` if credentials are missing.
    pub fn from_config(config: &StoreConfig) -> Result<Option<Self>, StoreError> {
        match config.credentials() {
            Some((url, key)) => Self::new(url, key, &config.table, config.timeout()).map(Some),
            None => Ok(None),
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Query URL selecting the email column of rows for `email` created at
    /// or after `since`.
    pub fn recent_submissions_url(&self, email: &str, since: DateTime<Utc>) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("select", "email")
            .append_pair("email", &format!("eq.{}", email))
            .append_pair(
                "created_at",
                &format!("gte.{}", since.to_rfc3339_opts(SecondsFormat::Millis, true)),
            );
        url
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&text)
            .ok()
            .and_then(|body| body.message)
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            });

        Err(StoreError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl RecordStore for PostgrestStore {
    async fn count_recent_submissions(
        &self,
        email: &str,
        since: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let url = self.recent_submissions_url(email, since);
        let response = self.authorized(self.client.get(url)).send().await?;
        let response = Self::check_status(response).await?;
        let rows: Vec<serde_json::Value> = response.json().await?;
        Ok(rows.len())
    }

    async fn insert(&self, submission: &NewSubmission) -> Result<SubmissionRecord, StoreError> {
        let response = self
            .authorized(self.client.post(self.endpoint.clone()))
            .header("Prefer", "return=representation")
            .json(&[submission])
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let rows: Vec<serde_json::Value> = response.json().await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Decode("insert returned no rows".to_string()))?;
        Ok(SubmissionRecord::from_row(&row, submission))
    }
}

/// In-process store with the same semantics.
pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    records: RwLock<Vec<SubmissionRecord>>,
    next_id: AtomicU64,
    fail_queries: AtomicBool,
    fail_inserts: AtomicBool,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            records: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            fail_queries: AtomicBool::new(false),
            fail_inserts: AtomicBool::new(false),
        }
    }

    /// Make `count_recent_submissions` return an error.
    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::Relaxed);
    }

    /// Make `insert` return an error.
    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::Relaxed);
    }

    pub async fn records(&self) -> Vec<SubmissionRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn count_recent_submissions(
        &self,
        email: &str,
        since: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        if self.fail_queries.load(Ordering::Relaxed) {
            return Err(StoreError::Api {
                status: 503,
                message: "query unavailable".to_string(),
            });
        }

        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| r.submission.email == email && r.created_at >= since)
            .count())
    }

    async fn insert(&self, submission: &NewSubmission) -> Result<SubmissionRecord, StoreError> {
        if self.fail_inserts.load(Ordering::Relaxed) {
            return Err(StoreError::Api {
                status: 500,
                message: "insert rejected".to_string(),
            });
        }

        let record = SubmissionRecord {
            id: Some(self.next_id.fetch_add(1, Ordering::Relaxed).into()),
            submission: submission.clone(),
            created_at: self.clock.now(),
        };
        self.records.write().await.push(record.clone());
        Ok(record)
    }
}
