// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Waitlist submission validator.
//!
//! Turns the loosely-typed inbound form into a [`ValidatedSubmission`]:
//! - email presence, syntax and length
//! - honeypot field (bots fill it, humans never see it)
//! - role, company and details limits
//! - a heuristic content scan for markup, script schemes, event handlers
//!   and runs of repeated characters
//!
//! The first failing check wins.

use crate::config::ValidationConfig;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::debug;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap()
});

static SCRIPT_SCHEME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)javascript:").unwrap());

static EVENT_HANDLER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)on[a-z0-9_]+\s*=").unwrap());

/// Longest allowed run of one repeated character.
const MAX_CHAR_RUN: usize = 4;

/// Inbound form body. Every field is optional; absent fields take defaults
/// during validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SubmissionForm {
    pub role: Option<String>,
    /// Kept raw so a non-string email can be told apart from a missing one.
    pub email: Option<serde_json::Value>,
    pub company: Option<String>,
    pub expertise_looking_for: Option<String>,
    pub utm_source: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_ad: Option<String>,
    pub honeypot: Option<String>,
}

/// Who is joining the waitlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Buyer,
    Manufacturer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Buyer => "buyer",
            Role::Manufacturer => "manufacturer",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "buyer" => Some(Role::Buyer),
            "manufacturer" => Some(Role::Manufacturer),
            _ => None,
        }
    }
}

/// A submission that passed every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSubmission {
    pub role: Option<Role>,
    pub email: String,
    pub company: String,
    pub details: String,
    pub utm_source: String,
    pub utm_campaign: String,
    pub utm_ad: String,
    pub honeypot: String,
}

/// Which content heuristic fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspiciousPattern {
    RepeatedCharacters,
    AngleBracket,
    ScriptScheme,
    EventHandler,
}

impl std::fmt::Display for SuspiciousPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RepeatedCharacters => write!(f, "repeated characters"),
            Self::AngleBracket => write!(f, "angle bracket"),
            Self::ScriptScheme => write!(f, "javascript scheme"),
            Self::EventHandler => write!(f, "event handler attribute"),
        }
    }
}

/// Validation error types. The display text is what the client sees.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Valid email is required")]
    MissingEmail,

    #[error("Invalid email format")]
    InvalidEmail,

    #[error("Email too long")]
    EmailTooLong,

    /// Deliberately vague so the honeypot is not revealed.
    #[error("Invalid submission")]
    HoneypotFilled,

    #[error("Invalid role")]
    InvalidRole,

    #[error("Company name too long")]
    CompanyTooLong,

    #[error("Details too long")]
    DetailsTooLong,

    #[error("Invalid content detected")]
    SuspiciousContent(SuspiciousPattern),
}

/// Submission form validator.
pub struct SubmissionValidator {
    config: ValidationConfig,
}

impl SubmissionValidator {
    /// Create a new validator with the given configuration.
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Validate a complete submission.
    pub fn validate(&self, form: SubmissionForm) -> Result<ValidatedSubmission, ValidationError> {
        let email = self.validate_email(form.email.as_ref())?;

        if form
            .honeypot
            .as_deref()
            .is_some_and(|h| !h.trim().is_empty())
        {
            debug!("Honeypot field filled");
            return Err(ValidationError::HoneypotFilled);
        }

        let role = match form.role.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(value) => Some(Role::parse(value).ok_or(ValidationError::InvalidRole)?),
        };

        let company = form.company.as_deref().unwrap_or_default().trim().to_string();
        if company.chars().count() > self.config.max_company_len {
            return Err(ValidationError::CompanyTooLong);
        }

        let details = form
            .expertise_looking_for
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_string();
        if details.chars().count() > self.config.max_details_len {
            return Err(ValidationError::DetailsTooLong);
        }

        let combined = format!("{} {} {}", email, company, details);
        if let Some(pattern) = scan_content(&combined) {
            debug!(%pattern, "Suspicious content");
            return Err(ValidationError::SuspiciousContent(pattern));
        }

        Ok(ValidatedSubmission {
            role,
            email,
            company,
            details,
            utm_source: form.utm_source.unwrap_or_default(),
            utm_campaign: form.utm_campaign.unwrap_or_default(),
            utm_ad: form.utm_ad.unwrap_or_default(),
            honeypot: form.honeypot.unwrap_or_default(),
        })
    }

    /// Presence, syntax and length of the email field. Returns it trimmed.
    pub fn validate_email(
        &self,
        email: Option<&serde_json::Value>,
    ) -> Result<String, ValidationError> {
        let email = match email {
            // Whitespace-only counts as present and fails the format check.
            Some(serde_json::Value::String(s)) if !s.is_empty() => s.trim(),
            _ => return Err(ValidationError::MissingEmail),
        };

        if !EMAIL_PATTERN.is_match(email) {
            return Err(ValidationError::InvalidEmail);
        }

        if email.chars().count() > self.config.max_email_len {
            return Err(ValidationError::EmailTooLong);
        }

        Ok(email.to_string())
    }
}

/// Run the content heuristics over `text`.
///
/// This is a spam/XSS tripwire, not a sanitizer.
pub fn scan_content(text: &str) -> Option<SuspiciousPattern> {
    if has_repeated_run(text, MAX_CHAR_RUN + 1) {
        return Some(SuspiciousPattern::RepeatedCharacters);
    }
    if text.contains(['<', '>']) {
        return Some(SuspiciousPattern::AngleBracket);
    }
    if SCRIPT_SCHEME.is_match(text) {
        return Some(SuspiciousPattern::ScriptScheme);
    }
    if EVENT_HANDLER.is_match(text) {
        return Some(SuspiciousPattern::EventHandler);
    }
    None
}

/// True if any non-line-break character repeats `run` or more times in a row.
fn has_repeated_run(text: &str, run: usize) -> bool {
    let mut previous = None;
    let mut count = 0;

    for c in text.chars() {
        if matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}') {
            previous = None;
            count = 0;
            continue;
        }
        if Some(c) == previous {
            count += 1;
        } else {
            previous = Some(c);
            count = 1;
        }
        if count >= run {
            return true;
        }
    }
    false
}
