// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Test data generators for abuse simulation.

use serde_json::{json, Value};
use std::net::{IpAddr, Ipv4Addr};

/// Generate a pool of client addresses.
pub fn generate_ips(count: usize) -> Vec<IpAddr> {
    (0..count)
        .map(|i| {
            // Use 10.x.x.x private range
            let a = ((i >> 16) & 0xFF) as u8;
            let b = ((i >> 8) & 0xFF) as u8;
            let c = (i & 0xFF) as u8;
            IpAddr::V4(Ipv4Addr::new(10, a, b, c))
        })
        .collect()
}

/// Distinct, valid email addresses.
pub fn generate_emails(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("lead{}@company-{}.example.com", i, i / 10))
        .collect()
}

/// A well-formed submission as the landing page sends it.
pub fn legitimate_submission(email: &str, buyer: bool) -> Value {
    json!({
        "role": if buyer { "buyer" } else { "manufacturer" },
        "email": email,
        "company": "Northwind Fabrication",
        "expertise_looking_for": "CNC milling, sheet metal",
        "utm_source": "website",
        "utm_campaign": "waitlist",
        "utm_ad": "landing_page",
        "honeypot": ""
    })
}

/// Submissions a form-filling bot typically produces.
pub fn bot_submissions() -> Vec<Value> {
    vec![
        // Honeypot filled
        json!({"email": "bot1@example.com", "honeypot": "http://cheap-pills.example"}),
        json!({"email": "bot2@example.com", "company": "Acme", "honeypot": "Acme"}),
        // Markup injection
        json!({"email": "bot3@example.com", "company": "<img src=x>"}),
        json!({"email": "bot4@example.com", "expertise_looking_for": "<a href='x'>deal</a>"}),
        // Script scheme, mixed case
        json!({"email": "bot5@example.com", "company": "JaVaScRiPt:alert(1)"}),
        // Event handler attributes
        json!({"email": "bot6@example.com", "expertise_looking_for": "x onmouseover = y"}),
        // Keyboard mashing
        json!({"email": "bot7@example.com", "company": "zzzzzzzz"}),
        json!({"email": "bot8@example.com", "expertise_looking_for": "!!!!!"}),
        // Junk email
        json!({"email": "bot9"}),
        json!({"email": ["bot10@example.com"]}),
    ]
}
