// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Client key resolution for rate limiting.
//!
//! The key is taken from the connection address or from proxy headers.
//! None of these are authenticated: `x-forwarded-for` and `x-real-ip` are
//! whatever the client (or the last proxy) sent. Only enable
//! `trust_forwarded_headers` when a proxy you control overwrites them.

use crate::config::ClientIpConfig;
use axum::http::HeaderMap;
use std::net::SocketAddr;

/// Key used when no address can be determined.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Resolve the rate-limit key for a request.
pub fn resolve_client_key(
    config: &ClientIpConfig,
    peer: Option<SocketAddr>,
    headers: &HeaderMap,
) -> String {
    let peer = peer.map(|addr| addr.ip().to_string());
    let forwarded = || forwarded_for(headers).or_else(|| real_ip(headers));

    let key = if config.trust_forwarded_headers {
        forwarded().or(peer)
    } else {
        peer.or_else(forwarded)
    };

    key.unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// First hop of `x-forwarded-for`.
fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

fn real_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    fn peer() -> Option<SocketAddr> {
        Some("192.0.2.7:51000".parse().unwrap())
    }

    #[test]
    fn test_direct_address_preferred_by_default() {
        let config = ClientIpConfig::default();
        let h = headers(&[("x-forwarded-for", "203.0.113.9")]);
        assert_eq!(resolve_client_key(&config, peer(), &h), "192.0.2.7");
    }

    #[test]
    fn test_falls_back_to_forwarded_headers() {
        let config = ClientIpConfig::default();

        let h = headers(&[("x-forwarded-for", "203.0.113.9, 10.0.0.1")]);
        assert_eq!(resolve_client_key(&config, None, &h), "203.0.113.9");

        let h = headers(&[("x-real-ip", "198.51.100.4")]);
        assert_eq!(resolve_client_key(&config, None, &h), "198.51.100.4");
    }

    #[test]
    fn test_unknown_when_nothing_available() {
        let config = ClientIpConfig::default();
        assert_eq!(
            resolve_client_key(&config, None, &HeaderMap::new()),
            UNKNOWN_CLIENT
        );

        let h = headers(&[("x-forwarded-for", " ")]);
        assert_eq!(resolve_client_key(&config, None, &h), UNKNOWN_CLIENT);
    }

    #[test]
    fn test_trusted_proxy_prefers_headers() {
        let config = ClientIpConfig {
            trust_forwarded_headers: true,
        };
        let h = headers(&[("x-forwarded-for", "203.0.113.9"), ("x-real-ip", "198.51.100.4")]);
        assert_eq!(resolve_client_key(&config, peer(), &h), "203.0.113.9");

        let h = headers(&[("x-real-ip", "198.51.100.4")]);
        assert_eq!(resolve_client_key(&config, peer(), &h), "198.51.100.4");

        assert_eq!(
            resolve_client_key(&config, peer(), &HeaderMap::new()),
            "192.0.2.7"
        );
    }
}
