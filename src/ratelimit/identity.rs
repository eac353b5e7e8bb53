//! Rate-limit key resolution.

use axum::http::HeaderMap;
use std::net::IpAddr;

use crate::config::RateLimitingConfig;

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Derives the identity a request is counted against.
///
/// The key is the caller's IP address. Callers without a resolvable address
/// all share the fallback identity and therefore one window.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    trust_forwarded_for: bool,
    fallback: String,
}

impl IdentityResolver {
    /// Create a resolver.
    pub fn new(trust_forwarded_for: bool, fallback: impl Into<String>) -> Self {
        Self {
            trust_forwarded_for,
            fallback: fallback.into(),
        }
    }

    /// Create a resolver from the rate limiting configuration.
    pub fn from_config(config: &RateLimitingConfig) -> Self {
        Self::new(config.trust_forwarded_for, config.unknown_identity.clone())
    }

    /// The identity shared by unresolvable callers.
    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// Resolve the identity for a request from its headers and peer address.
    pub fn resolve(&self, headers: &HeaderMap, peer: Option<IpAddr>) -> String {
        let forwarded = if self.trust_forwarded_for {
            nearest_forwarded_ip(headers)
        } else {
            None
        };

        forwarded
            .or(peer)
            .map(|ip| ip.to_canonical().to_string())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::from_config(&RateLimitingConfig::default())
    }
}

/// The address appended by the trusted proxy: the last `X-Forwarded-For` hop.
///
/// Earlier hops are written by the client and are never used. An unparsable
/// last hop yields `None` rather than falling back to an earlier entry.
fn nearest_forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get_all(FORWARDED_FOR)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .last()
        .and_then(|hop| hop.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn forwarded(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_peer_address_is_identity() {
        let resolver = IdentityResolver::default();
        let peer: IpAddr = "10.1.2.3".parse().unwrap();

        assert_eq!(resolver.resolve(&HeaderMap::new(), Some(peer)), "10.1.2.3");
    }

    #[test]
    fn test_missing_peer_uses_fallback() {
        let resolver = IdentityResolver::default();

        assert_eq!(resolver.resolve(&HeaderMap::new(), None), "unknown");
        assert_eq!(resolver.fallback(), "unknown");
    }

    #[test]
    fn test_ipv4_mapped_address_is_canonicalised() {
        let resolver = IdentityResolver::default();
        let peer: IpAddr = "::ffff:1.2.3.4".parse().unwrap();

        assert_eq!(resolver.resolve(&HeaderMap::new(), Some(peer)), "1.2.3.4");
    }

    #[test]
    fn test_forwarded_for_ignored_when_untrusted() {
        let resolver = IdentityResolver::new(false, "unknown");
        let peer: IpAddr = "10.0.0.1".parse().unwrap();

        let identity = resolver.resolve(&forwarded("203.0.113.7"), Some(peer));
        assert_eq!(identity, "10.0.0.1");
    }

    #[test]
    fn test_forwarded_for_uses_proxy_appended_hop() {
        let resolver = IdentityResolver::new(true, "unknown");
        let peer: IpAddr = "10.0.0.1".parse().unwrap();

        let identity = resolver.resolve(&forwarded("garbage, 198.51.100.9, 203.0.113.7"), Some(peer));
        assert_eq!(identity, "203.0.113.7");
    }

    #[test]
    fn test_forwarded_for_last_of_multiple_header_lines() {
        let resolver = IdentityResolver::new(true, "unknown");
        let mut headers = HeaderMap::new();
        headers.append(FORWARDED_FOR, HeaderValue::from_static("9.9.9.9"));
        headers.append(FORWARDED_FOR, HeaderValue::from_static("203.0.113.7"));

        assert_eq!(resolver.resolve(&headers, None), "203.0.113.7");
    }

    #[test]
    fn test_spoofed_forwarded_prefix_cannot_escape_limit() {
        use crate::ratelimit::AdmissionController;
        use chrono::{DateTime, Utc};

        let resolver = IdentityResolver::new(true, "unknown");
        let controller = AdmissionController::default();
        let proxy: IpAddr = "10.0.0.1".parse().unwrap();
        let now = DateTime::<Utc>::UNIX_EPOCH;

        let allowed = (0..500u32)
            .filter(|i| {
                let value = format!("9.9.{}.{}, 203.0.113.7", i / 256, i % 256);
                let mut headers = HeaderMap::new();
                headers.insert(FORWARDED_FOR, HeaderValue::from_str(&value).unwrap());
                let identity = resolver.resolve(&headers, Some(proxy));
                controller.admit(&identity, now).is_allowed()
            })
            .count();

        assert_eq!(allowed, 100);
        assert_eq!(controller.tracked_identities(), 1);
        assert_eq!(controller.window("203.0.113.7").unwrap().count, 500);
    }

    #[test]
    fn test_unparsable_last_hop_does_not_use_client_entries() {
        let resolver = IdentityResolver::new(true, "unknown");
        let peer: IpAddr = "10.0.0.1".parse().unwrap();

        let identity = resolver.resolve(&forwarded("203.0.113.7, nope"), Some(peer));
        assert_eq!(identity, "10.0.0.1");
    }

    #[test]
    fn test_unparsable_forwarded_for_falls_back_to_peer() {
        let resolver = IdentityResolver::new(true, "unknown");
        let peer: IpAddr = "10.0.0.1".parse().unwrap();

        assert_eq!(resolver.resolve(&forwarded("nope"), Some(peer)), "10.0.0.1");
        assert_eq!(resolver.resolve(&forwarded("nope"), None), "unknown");
    }
}
