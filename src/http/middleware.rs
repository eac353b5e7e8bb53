//! Request middleware: admission control, request logging and security headers.

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use super::error::ApiError;
use super::AppState;
use crate::ratelimit::Decision;

/// Maximum requests admitted per window.
pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
/// Admissions left in the caller's current window.
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
/// Unix time, in whole seconds rounded up, at which the window resets.
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
/// Correlation id echoed from the request or generated per request.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Headers added to every response unless a handler already set them.
const SECURITY_HEADERS: &[(&str, &str)] = &[
    (
        "content-security-policy",
        "default-src 'self'; style-src 'self' 'unsafe-inline' https://fonts.googleapis.com; \
         font-src 'self' https://fonts.gstatic.com; img-src 'self' data: https:; \
         script-src 'self'",
    ),
    ("cross-origin-opener-policy", "same-origin"),
    ("cross-origin-resource-policy", "same-origin"),
    ("referrer-policy", "no-referrer"),
    ("strict-transport-security", "max-age=15552000; includeSubDomains"),
    ("x-content-type-options", "nosniff"),
    ("x-dns-prefetch-control", "off"),
    ("x-frame-options", "SAMEORIGIN"),
    ("x-permitted-cross-domain-policies", "none"),
    ("x-xss-protection", "0"),
];

fn peer_addr(request: &Request) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

/// The caller's IP for log lines, or `-` when the connection info is absent.
fn peer_ip_label(request: &Request) -> String {
    peer_addr(request)
        .map(|addr| addr.ip().to_canonical().to_string())
        .unwrap_or_else(|| "-".to_owned())
}

/// Gate the request through the admission controller.
///
/// Rejected requests never reach the handler.
pub async fn admission(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = peer_addr(&request).map(|addr| addr.ip());
    let identity = state.identity.resolve(request.headers(), peer);

    match state.controller.admit(&identity, state.clock.now()) {
        Decision::Allow {
            limit,
            remaining,
            reset_epoch_secs,
        } => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limit));
            headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(remaining));
            headers.insert(X_RATELIMIT_RESET, HeaderValue::from(reset_epoch_secs));
            response
        }
        Decision::Reject { retry_after_secs } => {
            info!(
                identity = %identity,
                retry_after_secs,
                "Request rate limited"
            );
            ApiError::RateLimitExceeded { retry_after_secs }.into_response()
        }
    }
}

/// Log the start and completion of every request and tag it with a request id.
pub async fn log_requests(mut request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let peer = peer_ip_label(&request);

    let request_id = request
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let id_value = HeaderValue::from_str(&request_id).ok();
    if let Some(value) = &id_value {
        request.headers_mut().insert(X_REQUEST_ID, value.clone());
    }

    let span = info_span!("request", request_id = %request_id);

    async move {
        info!(%method, %uri, %peer, "Request started");

        let mut response = next.run(request).await;
        if let Some(value) = id_value {
            response.headers_mut().insert(X_REQUEST_ID, value);
        }

        info!(
            %method,
            %uri,
            status = response.status().as_u16(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Request completed"
        );
        response
    }
    .instrument(span)
    .await
}

/// Fill in the standard hardening headers.
pub async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    for &(name, value) in SECURITY_HEADERS {
        headers
            .entry(HeaderName::from_static(name))
            .or_insert(HeaderValue::from_static(value));
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_from(peer: Option<&str>) -> Request {
        let mut request = Request::new(Body::empty());
        if let Some(peer) = peer {
            let addr: SocketAddr = peer.parse().unwrap();
            request.extensions_mut().insert(ConnectInfo(addr));
        }
        request
    }

    #[test]
    fn test_peer_label_is_bare_ip() {
        assert_eq!(peer_ip_label(&request_from(Some("10.1.2.3:54321"))), "10.1.2.3");
        assert_eq!(peer_ip_label(&request_from(Some("[2001:db8::1]:443"))), "2001:db8::1");
    }

    #[test]
    fn test_peer_label_canonicalises_mapped_ipv4() {
        let label = peer_ip_label(&request_from(Some("[::ffff:1.2.3.4]:8080")));
        assert_eq!(label, "1.2.3.4");
    }

    #[test]
    fn test_peer_label_without_connect_info() {
        assert_eq!(peer_ip_label(&request_from(None)), "-");
    }
}
