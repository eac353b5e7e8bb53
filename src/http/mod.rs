//! HTTP boundary: router, middleware stack and server.

mod error;
mod handlers;
mod middleware;
mod server;

pub use error::{ApiError, ErrorBody};
pub use middleware::{X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING, X_RATELIMIT_RESET, X_REQUEST_ID};
pub use server::HttpServer;

use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;

use crate::config::ServerConfig;
use crate::error::{MarketgateError, Result};
use crate::ratelimit::{AdmissionController, Clock, IdentityResolver};

/// Largest accepted request body.
const BODY_LIMIT_BYTES: usize = 10 * 1024 * 1024;

/// Shared application state.
pub struct AppState {
    /// Per-identity admission controller
    pub controller: Arc<AdmissionController>,
    /// Time source for admission decisions and `/health`
    pub clock: Arc<dyn Clock>,
    /// Derives the rate-limit key for each request
    pub identity: IdentityResolver,
    /// Deployment environment name
    pub environment: String,
}

impl AppState {
    /// Bundle the collaborators the router needs.
    pub fn new(
        controller: Arc<AdmissionController>,
        clock: Arc<dyn Clock>,
        identity: IdentityResolver,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            controller,
            clock,
            identity,
            environment: environment.into(),
        }
    }
}

/// Build the application router with the full middleware stack.
///
/// Outermost first: security headers, CORS, body limit, compression,
/// request logging, admission control, then routing.
pub fn router(state: Arc<AppState>, server: &ServerConfig) -> Result<Router> {
    let cors = cors_layer(&server.cors_origin)?;

    Ok(Router::new()
        .route("/health", get(handlers::health))
        .route("/api", get(handlers::api_index))
        .fallback(handlers::not_found)
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state),
            middleware::admission,
        ))
        .layer(axum::middleware::from_fn(middleware::log_requests))
        .layer(CompressionLayer::new())
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
        .layer(cors)
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .with_state(state))
}

fn cors_layer(origin: &str) -> Result<CorsLayer> {
    let origin = HeaderValue::from_str(origin).map_err(|e| {
        MarketgateError::Config(format!("invalid server.cors_origin '{}': {}", origin, e))
    })?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ]))
}
