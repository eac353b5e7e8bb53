//! Route handlers.

use axum::extract::State;
use axum::http::Uri;
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::error::ApiError;
use super::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub success: bool,
    pub message: &'static str,
    pub timestamp: String,
    pub environment: String,
    pub version: &'static str,
}

/// Liveness check.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        success: true,
        message: "API is running",
        timestamp: state.clock.now().to_rfc3339(),
        environment: state.environment.clone(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// API root, listing what this service answers.
pub async fn api_index() -> Json<Value> {
    Json(json!({
        "success": true,
        "message": concat!("Marketplace API v", env!("CARGO_PKG_VERSION")),
        "endpoints": {
            "health": "/health",
        },
    }))
}

/// Fallback for unmatched routes.
pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound {
        path: uri.to_string(),
    }
}
