//! HTTP API for faucet service

use super::error::{FaucetError, FaucetResult};
use super::service::{FaucetService, FaucetStatus, GrantRequest, GrantResult, RequestContext};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, HeaderValue, Method},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

pub const REQUEST_FUNDS_PATH: &str = "/api/v1/faucet/request";
pub const STATUS_PATH: &str = "/api/v1/faucet/status";

/// Build the faucet router with CORS restricted to `allowed_origins`.
pub fn router(service: Arc<FaucetService>, allowed_origins: &[String]) -> Router {
    Router::new()
        .route(REQUEST_FUNDS_PATH, post(request_funds_handler))
        .route(STATUS_PATH, get(status_handler))
        .route("/health", get(health_handler))
        .layer(cors_layer(allowed_origins))
        .with_state(service)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    if allowed_origins.iter().any(|origin| origin == "*") {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid allowed origin");
                None
            }
        })
        .collect();
    cors.allow_origin(origins)
}

/// Grant request handler
pub async fn request_funds_handler(
    State(service): State<Arc<FaucetService>>,
    headers: HeaderMap,
    request: Result<Json<GrantRequest>, JsonRejection>,
) -> FaucetResult<Json<GrantResult>> {
    let Json(request) = request.map_err(|rejection| FaucetError::InvalidArgument(rejection.body_text()))?;
    let ctx = RequestContext::from_headers(&headers);
    let result = service.handle_grant_request(&ctx, request).await?;
    Ok(Json(result))
}

/// Status handler
pub async fn status_handler(State(service): State<Arc<FaucetService>>) -> FaucetResult<Json<FaucetStatus>> {
    Ok(Json(service.get_status().await?))
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}
