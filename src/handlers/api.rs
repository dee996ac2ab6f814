//! Demo API served behind the security middleware chain.
//!
//! # Endpoints
//!
//! - `GET /v0/status` - Active security policy
//! - `POST /v0/echo` - Returns the JSON document it was sent

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use tracing::instrument;

use crate::config::Config;
use crate::error::AppResult;

/// Security policy currently applied to `/v0` routes.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub basic_auth: bool,
    pub force_https: bool,
    pub mutual_tls: bool,
    pub log_route_prefix: String,
}

/// Echo response body.
#[derive(Debug, Serialize)]
pub struct EchoResponse {
    pub received: Value,
}

/// Report which protections are enabled. Never includes credentials.
#[instrument(skip(config))]
pub async fn status(State(config): State<Arc<Config>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        basic_auth: config.auth_enabled(),
        force_https: config.force_https,
        mutual_tls: config.tls_enabled(),
        log_route_prefix: config.log_route_prefix.clone(),
    })
}

/// Echo a JSON request body back to the caller.
///
/// # Errors
///
/// Returns `AppError::SerializationError` (400) when the body is not JSON.
#[instrument(skip(body), fields(body_len = body.len()))]
pub async fn echo(body: Bytes) -> AppResult<Json<EchoResponse>> {
    let received: Value = serde_json::from_slice(&body)?;
    Ok(Json(EchoResponse { received }))
}
