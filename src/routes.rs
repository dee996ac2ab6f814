//! Application routing configuration with middleware stack.
//!
//! # Middleware Stack (applied in order)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │     Tracing      │ ← HTTP request/response spans (all routes)
//! └────────┬─────────┘
//!          │
//!          ├──── /health ──▶ health_check
//!          ▼
//! ┌──────────────────┐
//! │  Panic Recovery  │ ← 500 if a handler panics
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │ Request Logging  │ ← audit record for URLs under LOG_ROUTE_PREFIX
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │  HTTPS Enforcer  │ ← 302 to https:// when FORCE_HTTPS is set
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │    Basic Auth    │ ← 401 if invalid (only when credentials configured)
//! └────────┬─────────┘
//!          │
//!          ▼
//!      /v0 routes
//! ```
//!
//! # Route Groups
//!
//! - `/health` - Liveness probe, outside the chain
//! - `/v0/status`, `/v0/echo` - Demo API behind the chain

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::handlers;
use crate::middleware::{
    BasicAuth, Chain, Handler, HttpsEnforcer, Middleware, PanicRecovery, RequestLogging,
};

/// Build the security middleware chain for the given configuration.
///
/// Panic recovery is always outermost so a faulting handler cannot take
/// down the connection serving it.
pub fn build_chain(config: &Config) -> Chain {
    let mut builder = Chain::builder()
        .with(PanicRecovery::new(&config.log_component))
        .with(
            RequestLogging::new(&config.log_component, &config.log_route_prefix)
                .with_max_body_size(config.max_logged_body_size),
        )
        .with(HttpsEnforcer::new(config.force_https));

    info!(
        prefix = %config.log_route_prefix,
        max_body_size = config.max_logged_body_size,
        force_https = config.force_https,
        "Request logging and HTTPS enforcement configured"
    );

    match (&config.basic_auth_username, &config.basic_auth_password) {
        (Some(username), Some(password)) => {
            info!("Basic authentication enabled");
            builder = builder.with(BasicAuth::new(username, password));
        }
        _ => info!("Basic authentication disabled (no BASIC_AUTH_USERNAME set)"),
    }

    builder.build()
}

/// Build the application router with all routes and middleware configured.
///
/// Everything except `/health` is served through [`build_chain`].
pub fn build_router(config: &Config) -> Router {
    let api = Router::new()
        .route("/v0/status", get(handlers::status))
        .route("/v0/echo", post(handlers::echo))
        .with_state(Arc::new(config.clone()));

    let protected = build_chain(config).wrap(Handler::new(api));

    Router::new()
        .route("/health", get(handlers::health_check))
        .fallback_service(protected)
        .layer(TraceLayer::new_for_http())
}
