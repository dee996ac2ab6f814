//! # Hardened HTTP
//!
//! Security and observability policy for Axum services and their outbound
//! HTTP clients:
//!
//! - **Middleware**: a [`Middleware`](middleware::Middleware) capability,
//!   ordered [`Chain`](middleware::Chain) composition, basic authentication,
//!   HTTPS enforcement, audit logging with credential redaction, and panic
//!   recovery
//! - **TLS**: [`TlsConfig`] with a fixed protocol and cipher policy and
//!   mandatory mutual authentication
//! - **Clients**: [`ClientFactory`] for timeout, streaming, TLS and
//!   Unix-socket clients built from one explicit settings value
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Axum HTTP Server (plain or mutual TLS)         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Chain: Panic Recovery → Logging → HTTPS Enforcer → Auth    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (health, status, echo)                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hardened_http::middleware::{
//!     BasicAuth, Chain, HttpsEnforcer, Middleware, PanicRecovery, RequestLogging, handler_fn,
//! };
//! use axum::body::Body;
//! use axum::http::Response;
//!
//! let chain = Chain::builder()
//!     .with(PanicRecovery::new("api"))
//!     .with(RequestLogging::new("api", "/v0"))
//!     .with(HttpsEnforcer::new(true))
//!     .with(BasicAuth::new("admin", "secret"))
//!     .build();
//!
//! let handler = chain.wrap(handler_fn(|_req| async { Response::new(Body::from("ok")) }));
//! ```
//!
//! ## Security Configuration
//!
//! Enable basic authentication and HTTPS redirects:
//! ```bash
//! BASIC_AUTH_USERNAME=admin BASIC_AUTH_PASSWORD=secret FORCE_HTTPS=true cargo run
//! ```
//!
//! Serve mutual TLS directly:
//! ```bash
//! TLS_CERT_PATH=server.pem TLS_KEY_PATH=server.key TLS_CA_PATH=ca.pem cargo run
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod tls;

// Re-exports for convenience
pub use client::{ClientFactory, ClientSettings, UnixClient};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use routes::{build_chain, build_router};
pub use tls::{TlsConfig, TlsError};
