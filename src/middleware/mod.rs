//! HTTP middleware for authentication, protocol enforcement, audit logging
//! and crash isolation.
//!
//! This module provides the middleware capability and its concrete
//! implementations:
//!
//! - **Chain**: Ordered composition, first element outermost
//! - **Basic Auth**: HTTP basic authentication with constant-time comparison
//! - **HTTPS Enforcer**: Redirects plain HTTP (per `X-Forwarded-Proto`) to HTTPS
//! - **Request Logging**: Audit log of request/response with credential redaction
//! - **Panic Recovery**: Converts handler panics into opaque 500 responses
//!
//! # Architecture
//!
//! ```text
//! Request → Panic Recovery → Logging → HTTPS Enforcer → Basic Auth → Handler
//!                ↓              ↓            ↓               ↓
//!          500 on panic    audit record   302 Found     401 Unauthorized
//! ```
//!
//! Every middleware is a tower [`Layer`](tower::Layer) for static composition
//! and implements [`Middleware`] for dynamic composition through a [`Chain`].
//!
//! # Security Considerations
//!
//! - Credential comparison never short-circuits on length or content
//! - `Authorization` headers are removed from every logged request
//! - Panic payloads are logged server-side only, clients see a bare 500
//! - Middleware configuration is immutable after construction

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use tower::util::BoxCloneSyncService;

pub mod basic_auth;
pub mod chain;
pub mod https_enforcer;
pub mod logging;
pub mod panic_recovery;
pub mod secure_compare;

#[cfg(test)]
pub(crate) mod test_support;

pub use basic_auth::{BasicAuth, BasicCredentials, WWW_AUTHENTICATE_CHALLENGE};
pub use chain::{Chain, ChainBuilder};
pub use https_enforcer::{HttpsEnforcer, X_FORWARDED_PROTO};
pub use logging::RequestLogging;
pub use panic_recovery::PanicRecovery;
pub use secure_compare::secure_compare;

/// A type-erased request handler.
///
/// Cloneable and shareable across threads so one wrapped handler can serve
/// any number of concurrent requests. Handlers never fail at the service
/// level: every outcome, including rejections, is a response.
pub type Handler = BoxCloneSyncService<Request<Body>, Response<Body>, Infallible>;

/// A unit that wraps a [`Handler`] to add behavior before and after it runs.
///
/// Implementations hold only configuration fixed at construction, so a single
/// instance can wrap handlers for any number of requests.
pub trait Middleware: Send + Sync {
    /// Produce a new handler that runs this middleware around `next`.
    fn wrap(&self, next: Handler) -> Handler;
}

impl<M> Middleware for Arc<M>
where
    M: Middleware + ?Sized,
{
    fn wrap(&self, next: Handler) -> Handler {
        (**self).wrap(next)
    }
}

/// Build a [`Handler`] from an async function.
///
/// # Example
///
/// ```rust
/// use axum::body::Body;
/// use axum::http::Response;
/// use hardened_http::middleware::handler_fn;
///
/// let handler = handler_fn(|_req| async { Response::new(Body::from("ok")) });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(Request<Body>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Response<Body>> + Send + 'static,
{
    Handler::new(tower::service_fn(move |req| {
        let response = f(req);
        async move { Ok::<_, Infallible>(response.await) }
    }))
}
