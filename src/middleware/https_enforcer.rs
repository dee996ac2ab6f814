//! HTTPS enforcement for services behind a TLS-terminating proxy.
//!
//! The connection this service sees may be plain TCP even when the client
//! spoke TLS to the proxy, so the transport is judged solely by the
//! `X-Forwarded-Proto` header set by the proxy.
//!
//! | `X-Forwarded-Proto` | `force_https` | Outcome                       |
//! |---------------------|---------------|-------------------------------|
//! | `https`             | any           | passthrough                   |
//! | anything else       | `false`       | passthrough                   |
//! | anything else       | `true`        | `302 Found` to `https://...`  |

use std::mem;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::header::{self, HeaderValue};
use axum::http::{Request, Response, StatusCode};
use axum::response::IntoResponse;
use tower::{Layer, Service};
use tracing::{debug, warn};

use super::{Handler, Middleware};

/// Header carrying the client-facing protocol, set by the proxy.
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// HTTPS enforcement layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpsEnforcer {
    force_https: bool,
}

impl HttpsEnforcer {
    /// Create an enforcer; with `force_https == false` every request passes.
    pub fn new(force_https: bool) -> Self {
        Self { force_https }
    }
}

impl<S> Layer<S> for HttpsEnforcer {
    type Service = HttpsEnforcerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        HttpsEnforcerService {
            inner,
            force_https: self.force_https,
        }
    }
}

impl Middleware for HttpsEnforcer {
    fn wrap(&self, next: Handler) -> Handler {
        Handler::new(self.layer(next))
    }
}

/// HTTPS enforcement service wrapper.
#[derive(Clone)]
pub struct HttpsEnforcerService<S> {
    inner: S,
    force_https: bool,
}

impl<S> Service<Request<Body>> for HttpsEnforcerService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = mem::replace(&mut self.inner, clone);

        if !self.force_https || forwarded_over_https(&req) {
            return Box::pin(inner.call(req));
        }

        let response = match https_location(&req) {
            Some(location) => {
                debug!(location = ?location, "Redirecting plain HTTP request to HTTPS");
                (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
            }
            None => {
                warn!(
                    path = %req.uri().path(),
                    "Cannot redirect to HTTPS: request has no host"
                );
                StatusCode::BAD_REQUEST.into_response()
            }
        };

        Box::pin(async { Ok(response) })
    }
}

/// Whether the proxy reported that the client connected over HTTPS.
fn forwarded_over_https<B>(req: &Request<B>) -> bool {
    req.headers()
        .get(X_FORWARDED_PROTO)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|proto| proto.trim().eq_ignore_ascii_case("https"))
}

/// Build the redirect target: the request URL with its scheme set to `https`.
///
/// Host and port come from the request URI's authority (absolute-form
/// requests) or else the `Host` header; path and query are kept verbatim.
fn https_location<B>(req: &Request<B>) -> Option<HeaderValue> {
    let host = match req.uri().authority() {
        // Drop any userinfo, keep host[:port] as sent.
        Some(authority) => authority.as_str().rsplit('@').next()?.to_string(),
        None => req.headers().get(header::HOST)?.to_str().ok()?.to_string(),
    };
    if host.is_empty() {
        return None;
    }

    let path_and_query = req
        .uri()
        .path_and_query()
        .map_or("/", |pq| pq.as_str());

    HeaderValue::try_from(format!("https://{host}{path_and_query}")).ok()
}
