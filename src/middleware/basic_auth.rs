//! HTTP basic authentication middleware.
//!
//! # Security Features
//!
//! - **Constant-time comparison**: Username and password are both compared in
//!   full with [`secure_compare`], even when the username already mismatched
//! - **No downstream exposure**: Rejected requests never reach the wrapped handler
//! - **Standard challenge**: Failures answer `401` with
//!   `WWW-Authenticate: Basic realm="Authorization Required"`
//!
//! # Usage
//!
//! ```rust
//! use hardened_http::middleware::BasicAuth;
//!
//! let auth = BasicAuth::new("admin", "s3cret");
//! ```
//!
//! Clients then authenticate with the standard header:
//!
//! ```bash
//! curl -u admin:s3cret http://localhost:3000/v0/status
//! ```

use std::fmt;
use std::mem;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::header::{self, HeaderMap};
use axum::http::{Request, Response, StatusCode};
use axum::response::IntoResponse;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tower::{Layer, Service};
use tracing::{debug, warn};

use super::secure_compare::secure_compare;
use super::{Handler, Middleware};

/// Challenge sent with every `401` response.
pub const WWW_AUTHENTICATE_CHALLENGE: &str = r#"Basic realm="Authorization Required""#;

/// Body of the `401` response.
const UNAUTHORIZED_BODY: &str = "Not Authorized\n";

/// Authentication scheme token, matched case-insensitively.
const BASIC_SCHEME: &str = "Basic";

/// Credentials decoded from an `Authorization: Basic ...` header.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl BasicCredentials {
    /// Check both fields against `expected`, never short-circuiting between them.
    fn matches(&self, expected: &BasicCredentials) -> bool {
        let username_ok = secure_compare(self.username.as_bytes(), expected.username.as_bytes());
        let password_ok = secure_compare(self.password.as_bytes(), expected.password.as_bytes());
        username_ok & password_ok
    }
}

/// Basic authentication layer.
///
/// Holds the one accepted username/password pair. Requests without a valid
/// `Authorization` header are answered with `401 Unauthorized` and never
/// reach the wrapped handler.
#[derive(Clone)]
pub struct BasicAuth {
    expected: Arc<BasicCredentials>,
}

impl BasicAuth {
    /// Create a basic auth layer accepting exactly `username` / `password`.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            expected: Arc::new(BasicCredentials {
                username: username.into(),
                password: password.into(),
            }),
        }
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("expected", &self.expected)
            .finish()
    }
}

impl<S> Layer<S> for BasicAuth {
    type Service = BasicAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        BasicAuthService {
            inner,
            expected: self.expected.clone(),
        }
    }
}

impl Middleware for BasicAuth {
    fn wrap(&self, next: Handler) -> Handler {
        Handler::new(self.layer(next))
    }
}

/// Basic authentication service wrapper.
#[derive(Clone)]
pub struct BasicAuthService<S> {
    inner: S,
    expected: Arc<BasicCredentials>,
}

impl<S> Service<Request<Body>> for BasicAuthService<S>
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
        // Drive the instance that was polled ready; keep a fresh clone for the next call.
        let clone = self.inner.clone();
        let mut inner = mem::replace(&mut self.inner, clone);

        let authorized = match extract_basic_credentials(req.headers()) {
            Some(supplied) => supplied.matches(&self.expected),
            None => {
                debug!(path = %req.uri().path(), "Missing basic credentials");
                false
            }
        };

        if !authorized {
            warn!(path = %req.uri().path(), "Basic authentication failed");
            return Box::pin(async { Ok(unauthorized_response()) });
        }

        Box::pin(inner.call(req))
    }
}

/// Extract basic credentials from the request's `Authorization` header.
fn extract_basic_credentials(headers: &HeaderMap) -> Option<BasicCredentials> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    parse_basic_authorization(value)
}

/// Parse an `Authorization` header value using the basic scheme.
///
/// The scheme token is matched case-insensitively; the payload must be
/// standard base64 of `username:password` in UTF-8. The password may itself
/// contain `:`. Returns `None` for anything else.
pub fn parse_basic_authorization(value: &str) -> Option<BasicCredentials> {
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case(BASIC_SCHEME) {
        return None;
    }

    let decoded = STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;

    Some(BasicCredentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

/// Build an unauthorized (401) response.
fn unauthorized_response() -> Response<Body> {
    (
        StatusCode::UNAUTHORIZED,
        [
            (header::WWW_AUTHENTICATE, WWW_AUTHENTICATE_CHALLENGE),
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        ],
        UNAUTHORIZED_BODY,
    )
        .into_response()
}
