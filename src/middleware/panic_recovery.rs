//! Panic isolation for request handlers.
//!
//! Built on tower-http's [`CatchPanic`], which catches panics raised both
//! while the wrapped service builds its future and while that future is
//! polled. The panic is turned into a bare `500 Internal Server Error`; the
//! payload goes to the server log only.
//!
//! Place this middleware outermost so a fault in one request never reaches
//! the connection task serving it, or any other request.

use std::any::Any;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use tower::{Layer, Service};
use tower_http::catch_panic::{CatchPanic, CatchPanicLayer, ResponseForPanic};
use tracing::error;

use super::{Handler, Middleware};

/// Logged instead of the payload when a panic carries something other than a string.
const NON_STRING_PANIC: &str = "<non-string panic payload>";

/// Panic recovery layer.
#[derive(Debug, Clone)]
pub struct PanicRecovery {
    responder: LogPanic,
}

impl PanicRecovery {
    /// Create a panic recovery layer; `component` tags the error events it emits.
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            responder: LogPanic {
                component: Arc::from(component.into()),
            },
        }
    }
}

impl<S> Layer<S> for PanicRecovery {
    type Service = PanicRecoveryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PanicRecoveryService {
            inner: CatchPanicLayer::custom(self.responder.clone()).layer(inner),
        }
    }
}

impl Middleware for PanicRecovery {
    fn wrap(&self, next: Handler) -> Handler {
        Handler::new(self.layer(next))
    }
}

/// Logs the panic payload and answers with an empty 500.
#[derive(Debug, Clone)]
pub struct LogPanic {
    component: Arc<str>,
}

impl ResponseForPanic for LogPanic {
    type ResponseBody = Body;

    fn response_for_panic(&mut self, err: Box<dyn Any + Send + 'static>) -> Response<Body> {
        error!(
            component = %self.component,
            panic_info = %panic_message(err.as_ref()),
            "Panic while serving request"
        );

        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    }
}

/// Panic recovery service wrapper.
///
/// Converts the boxed body produced by [`CatchPanic`] back into an axum
/// [`Body`] so the service composes like every other middleware.
#[derive(Clone)]
pub struct PanicRecoveryService<S> {
    inner: CatchPanic<S, LogPanic>,
}

impl<S> Service<Request<Body>> for PanicRecoveryService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Send + 'static,
    S::Future: Send + 'static,
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
        let future = self.inner.call(req);
        Box::pin(async move { future.await.map(|response| response.map(Body::new)) })
    }
}

/// Extract a printable message from a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        NON_STRING_PANIC
    }
}
