//! Ordered middleware composition.
//!
//! A [`Chain`] holding `[m1, m2, ..., mn]` wraps a handler `h` as
//! `m1.wrap(m2.wrap(... mn.wrap(h)))`: the first middleware is outermost,
//! it sees the request first and the response last.

use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use tower::{Layer, Service};

use super::{Handler, Middleware};

/// An immutable, ordered sequence of middleware.
///
/// Cloning a chain is cheap; the middleware list is shared.
#[derive(Clone)]
pub struct Chain {
    middleware: Arc<[Arc<dyn Middleware>]>,
}

impl Chain {
    /// Create a chain from middleware listed outermost first.
    pub fn new<I>(middleware: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Middleware>>,
    {
        Self {
            middleware: middleware.into_iter().collect(),
        }
    }

    /// Start building a chain one middleware at a time.
    pub fn builder() -> ChainBuilder {
        ChainBuilder::default()
    }

    /// Number of middleware in the chain.
    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    /// Whether the chain wraps nothing (wrapping returns the handler as-is).
    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }
}

impl Default for Chain {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("len", &self.middleware.len())
            .finish()
    }
}

impl FromIterator<Arc<dyn Middleware>> for Chain {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Middleware>>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl Middleware for Chain {
    fn wrap(&self, next: Handler) -> Handler {
        // Innermost first: mn wraps the terminal handler, m1 wraps last.
        self.middleware
            .iter()
            .rev()
            .fold(next, |handler, middleware| middleware.wrap(handler))
    }
}

impl<S> Layer<S> for Chain
where
    S: Service<Request<Body>, Response = Response<Body>, Error = Infallible>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
{
    type Service = Handler;

    fn layer(&self, inner: S) -> Self::Service {
        self.wrap(Handler::new(inner))
    }
}

/// Builder for [`Chain`], outermost middleware added first.
#[derive(Default)]
pub struct ChainBuilder {
    middleware: Vec<Arc<dyn Middleware>>,
}

impl ChainBuilder {
    /// Append a middleware inside the ones added so far.
    #[must_use]
    pub fn with<M>(mut self, middleware: M) -> Self
    where
        M: Middleware + 'static,
    {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Freeze the sequence into a [`Chain`].
    pub fn build(self) -> Chain {
        Chain::new(self.middleware)
    }
}
