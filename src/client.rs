//! Pre-configured outbound HTTP clients.
//!
//! [`ClientFactory`] hands out clients that all share one [`ClientSettings`]
//! value: a bounded overall timeout, a connect timeout and TCP keep-alive.
//! TLS clients take their policy from a [`TlsConfig`] unchanged, and
//! [`UnixClient`] speaks HTTP/1.1 over a Unix domain socket.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::http::{Request, Response, Uri};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::rt::{Read, ReadBufCursor, Write};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::{Connected, Connection};
use hyper_util::rt::{TokioExecutor, TokioIo};
use tokio::net::UnixStream;
use tower::Service;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::tls::TlsConfig;

/// Timeouts shared by every client a [`ClientFactory`] builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientSettings {
    /// Bound on a whole request, from connect to the end of the response body.
    pub timeout: Duration,
    /// Bound on establishing the connection.
    pub connect_timeout: Duration,
    /// TCP keep-alive probe interval for pooled connections.
    pub tcp_keepalive: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(30),
            tcp_keepalive: Duration::from_secs(30),
        }
    }
}

/// Builds HTTP clients from one explicit [`ClientSettings`] value.
#[derive(Debug, Clone, Default)]
pub struct ClientFactory {
    settings: ClientSettings,
}

impl ClientFactory {
    pub fn new(settings: ClientSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Client bounded by the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Client` if the client cannot be built.
    pub fn client(&self) -> AppResult<reqwest::Client> {
        self.custom_timeout_client(self.settings.timeout)
    }

    /// Client bounded by `timeout` instead of the configured one.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Client` if the client cannot be built.
    pub fn custom_timeout_client(&self, timeout: Duration) -> AppResult<reqwest::Client> {
        Ok(self.base_builder().timeout(timeout).build()?)
    }

    /// Client without an overall timeout, for long-lived response streams.
    ///
    /// Connecting is still bounded by the connect timeout.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Client` if the client cannot be built.
    pub fn streaming_client(&self) -> AppResult<reqwest::Client> {
        Ok(self.base_builder().build()?)
    }

    /// Client presenting the identity and trusting the pool of `tls`.
    ///
    /// The rustls configuration is used as built, so the protocol and
    /// cipher policy of [`TlsConfig`] carries over unchanged.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Client` if the client cannot be built.
    pub fn tls_client(&self, tls: &TlsConfig) -> AppResult<reqwest::Client> {
        let rustls_config = tls.client_config().as_ref().clone();
        Ok(self
            .base_builder()
            .timeout(self.settings.timeout)
            .use_preconfigured_tls(rustls_config)
            .build()?)
    }

    /// Client that dials `socket_path` for every request, whatever the URL host.
    pub fn unix_client(&self, socket_path: impl Into<PathBuf>) -> UnixClient {
        let path: PathBuf = socket_path.into();
        let connector = UnixConnector {
            path: Arc::from(path),
        };
        UnixClient {
            inner: Client::builder(TokioExecutor::new()).build(connector.clone()),
            socket: connector.path,
            timeout: self.settings.timeout,
        }
    }

    fn base_builder(&self) -> reqwest::ClientBuilder {
        reqwest::Client::builder()
            .connect_timeout(self.settings.connect_timeout)
            .tcp_keepalive(self.settings.tcp_keepalive)
    }
}

/// HTTP/1.1 client over a Unix domain socket.
///
/// URLs still need a scheme and host (`http://unix/_ping`); only the path
/// and query reach the server.
#[derive(Clone)]
pub struct UnixClient {
    inner: Client<UnixConnector, Full<Bytes>>,
    socket: Arc<Path>,
    timeout: Duration,
}

impl UnixClient {
    pub fn socket_path(&self) -> &Path {
        &self.socket
    }

    /// Send `request` and wait for the response head.
    ///
    /// # Errors
    ///
    /// `AppError::OperationTimeout` when no response arrives within the
    /// configured timeout, `AppError::UnixTransport` when the socket cannot
    /// be reached or the exchange fails.
    pub async fn request(&self, request: Request<Full<Bytes>>) -> AppResult<Response<Incoming>> {
        let uri = request.uri().clone();
        debug!(socket = %self.socket.display(), uri = %uri, "Sending request over Unix socket");

        match tokio::time::timeout(self.timeout, self.inner.request(request)).await {
            Ok(response) => Ok(response?),
            Err(_) => Err(AppError::OperationTimeout(format!(
                "{uri} via {} after {:?}",
                self.socket.display(),
                self.timeout
            ))),
        }
    }

    /// Send a `GET` for `uri`.
    ///
    /// # Errors
    ///
    /// As [`UnixClient::request`], plus `AppError::InvalidRequest` for a malformed URI.
    pub async fn get(&self, uri: &str) -> AppResult<Response<Incoming>> {
        let request = Request::get(uri).body(Full::new(Bytes::new()))?;
        self.request(request).await
    }
}

impl std::fmt::Debug for UnixClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnixClient")
            .field("socket", &self.socket)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Connector that ignores the destination URI and dials a fixed socket.
#[derive(Debug, Clone)]
pub struct UnixConnector {
    path: Arc<Path>,
}

impl Service<Uri> for UnixConnector {
    type Response = UnixConnection;
    type Error = io::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _dst: Uri) -> Self::Future {
        let path = self.path.clone();
        Box::pin(async move {
            let stream = UnixStream::connect(&*path).await?;
            Ok(UnixConnection(TokioIo::new(stream)))
        })
    }
}

/// A connected Unix stream, adapted to hyper's I/O traits.
#[derive(Debug)]
pub struct UnixConnection(TokioIo<UnixStream>);

impl Connection for UnixConnection {
    fn connected(&self) -> Connected {
        Connected::new()
    }
}

impl Read for UnixConnection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().0).poll_read(cx, buf)
    }
}

impl Write for UnixConnection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().0).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().0).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().0).poll_shutdown(cx)
    }
}
