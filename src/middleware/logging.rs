//! Request/response audit logging with credential redaction.
//!
//! For every request whose target starts with the configured route prefix,
//! one `info` event is emitted once the response body has been delivered,
//! carrying two JSON fields:
//!
//! - `request`: headers (credentials removed), body, URL, host, remote address
//! - `response`: headers, body, status code
//!
//! The prefix is matched against the origin-form target (path and query), so
//! HTTP/2 requests, whose URI is absolute, are selected the same way as
//! HTTP/1.1 ones. Requests outside the prefix pass straight through: no
//! buffering, no event.
//!
//! # Redaction
//!
//! The logged header map is a copy. `Authorization` and `Proxy-Authorization`
//! are removed from the copy (not blanked); the request forwarded to the
//! wrapped handler keeps them. Header names are case-insensitive, so every
//! casing a client might send is covered.
//!
//! # Body limits
//!
//! The request body is read in full before the wrapped handler runs, up to
//! `max_body_size` bytes. A larger body is answered with
//! `413 Payload Too Large` and never reaches the handler.
//!
//! The response body is not buffered. Frames are forwarded as they arrive and
//! copied into the record until `max_body_size` bytes are held; anything
//! beyond is delivered but not logged, and the record is marked `truncated`.
//! A failing response body is passed on to the client as an error.

use std::collections::BTreeMap;
use std::mem;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use axum::BoxError;
use axum::body::{Body, Bytes};
use axum::extract::ConnectInfo;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::{Request, Response, StatusCode, Uri, request};
use axum::response::IntoResponse;
use bytes::BytesMut;
use http_body::{Body as HttpBody, Frame, SizeHint};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use pin_project_lite::pin_project;
use serde::Serialize;
use tower::{Layer, Service};
use tracing::{error, info, warn};

use super::{Handler, Middleware};

/// Headers never written to the log.
static REDACTED_HEADERS: [HeaderName; 2] = [header::AUTHORIZATION, header::PROXY_AUTHORIZATION];

/// Remote address recorded when the server did not attach connection info.
pub const UNKNOWN_REMOTE_ADDR: &str = "unknown";

/// Default cap on request bodies read and response bytes logged (10 MiB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

const PAYLOAD_TOO_LARGE_BODY: &str = "Payload Too Large\n";

/// Request logging layer.
///
/// # Example
///
/// ```rust
/// use hardened_http::middleware::RequestLogging;
///
/// // Audit everything under /v0, tagged with the emitting component.
/// let logging = RequestLogging::new("backup-api", "/v0").with_max_body_size(64 * 1024);
/// assert_eq!(logging.route_prefix(), "/v0");
/// assert_eq!(logging.max_body_size(), 64 * 1024);
/// ```
#[derive(Debug, Clone)]
pub struct RequestLogging {
    component: Arc<str>,
    route_prefix: Arc<str>,
    max_body_size: usize,
}

impl RequestLogging {
    /// Create a logging layer for requests whose target starts with `route_prefix`.
    ///
    /// `component` is attached to every event to identify the emitting service.
    pub fn new(component: impl Into<String>, route_prefix: impl Into<String>) -> Self {
        Self {
            component: Arc::from(component.into()),
            route_prefix: Arc::from(route_prefix.into()),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }

    /// Limit request bodies read and response bytes logged to `max_body_size`.
    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    /// The URL prefix selecting which requests are logged.
    pub fn route_prefix(&self) -> &str {
        &self.route_prefix
    }

    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }
}

impl<S> Layer<S> for RequestLogging {
    type Service = RequestLoggingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLoggingService {
            inner,
            component: self.component.clone(),
            route_prefix: self.route_prefix.clone(),
            max_body_size: self.max_body_size,
        }
    }
}

impl Middleware for RequestLogging {
    fn wrap(&self, next: Handler) -> Handler {
        Handler::new(self.layer(next))
    }
}

/// Request logging service wrapper.
#[derive(Clone)]
pub struct RequestLoggingService<S> {
    inner: S,
    component: Arc<str>,
    route_prefix: Arc<str>,
    max_body_size: usize,
}

impl<S> Service<Request<Body>> for RequestLoggingService<S>
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

        let url = request_target(req.uri()).to_string();
        if !url.starts_with(&*self.route_prefix) {
            return Box::pin(inner.call(req));
        }

        let component = self.component.clone();
        let limit = self.max_body_size;

        Box::pin(async move {
            let (parts, body) = req.into_parts();

            let request_body = match read_request_body(body, limit).await {
                Ok(bytes) => bytes,
                Err(BodyError::TooLarge) => {
                    warn!(
                        component = %component,
                        url = %url,
                        limit,
                        "Request body exceeds size limit"
                    );
                    let mut record = RequestRecord::capture(&parts, &Bytes::new(), url);
                    record.truncated = true;
                    let response =
                        (StatusCode::PAYLOAD_TOO_LARGE, PAYLOAD_TOO_LARGE_BODY).into_response();
                    return Ok(audit_response(component, record, response, limit));
                }
                Err(BodyError::Read(e)) => {
                    error!(component = %component, error = %e, "Could not read request body");
                    Bytes::new()
                }
            };
            let record = RequestRecord::capture(&parts, &request_body, url);

            let response = inner
                .call(Request::from_parts(parts, Body::from(request_body)))
                .await?;

            Ok(audit_response(component, record, response, limit))
        })
    }
}

/// The origin-form target of `uri`: path and query, without scheme or authority.
fn request_target(uri: &Uri) -> &str {
    uri.path_and_query().map_or("/", |pq| pq.as_str())
}

enum BodyError {
    TooLarge,
    Read(BoxError),
}

/// Read the whole request body, refusing anything over `limit` bytes.
async fn read_request_body(body: Body, limit: usize) -> Result<Bytes, BodyError> {
    // Declared length already over the limit: reject without reading.
    if body.size_hint().lower() > limit as u64 {
        return Err(BodyError::TooLarge);
    }

    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => Err(BodyError::TooLarge),
        Err(e) => Err(BodyError::Read(e)),
    }
}

/// Attach the audit record to `response`; it is emitted when the body ends.
///
/// `Content-Length` is filled in when the body length is known up front.
fn audit_response(
    component: Arc<str>,
    request: RequestRecord,
    response: Response<Body>,
    limit: usize,
) -> Response<Body> {
    let (mut parts, body) = response.into_parts();

    if !parts.headers.contains_key(header::CONTENT_LENGTH) {
        if let Some(len) = body.size_hint().exact().filter(|len| *len > 0) {
            parts
                .headers
                .insert(header::CONTENT_LENGTH, HeaderValue::from(len));
        }
    }

    let record = PendingRecord {
        component,
        request,
        header: header_map(&parts.headers),
        status_code: parts.status.as_u16(),
        body: BytesMut::new(),
        limit,
        truncated: false,
    };

    Response::from_parts(
        parts,
        Body::new(AuditedBody {
            inner: body,
            record: Some(record),
        }),
    )
}

pin_project! {
    /// Response body that copies frames into the audit record as they pass.
    struct AuditedBody {
        #[pin]
        inner: Body,
        record: Option<PendingRecord>,
    }
}

impl HttpBody for AuditedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        let polled = ready!(this.inner.poll_frame(cx));

        // Taking the record out drops it, which emits the event.
        match &polled {
            Some(Ok(frame)) => {
                if let (Some(record), Some(data)) = (this.record.as_mut(), frame.data_ref()) {
                    record.append(data);
                }
            }
            Some(Err(e)) => {
                if let Some(record) = this.record.take() {
                    error!(
                        component = %record.component,
                        error = %e,
                        "Could not read response body"
                    );
                }
            }
            None => drop(this.record.take()),
        }

        Poll::Ready(polled)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// Audit record waiting for the response body to finish.
///
/// Emitted exactly once, on drop: after the last frame, after a body error,
/// or when the client goes away before the body was fully sent.
struct PendingRecord {
    component: Arc<str>,
    request: RequestRecord,
    header: BTreeMap<String, Vec<String>>,
    status_code: u16,
    body: BytesMut,
    limit: usize,
    truncated: bool,
}

impl PendingRecord {
    fn append(&mut self, data: &Bytes) {
        let room = self.limit.saturating_sub(self.body.len());
        if data.len() > room {
            self.truncated = true;
        }
        if let Some(kept) = data.get(..data.len().min(room)) {
            self.body.extend_from_slice(kept);
        }
    }
}

impl Drop for PendingRecord {
    fn drop(&mut self) {
        let response = ResponseRecord {
            header: mem::take(&mut self.header),
            body: String::from_utf8_lossy(&self.body).into_owned(),
            status_code: self.status_code,
            truncated: self.truncated,
        };

        info!(
            component = %self.component,
            request = %to_json(&self.request),
            response = %to_json(&response),
            "Request served"
        );
    }
}

/// Redacted snapshot of the inbound request.
#[derive(Debug, Serialize)]
struct RequestRecord {
    header: BTreeMap<String, Vec<String>>,
    body: String,
    url: String,
    host: String,
    remote_addr: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    truncated: bool,
}

impl RequestRecord {
    fn capture(parts: &request::Parts, body: &Bytes, url: String) -> Self {
        let mut headers = parts.headers.clone();
        for name in &REDACTED_HEADERS {
            headers.remove(name);
        }

        let host = parts
            .headers
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .or_else(|| parts.uri.authority().map(|a| a.to_string()))
            .unwrap_or_default();

        let remote_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map_or_else(|| UNKNOWN_REMOTE_ADDR.to_string(), |info| info.0.to_string());

        Self {
            header: header_map(&headers),
            body: String::from_utf8_lossy(body).into_owned(),
            url,
            host,
            remote_addr,
            truncated: false,
        }
    }
}

/// Snapshot of the outbound response.
#[derive(Debug, Serialize)]
struct ResponseRecord {
    header: BTreeMap<String, Vec<String>>,
    body: String,
    status_code: u16,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    truncated: bool,
}

/// Group header values by name for serialization.
fn header_map(headers: &HeaderMap) -> BTreeMap<String, Vec<String>> {
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers {
        map.entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    map
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!("<unserializable: {e}>"))
}
