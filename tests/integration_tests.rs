//! End-to-end tests: the application router served on an ephemeral port,
//! exercised with clients from `ClientFactory`.
//!
//! Run with: `cargo test --test integration_tests`
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tokio::net::{TcpListener, UnixListener};

use hardened_http::{AppError, ClientFactory, ClientSettings, Config, TlsConfig, build_router};

/// Test fixture that runs an app server in the background.
struct TestFixture {
    base_url: String,
    factory: ClientFactory,
}

impl TestFixture {
    /// Serve `app` on an ephemeral local port.
    async fn serve(app: Router) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to ephemeral port");
        let addr = listener.local_addr().expect("Failed to get local address");

        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .expect("Server failed");
        });

        Self {
            base_url: format!("http://{addr}"),
            factory: ClientFactory::new(ClientSettings {
                timeout: Duration::from_secs(10),
                ..ClientSettings::default()
            }),
        }
    }

    /// Serve the application router built from `config`.
    async fn new(config: Config) -> Self {
        Self::serve(build_router(&config)).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn basic(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

fn secured_config() -> Config {
    Config {
        basic_auth_username: Some("admin".to_string()),
        basic_auth_password: Some("s3cret".to_string()),
        ..Config::default()
    }
}

// =============================================================================
// Application Server
// =============================================================================

#[tokio::test]
async fn test_health_bypasses_authentication() {
    let fixture = TestFixture::new(secured_config()).await;
    let client = fixture.factory.client().unwrap();

    let response = client.get(fixture.url("/health")).send().await.unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_api_requires_credentials() {
    let fixture = TestFixture::new(secured_config()).await;
    let client = fixture.factory.client().unwrap();

    let response = client.get(fixture.url("/v0/status")).send().await.unwrap();
    assert_eq!(response.status(), 401);
    assert_eq!(
        response.headers()["www-authenticate"],
        r#"Basic realm="Authorization Required""#
    );

    let response = client
        .get(fixture.url("/v0/status"))
        .header("authorization", basic("admin", "wrong"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    let response = client
        .get(fixture.url("/v0/status"))
        .header("authorization", basic("admin", "s3cret"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["basic_auth"], true);
    assert_eq!(body["force_https"], false);
}

#[tokio::test]
async fn test_echo_round_trip() {
    let fixture = TestFixture::new(Config::default()).await;
    let client = fixture.factory.client().unwrap();

    let response = client
        .post(fixture.url("/v0/echo"))
        .json(&json!({"hello": "world"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["received"]["hello"], "world");
}

#[tokio::test]
async fn test_echo_rejects_malformed_json() {
    let fixture = TestFixture::new(Config::default()).await;
    let client = fixture.factory.client().unwrap();

    let response = client
        .post(fixture.url("/v0/echo"))
        .body("{not json")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "serialization_error");
}

#[tokio::test]
async fn test_force_https_redirects_before_auth() {
    let fixture = TestFixture::new(Config {
        force_https: true,
        ..secured_config()
    })
    .await;
    // Inspect the redirect instead of following it.
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    let response = client
        .get(fixture.url("/v0/status?verbose=1"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 302);
    let location = response.headers()["location"].to_str().unwrap();
    assert!(location.starts_with("https://127.0.0.1:"));
    assert!(location.ends_with("/v0/status?verbose=1"));

    let response = client
        .get(fixture.url("/v0/status"))
        .header("x-forwarded-proto", "https")
        .header("authorization", basic("admin", "s3cret"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

// =============================================================================
// Client Factory
// =============================================================================

fn slow_router() -> Router {
    Router::new()
        .route("/_ping", get(|| async { "pong" }))
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        )
}

#[tokio::test]
async fn test_custom_timeout_client_times_out() {
    let fixture = TestFixture::serve(slow_router()).await;
    let client = fixture
        .factory
        .custom_timeout_client(Duration::from_millis(100))
        .unwrap();

    let err = client.get(fixture.url("/slow")).send().await.unwrap_err();
    assert!(err.is_timeout());

    let response = client.get(fixture.url("/_ping")).send().await.unwrap();
    assert_eq!(response.text().await.unwrap(), "pong");
}

#[tokio::test]
async fn test_streaming_client_has_no_overall_timeout() {
    let fixture = TestFixture::serve(Router::new().route(
        "/stream",
        get(|| async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            "done"
        }),
    ))
    .await;
    let factory = ClientFactory::new(ClientSettings {
        timeout: Duration::from_millis(100),
        ..ClientSettings::default()
    });

    let response = factory
        .streaming_client()
        .unwrap()
        .get(fixture.url("/stream"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "done");
}

/// Serve `app` on a Unix socket inside `dir`.
async fn serve_unix(dir: &tempfile::TempDir, app: Router) -> PathBuf {
    let socket = dir.path().join("app.sock");
    let listener = UnixListener::bind(&socket).unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Server failed");
    });
    socket
}

#[tokio::test]
async fn test_unix_client_requests_over_socket() {
    let dir = tempfile::tempdir().unwrap();
    let socket = serve_unix(&dir, slow_router()).await;
    let client = ClientFactory::default().unix_client(&socket);

    // The URL host is ignored; every request dials the socket.
    let response = client.get("http://unix/_ping").await.unwrap();

    assert_eq!(response.status(), 200);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"pong");
    assert_eq!(client.socket_path(), socket.as_path());
}

#[tokio::test]
async fn test_unix_client_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let socket = serve_unix(&dir, slow_router()).await;
    let client = ClientFactory::new(ClientSettings {
        timeout: Duration::from_millis(100),
        ..ClientSettings::default()
    })
    .unix_client(socket);

    let err = client.get("http://unix/slow").await.unwrap_err();
    assert!(matches!(err, AppError::OperationTimeout(_)));
}

#[test]
fn test_tls_client_uses_tls_config() {
    let dir = tempfile::tempdir().unwrap();
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    std::fs::write(dir.path().join("cert.pem"), cert.pem()).unwrap();
    std::fs::write(dir.path().join("key.pem"), key_pair.serialize_pem()).unwrap();

    let tls = TlsConfig::from_files(
        dir.path().join("cert.pem"),
        dir.path().join("key.pem"),
        dir.path().join("cert.pem"),
    )
    .unwrap();

    assert!(ClientFactory::default().tls_client(&tls).is_ok());
}
