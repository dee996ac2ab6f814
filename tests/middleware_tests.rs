//! Middleware chain behavior through the public API.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tower::ServiceExt;

use hardened_http::middleware::{
    BasicAuth, Chain, Handler, HttpsEnforcer, Middleware, PanicRecovery, RequestLogging,
    X_FORWARDED_PROTO, handler_fn,
};
use hardened_http::{Config, build_chain, build_router};

fn ok_handler() -> Handler {
    handler_fn(|_req| async { Response::new(Body::from("ok")) })
}

fn panicking_handler() -> Handler {
    handler_fn(|req: Request<Body>| async move {
        if req.uri().path() == "/v0/boom" {
            panic!("handler exploded");
        }
        Response::new(Body::from("ok"))
    })
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::HOST, "api.example.com")
        .body(Body::empty())
        .unwrap()
}

async fn body_string(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Records its name on the way in and out.
struct Named {
    name: &'static str,
    trace: Arc<Mutex<Vec<String>>>,
}

impl Middleware for Named {
    fn wrap(&self, next: Handler) -> Handler {
        let name = self.name;
        let trace = self.trace.clone();
        Handler::new(tower::service_fn(move |req: Request<Body>| {
            let next = next.clone();
            let trace = trace.clone();
            async move {
                trace.lock().unwrap().push(format!("{name} in"));
                let response = next.oneshot(req).await;
                trace.lock().unwrap().push(format!("{name} out"));
                response
            }
        }))
    }
}

#[tokio::test]
async fn test_first_middleware_is_outermost() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let chain = Chain::builder()
        .with(Named { name: "a", trace: trace.clone() })
        .with(Named { name: "b", trace: trace.clone() })
        .with(Named { name: "c", trace: trace.clone() })
        .build();

    let response = chain.wrap(ok_handler()).oneshot(get("/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        *trace.lock().unwrap(),
        vec!["a in", "b in", "c in", "c out", "b out", "a out"]
    );
}

#[tokio::test]
async fn test_panic_recovery_isolates_requests() {
    let chain = Chain::builder()
        .with(PanicRecovery::new("isolation"))
        .with(RequestLogging::new("isolation", "/v0"))
        .build();
    let handler = chain.wrap(panicking_handler());

    let mut tasks = Vec::new();
    for i in 0..16 {
        let handler = handler.clone();
        let uri = if i % 4 == 0 { "/v0/boom" } else { "/v0/fine" };
        tasks.push(tokio::spawn(async move {
            let response = handler.oneshot(get(uri)).await.unwrap();
            (uri, response.status())
        }));
    }

    for task in tasks {
        let (uri, status) = task.await.unwrap();
        if uri == "/v0/boom" {
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        } else {
            assert_eq!(status, StatusCode::OK);
        }
    }
}

#[tokio::test]
async fn test_configured_chain_rejects_before_handler() {
    let config = Config {
        basic_auth_username: Some("admin".to_string()),
        basic_auth_password: Some("secret".to_string()),
        ..Config::default()
    };
    let handler = build_chain(&config).wrap(panicking_handler());

    // Auth runs before the handler, so the panic is never reached.
    let response = handler.clone().oneshot(get("/v0/boom")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let mut request = get("/v0/boom");
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Basic {}", STANDARD.encode("admin:secret"))
            .parse()
            .unwrap(),
    );
    let response = handler.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_router_health_outside_chain() {
    let app = build_router(&Config {
        force_https: true,
        basic_auth_username: Some("admin".to_string()),
        basic_auth_password: Some("secret".to_string()),
        ..Config::default()
    });

    let response = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get("/v0/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "https://api.example.com/v0/status"
    );
}

#[tokio::test]
async fn test_router_status_behind_https_proxy() {
    let app = build_router(&Config {
        force_https: true,
        ..Config::default()
    });

    let mut request = get("/v0/status");
    request
        .headers_mut()
        .insert(X_FORWARDED_PROTO, "https".parse().unwrap());
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["force_https"], true);
    assert_eq!(body["basic_auth"], false);
    assert_eq!(body["log_route_prefix"], "/v0");
}

#[tokio::test]
async fn test_unknown_route_passes_through_chain() {
    let app = build_router(&Config::default());

    let response = app.oneshot(get("/v0/missing")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_layers_compose_statically() {
    let service = tower::ServiceBuilder::new()
        .layer(PanicRecovery::new("static"))
        .layer(HttpsEnforcer::new(false))
        .layer(BasicAuth::new("u", "p"))
        .service(ok_handler());

    let response = service.oneshot(get("/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_string(response).await, "Not Authorized\n");
}

#[tokio::test]
async fn test_router_caps_logged_request_bodies() {
    let app = build_router(&Config {
        basic_auth_username: Some("admin".to_string()),
        basic_auth_password: Some("secret".to_string()),
        max_logged_body_size: 16,
        ..Config::default()
    });

    // Oversized bodies are refused before authentication reads anything
    let request = Request::builder()
        .method("POST")
        .uri("/v0/echo")
        .header(header::HOST, "api.example.com")
        .body(Body::from(vec![b'x'; 1024]))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let request = Request::builder()
        .method("POST")
        .uri("/v0/echo")
        .header(header::HOST, "api.example.com")
        .header(
            header::AUTHORIZATION,
            format!("Basic {}", STANDARD.encode("admin:secret")),
        )
        .body(Body::from(r#"{"a":1}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["received"]["a"], 1);
}
