//! HTTP surface tests driving the router directly.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap, Request, StatusCode};
use cmdgate_config::Config;
use cmdgate_engine::{CommandIo, CommandRegistry, CommandStatus, EngineError};
use cmdgate_server::{create_router, AppState};
use serde_json::Value;
use tower::ServiceExt;

fn app_state() -> AppState {
    let registry = CommandRegistry::with_builtins();
    registry.register("whoami", |args: &[String], io: &mut CommandIo<'_>| {
        io.output.write_all(args.join(" ").as_bytes())?;
        Ok(CommandStatus::Okay)
    });
    registry.register("pay", |_args: &[String], _io: &mut CommandIo<'_>| {
        Err(EngineError::service(402, "Payment Required", "insufficient funds"))
    });
    registry.register("getinfo", |_args: &[String], io: &mut CommandIo<'_>| {
        io.output.write_all(br#"{"height":1024}"#)?;
        Ok(CommandStatus::Okay)
    });
    AppState::new(Config::default(), Arc::new(registry))
}

struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: String,
}

impl TestResponse {
    fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

async fn send(state: &AppState, method: &str, uri: &str, cookie: Option<&str>, body: &str) -> TestResponse {
    send_bytes(state, method, uri, cookie, body.as_bytes().to_vec()).await
}

async fn send_bytes(
    state: &AppState,
    method: &str,
    uri: &str,
    cookie: Option<&str>,
    body: Vec<u8>,
) -> TestResponse {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let request = builder.body(Body::from(body)).unwrap();

    let response = create_router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    TestResponse {
        status,
        headers,
        body: String::from_utf8(bytes.to_vec()).unwrap(),
    }
}

/// Log in and return the cookie pair to send back
async fn login(state: &AppState, user: &str) -> String {
    let body = format!(r#"{{"user": "{}", "password": "pw"}}"#, user);
    let response = send(state, "POST", "/login", None, &body).await;
    assert_eq!(response.status, StatusCode::OK);

    let set_cookie = response.headers[header::SET_COOKIE].to_str().unwrap().to_string();
    assert!(set_cookie.ends_with("; Path=/; HttpOnly"));
    assert_eq!(response.json()["user"], user);

    set_cookie.split(';').next().unwrap().to_string()
}

#[tokio::test]
async fn health_reports_counts() {
    let state = app_state();
    login(&state, "alice").await;

    let response = send(&state, "GET", "/health", None, "").await;
    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["sessions"], 1);
    assert_eq!(body["connections"], 0);
}

#[tokio::test]
async fn api_call_runs_as_session_user() {
    let state = app_state();
    let cookie = login(&state, "alice").await;

    let response = send(&state, "POST", "/api/whoami/extra", Some(&cookie), r#"["x"]"#).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, "alice extra x");
    assert_eq!(
        response.headers[header::CONTENT_LENGTH],
        response.body.len().to_string().as_str()
    );
}

#[tokio::test]
async fn api_call_without_session_is_401() {
    let state = app_state();
    let response = send(&state, "GET", "/api/whoami", None, "").await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers[header::CONTENT_TYPE], "application/json");
    let body = response.json();
    assert_eq!(body["status"], 401);
    assert_eq!(body["reason"], "Unauthorized");

    let response = send(&state, "GET", "/api/whoami", Some("sid=12345"), "").await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn rpc_call_and_json_output() {
    let state = app_state();

    let response = send(&state, "POST", "/rpc", None, r#"{"method": "echo", "params": ["a", "b"]}"#).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, "a b");

    let response = send(&state, "POST", "/rpc", None, r#"{"method": "getinfo"}"#).await;
    assert_eq!(response.headers[header::CONTENT_TYPE], "application/json");
    assert_eq!(response.json()["height"], 1024);
}

#[tokio::test]
async fn routing_errors() {
    let state = app_state();

    let cases = [
        ("GET", "/index.html", StatusCode::FORBIDDEN),
        ("GET", "/api", StatusCode::NOT_FOUND),
        ("GET", "/rpc", StatusCode::METHOD_NOT_ALLOWED),
        ("PATCH", "/api/whoami", StatusCode::METHOD_NOT_ALLOWED),
        ("POST", "/rpc", StatusCode::BAD_REQUEST),
    ];
    for (method, uri, expected) in cases {
        let response = send(&state, method, uri, None, "").await;
        assert_eq!(response.status, expected, "{} {}", method, uri);
        assert_eq!(response.json()["status"], expected.as_u16());
    }
}

#[tokio::test]
async fn engine_errors_map_to_status() {
    let state = app_state();

    let response = send(&state, "POST", "/rpc", None, "nosuchcommand").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.json()["message"], "Not found: unknown command: nosuchcommand");

    let response = send(&state, "POST", "/rpc", None, "pay 10").await;
    assert_eq!(response.status, StatusCode::PAYMENT_REQUIRED);
    let body = response.json();
    assert_eq!(body["reason"], "Payment Required");
    assert_eq!(body["message"], "insufficient funds");
}

#[tokio::test]
async fn bad_login_is_400() {
    let state = app_state();
    assert_eq!(
        send(&state, "POST", "/login", None, r#"{"user": ""}"#).await.status,
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        send(&state, "POST", "/login", None, "not json").await.status,
        StatusCode::BAD_REQUEST
    );
}

#[tokio::test]
async fn logout_ends_session() {
    let state = app_state();
    let cookie = login(&state, "bob").await;

    let response = send(&state, "POST", "/logout", Some(&cookie), "").await;
    assert_eq!(response.json()["removed"], true);

    let response = send(&state, "GET", "/api/whoami", Some(&cookie), "").await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let response = send(&state, "POST", "/logout", Some(&cookie), "").await;
    assert_eq!(response.json()["removed"], false);
}

#[tokio::test]
async fn wrong_method_on_fixed_routes_is_json_405() {
    let state = app_state();

    let cases = [("GET", "/login"), ("GET", "/logout"), ("POST", "/ws"), ("DELETE", "/health")];
    for (method, uri) in cases {
        let response = send(&state, method, uri, None, "").await;
        assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED, "{} {}", method, uri);
        assert_eq!(response.headers[header::CONTENT_TYPE], "application/json");
        let body = response.json();
        assert_eq!(body["status"], 405);
        assert_eq!(body["reason"], "Method Not Allowed");
    }
}

#[tokio::test]
async fn oversized_body_is_json_413() {
    let state = app_state();
    let body = vec![b'x'; 3 * 1024 * 1024];

    for uri in ["/rpc", "/login"] {
        let response = send_bytes(&state, "POST", uri, None, body.clone()).await;
        assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE, "{}", uri);
        assert_eq!(response.headers[header::CONTENT_TYPE], "application/json");
        let json = response.json();
        assert_eq!(json["status"], 413);
        assert_eq!(json["reason"], "Payload Too Large");
        assert!(!json["message"].as_str().unwrap().is_empty());
    }
}

#[tokio::test]
async fn plain_get_on_ws_is_json_error() {
    let state = app_state();
    let response = send(&state, "GET", "/ws", None, "").await;

    assert!(response.status.is_client_error());
    assert_eq!(response.headers[header::CONTENT_TYPE], "application/json");
    assert_eq!(response.json()["status"], response.status.as_u16());
}
