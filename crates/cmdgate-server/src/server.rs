//! HTTP Server - REST、JSON-RPC 和 WebSocket 入口
//!
//! 路由只负责传输层适配；分类、会话和命令调用都在 `cmdgate_gateway` 中完成。

use std::net::SocketAddr;

use axum::{
    body::{Body, Bytes},
    extract::{
        rejection::BytesRejection,
        ws::rejection::WebSocketUpgradeRejection,
        State, WebSocketUpgrade,
    },
    http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use cmdgate_gateway::{DispatchOutput, GatewayError, HttpRequest, WireResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::websocket::handle_socket;

/// 登录请求
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub user: String,
    #[serde(default)]
    pub password: String,
}

/// 登录响应
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub session_id: String,
    pub user: String,
}

/// Gateway error rendered as the JSON error object
#[derive(Debug)]
pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let wire = self.0.to_wire();
        let status = StatusCode::from_u16(wire.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!("{} {}: {}", wire.status, wire.reason, self.0);
        } else {
            tracing::debug!("{} {}: {}", wire.status, wire.reason, self.0);
        }
        buffered(status, WireResponse::CONTENT_TYPE, wire.body.into_bytes())
    }
}

impl From<BytesRejection> for ApiError {
    fn from(rejection: BytesRejection) -> Self {
        rejected(rejection.status(), rejection.body_text())
    }
}

impl From<WebSocketUpgradeRejection> for ApiError {
    fn from(rejection: WebSocketUpgradeRejection) -> Self {
        rejected(rejection.status(), rejection.body_text())
    }
}

/// Extractor rejections keep axum's status, with the canonical reason
fn rejected(status: StatusCode, message: String) -> ApiError {
    ApiError(GatewayError::Service {
        status: status.as_u16(),
        reason: String::new(),
        message,
    })
}

/// 运行 HTTP 服务器，直到 `state.shutdown` 被触发
pub async fn run_server(state: AppState) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", state.config.server.host, state.config.server.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve(listener, state).await
}

/// 在已绑定的 listener 上提供服务
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    let shutdown = state.shutdown.clone();
    let sweeper = state.gateway.spawn_sweeper(shutdown.clone());
    let app = create_router(state);

    tracing::info!("cmdgate server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    let _ = sweeper.await;
    tracing::info!("cmdgate server stopped");
    Ok(())
}

/// 创建路由
pub fn create_router(state: AppState) -> Router {
    let cors = state.config.server.cors;

    let router = Router::new()
        .route("/health", get(health_handler).fallback(method_not_allowed))
        .route("/login", post(login_handler).fallback(method_not_allowed))
        .route("/logout", post(logout_handler).fallback(method_not_allowed))
        .route("/ws", get(websocket_handler).fallback(method_not_allowed))
        // /api/... 和 /rpc 以及其余路径都交给网关分类
        .fallback(gateway_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

/// 健康检查处理器
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "sessions": state.gateway.session_manager().session_count(),
        "connections": state.gateway.connection_pool().count(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// 登录处理器
async fn login_handler(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    let body = body?;
    let req: LoginRequest = serde_json::from_slice(&body)
        .map_err(|e| GatewayError::BadRequest(format!("invalid login body: {}", e)))?;

    let session = state.gateway.login(&req.user, &req.password)?;
    let cookie = state.gateway.session_cookie(&session);

    let mut response = Json(LoginResponse {
        session_id: session.id.to_string(),
        user: session.user.clone(),
    })
    .into_response();

    let cookie = HeaderValue::from_str(&cookie)
        .map_err(|e| GatewayError::Uncategorized(Some(e.to_string())))?;
    response.headers_mut().insert(header::SET_COOKIE, cookie);
    Ok(response)
}

/// 注销处理器
async fn logout_handler(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let removed = state.gateway.logout(cookie_header(&headers));
    Json(json!({ "removed": removed }))
}

/// WebSocket 处理器
async fn websocket_handler(
    State(state): State<AppState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ApiError> {
    Ok(ws?.on_upgrade(move |socket| handle_socket(socket, state)))
}

/// 固定路由上不支持的方法
async fn method_not_allowed(method: Method) -> ApiError {
    ApiError(GatewayError::MethodNotAllowed(format!("method {} not allowed", method)))
}

/// 网关处理器：分类、会话解析、命令调用
async fn gateway_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    let body = body?;
    let request = HttpRequest {
        method: method.as_str(),
        path: uri.path(),
        cookie: cookie_header(&headers),
        body: &body,
    };

    let output = state.gateway.handle_http(request).await?;
    Ok(success_response(output))
}

/// 200 response carrying the command output verbatim.
///
/// Output that parses as JSON is labelled `application/json`. Anything else
/// is plain command text and is sent as `text/plain` rather than wrapped in a
/// JSON envelope, so clients get exactly the bytes the command wrote. Errors
/// never take this path and are always the JSON error object.
fn success_response(output: DispatchOutput) -> Response {
    let content_type = if serde_json::from_slice::<serde_json::Value>(&output.body).is_ok() {
        "application/json"
    } else {
        "text/plain; charset=utf-8"
    };
    buffered(StatusCode::OK, content_type, output.body)
}

fn buffered(status: StatusCode, content_type: &'static str, body: Vec<u8>) -> Response {
    let length = body.len();
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    response
}

fn cookie_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::COOKIE).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_response_headers() {
        let response = ApiError(GatewayError::NotFound("x".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert!(response.headers().contains_key(header::CONTENT_LENGTH));
    }

    #[test]
    fn test_success_content_type() {
        let json_out = DispatchOutput {
            body: br#"{"height": 1}"#.to_vec(),
            status: cmdgate_engine::CommandStatus::Okay,
        };
        let response = success_response(json_out);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "13");

        let text_out = DispatchOutput {
            body: b"pong".to_vec(),
            status: cmdgate_engine::CommandStatus::Okay,
        };
        let response = success_response(text_out);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain; charset=utf-8");
    }

    #[test]
    fn test_cookie_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(cookie_header(&headers), None);
        headers.insert(header::COOKIE, HeaderValue::from_static("sid=42"));
        assert_eq!(cookie_header(&headers), Some("sid=42"));
    }
}
