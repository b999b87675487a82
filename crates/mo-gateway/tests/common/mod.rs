// Each test binary compiles this module independently and uses a different
// subset of helpers, so unused-function warnings are expected.
#![allow(dead_code)]

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::Json as JsonBody;
use axum::http::{HeaderMap, Method, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower::ServiceExt;

use mo_core::models::{IdentityConfig, OrchestratorConfig};
use mo_core::services::memory_driver::MemoryDriver;
use mo_gateway::app::AppState;
use mo_gateway::identity::IdentityClient;
use mo_gateway::routes::build_router;

pub const ORIGIN: &str = "http://localhost:5173";

pub struct TestGateway {
    pub dir: tempfile::TempDir,
    pub driver: Arc<MemoryDriver>,
    pub state: AppState,
}

impl TestGateway {
    pub fn router(&self) -> Router {
        build_router(self.state.clone(), &[ORIGIN.to_string()])
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router().oneshot(request).await.unwrap();
        TestResponse::read(response).await
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    async fn read(response: Response) -> Self {
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

/// Gateway over a temp workspace and the in-memory driver, no identity provider.
pub fn gateway() -> TestGateway {
    let dir = tempfile::tempdir().unwrap();
    let config = OrchestratorConfig {
        workspace_root: dir.path().join("microservices"),
        ..OrchestratorConfig::default()
    };
    let driver = Arc::new(MemoryDriver::new());
    let state = AppState::with_driver(&config, driver.clone()).unwrap();
    TestGateway { dir, driver, state }
}

/// Gateway wired to a fake identity provider listening on a local port.
pub async fn gateway_with_identity() -> TestGateway {
    let base_url = spawn_fake_identity().await;
    let mut gw = gateway();
    let client = IdentityClient::new(&IdentityConfig {
        base_url,
        project: "demo".into(),
        timeout_secs: 5,
    })
    .unwrap();
    gw.state = gw.state.clone().with_identity(client);
    gw
}

pub fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn empty_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn serve(app: Router) -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    port
}

/// Stand-in for a started container: echoes the request it received as JSON.
pub async fn spawn_echo_service(driver: &MemoryDriver, container: &str) -> u16 {
    async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<Value> {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
        Json(json!({
            "msg": "hi",
            "method": method.as_str(),
            "query": uri.query().unwrap_or(""),
            "body": String::from_utf8_lossy(&body),
            "cookie": header("cookie"),
            "authorization": header("authorization"),
        }))
    }
    let port = serve(Router::new().route("/", any(echo))).await;
    driver.set_host_port(container, port);
    port
}

async fn spawn_fake_identity() -> String {
    async fn signup(JsonBody(body): JsonBody<Value>) -> Response {
        (StatusCode::CREATED, Json(json!({ "registered": body["email"] }))).into_response()
    }

    async fn login(JsonBody(body): JsonBody<Value>) -> Response {
        if body["password"] == "correct-horse" {
            (
                StatusCode::CREATED,
                Json(json!({
                    "accessToken": "acc-1",
                    "refreshToken": "ref-1",
                    "user": { "email": body["email"] },
                })),
            )
                .into_response()
        } else {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "message": "invalid credentials" })),
            )
                .into_response()
        }
    }

    async fn verify(headers: HeaderMap) -> Response {
        match headers.get("authorization").and_then(|v| v.to_str().ok()) {
            Some("Bearer good") => Json(json!({ "valid": true })).into_response(),
            Some("Bearer forbidden") => {
                (StatusCode::FORBIDDEN, Json(json!({ "message": "forbidden" }))).into_response()
            }
            _ => (StatusCode::UNAUTHORIZED, Json(json!({ "message": "expired" }))).into_response(),
        }
    }

    async fn refresh(JsonBody(body): JsonBody<Value>) -> Response {
        if body["refreshToken"] == "ref-1" {
            (
                StatusCode::CREATED,
                Json(json!({ "accessToken": "acc-2", "refreshToken": "ref-2" })),
            )
                .into_response()
        } else {
            (StatusCode::UNAUTHORIZED, Json(json!({ "message": "bad refresh" }))).into_response()
        }
    }

    let app = Router::new()
        .route("/auth/demo/signup-direct", post(signup))
        .route("/auth/demo/login", post(login))
        .route("/auth/demo/verify-token", get(verify))
        .route("/auth/demo/refresh-token", post(refresh));
    let port = serve(app).await;
    format!("http://127.0.0.1:{port}")
}
