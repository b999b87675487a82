// Each test binary compiles this module independently and uses a different
// subset of helpers, so unused-function warnings are expected.
#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use serde_json::json;

use mo_core::models::ForwarderConfig;
use mo_core::services::forwarder::Forwarder;
use mo_core::services::memory_driver::MemoryDriver;
use mo_core::services::orchestrator::Orchestrator;
use mo_core::services::workspace_store::WorkspaceStore;

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub driver: Arc<MemoryDriver>,
    pub orchestrator: Arc<Orchestrator>,
    pub forwarder: Forwarder,
}

/// Orchestrator and forwarder over a temp workspace and an in-memory engine.
pub fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let driver = Arc::new(MemoryDriver::new());
    let orchestrator = Arc::new(Orchestrator::new(
        WorkspaceStore::new(dir.path().join("microservices")),
        driver.clone(),
    ));
    let forwarder = Forwarder::new(
        orchestrator.clone(),
        &ForwarderConfig {
            upstream_host: "127.0.0.1".into(),
            timeout_secs: 5,
        },
    )
    .unwrap();
    Harness {
        dir,
        driver,
        orchestrator,
        forwarder,
    }
}

#[derive(Clone)]
struct FakeService {
    driver: Arc<MemoryDriver>,
    container: String,
}

/// Serve HTTP on a local port on behalf of `container`, answering with the
/// entry-point source its image was built from. Routes the container to that
/// port in the driver and returns the port.
pub async fn spawn_fake_service(driver: Arc<MemoryDriver>, container: &str) -> u16 {
    let state = FakeService {
        driver: driver.clone(),
        container: container.to_string(),
    };
    let app = Router::new().route("/", any(serve_root)).with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    driver.set_host_port(container, port);
    port
}

async fn serve_root(
    State(state): State<FakeService>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    if uri.query() == Some("teapot=1") {
        return (StatusCode::IM_A_TEAPOT, "short and stout").into_response();
    }
    match state.driver.running_source(&state.container) {
        Some(source) => Json(json!({
            "method": method.as_str(),
            "query": uri.query().unwrap_or(""),
            "body": String::from_utf8_lossy(&body),
            "source": source,
        }))
        .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "container gone").into_response(),
    }
}

/// A local port with nothing listening on it.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}
