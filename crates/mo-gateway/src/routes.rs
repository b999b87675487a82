use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, RawQuery, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::Response;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use mo_core::error::OrchestratorError;
use mo_core::models::StopOutcome;
use mo_core::services::forwarder::ForwardMethod;
use mo_core::services::scaffold::ENTRY_POINT_FILE;

use crate::app::AppState;
use crate::auth;
use crate::error::ApiError;

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct NameRequest {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct EditRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub code: String,
}

/// Full gateway router. Auth routes are mounted only with an identity client.
pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/create-microservice", post(create_microservice))
        .route("/list-microservices", get(list_microservices))
        .route("/start-microservice", post(start_microservice))
        .route("/stop-microservice", post(stop_microservice))
        .route("/delete-microservice", delete(delete_microservice))
        .route(
            "/edit-microservice",
            get(read_microservice).put(update_microservice),
        )
        .route(
            "/microservices/:name",
            get(forward_to_microservice).post(forward_to_microservice),
        );

    if state.identity.is_some() {
        router = router.merge(auth::router());
    }

    router.with_state(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors_layer(allowed_origins)),
    )
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn required<'a>(value: &'a str, field: &'static str) -> ApiResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(OrchestratorError::MissingField(field).into());
    }
    Ok(trimmed)
}

async fn create_microservice(
    State(state): State<AppState>,
    Json(req): Json<CreateRequest>,
) -> ApiResult<Json<Value>> {
    let title = required(&req.title, "title")?;
    let name = state
        .orchestrator
        .create(title, &req.desc, &req.code)
        .await?;
    let path = state
        .orchestrator
        .store()
        .service_path(&name)
        .join(ENTRY_POINT_FILE);
    Ok(Json(json!({
        "ok": true,
        "message": format!("Microservice '{name}' created successfully"),
        "name": name,
        "path": path.display().to_string(),
    })))
}

async fn list_microservices(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let microservices = state.orchestrator.list().await?;
    Ok(Json(json!({ "microservices": microservices })))
}

async fn start_microservice(
    State(state): State<AppState>,
    Json(req): Json<NameRequest>,
) -> ApiResult<Json<Value>> {
    let name = required(&req.name, "name")?;
    let instance = state.orchestrator.start(name).await?;
    let message = match instance.host_port {
        Some(port) => format!("Microservice '{name}' started on port {port}"),
        None => format!("Microservice '{name}' started"),
    };
    Ok(Json(json!({
        "ok": true,
        "message": message,
        "instance": instance,
    })))
}

async fn stop_microservice(
    State(state): State<AppState>,
    Json(req): Json<NameRequest>,
) -> ApiResult<Json<Value>> {
    let name = required(&req.name, "name")?;
    let outcome = state.orchestrator.stop(name).await?;
    let (was_running, message) = match outcome {
        StopOutcome::Stopped => (true, format!("Microservice '{name}' stopped")),
        StopOutcome::NotRunning => (false, format!("Microservice '{name}' was not running")),
    };
    Ok(Json(json!({
        "ok": true,
        "message": message,
        "wasRunning": was_running,
    })))
}

async fn delete_microservice(
    State(state): State<AppState>,
    Json(req): Json<NameRequest>,
) -> ApiResult<Json<Value>> {
    let name = required(&req.name, "name")?;
    state.orchestrator.delete(name).await?;
    Ok(Json(json!({
        "ok": true,
        "message": format!("Microservice '{name}' deleted"),
    })))
}

async fn read_microservice(
    State(state): State<AppState>,
    Query(query): Query<NameRequest>,
) -> ApiResult<Json<Value>> {
    let name = required(&query.name, "name")?;
    let code = state.orchestrator.read_source(name).await?;
    Ok(Json(json!({ "name": name, "code": code })))
}

async fn update_microservice(
    State(state): State<AppState>,
    Json(req): Json<EditRequest>,
) -> ApiResult<Json<Value>> {
    let name = required(&req.name, "name")?;
    state.orchestrator.update_source(name, &req.code).await?;
    Ok(Json(json!({
        "ok": true,
        "message": format!("Microservice '{name}' updated"),
    })))
}

async fn forward_to_microservice(
    State(state): State<AppState>,
    Path(name): Path<String>,
    method: Method,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let method = ForwardMethod::parse(method.as_str())
        .ok_or_else(|| ApiError::new(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed"))?;
    let upstream = state
        .forwarder
        .forward(&name, method, query.as_deref(), &headers, body)
        .await?;

    let mut response = Response::builder().status(upstream.status);
    if let Some(content_type) = upstream.content_type {
        response = response.header(header::CONTENT_TYPE, content_type);
    }
    response
        .body(Body::from(upstream.body))
        .map_err(|e| ApiError::internal(format!("invalid upstream response: {e}")))
}
