//! Auth routes delegated to the identity provider. The refresh token lives
//! in an HttpOnly cookie and never appears in response bodies.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::error::ApiError;
use crate::identity::{validate_credentials, IdentityClient, IdentityError};

pub const REFRESH_COOKIE: &str = "refreshToken";

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/verify-token", get(verify_token))
        .route("/refresh-token", post(refresh_token))
        .route("/logout", post(logout))
        .route("/guard", get(guard))
}

fn identity(state: &AppState) -> Result<Arc<IdentityClient>, ApiError> {
    state
        .identity
        .clone()
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "identity provider not configured"))
}

fn status_code(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY)
}

/// `Set-Cookie` value storing the refresh token.
pub fn refresh_cookie(token: &str) -> String {
    format!("{REFRESH_COOKIE}={token}; HttpOnly; SameSite=Lax; Path=/")
}

fn cleared_refresh_cookie() -> String {
    format!("{REFRESH_COOKIE}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0")
}

/// Value of cookie `name` from the request's `Cookie` headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

fn with_cookie(mut response: Response, cookie: &str) -> Result<Response, ApiError> {
    let value = HeaderValue::from_str(cookie)
        .map_err(|_| ApiError::internal("identity provider returned an unusable token"))?;
    response.headers_mut().append(header::SET_COOKIE, value);
    Ok(response)
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .filter(|v| v.starts_with("Bearer "))
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Response, ApiError> {
    let client = identity(&state)?;
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("Incorrect parameters"));
    }
    validate_credentials(&req.email, &req.password).map_err(ApiError::bad_request)?;

    let reply = client.signup(&req.email, &req.name, &req.password).await?;
    Ok((status_code(reply.status), Json(reply.body)).into_response())
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let client = identity(&state)?;
    validate_credentials(&req.email, &req.password).map_err(ApiError::bad_request)?;

    let reply = client.login(&req.email, &req.password).await?;
    let status = status_code(reply.status);
    let mut body = reply.into_success()?;

    let refresh = body
        .as_object_mut()
        .and_then(|fields| fields.remove(REFRESH_COOKIE))
        .and_then(|v| v.as_str().map(str::to_string));
    let access_token = body.get("accessToken").cloned().unwrap_or(Value::Null);

    let response = (
        status,
        Json(json!({ "accessToken": access_token, "body": body })),
    )
        .into_response();
    match refresh {
        Some(token) => with_cookie(response, &refresh_cookie(&token)),
        None => Ok(response),
    }
}

async fn verify_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let client = identity(&state)?;
    let authorization = bearer(&headers).ok_or_else(|| ApiError::bad_request("Invalid access token"))?;
    let body = client.verify_token(authorization).await?.into_success()?;
    Ok(Json(body))
}

async fn refresh_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let client = identity(&state)?;
    let token = cookie_value(&headers, REFRESH_COOKIE)
        .ok_or_else(|| ApiError::bad_request("Missing refresh token cookie"))?;

    let body = client.refresh_token(&token).await?.into_success()?;
    let access_token = body
        .get("accessToken")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::internal("Missing access token in identity provider response"))?;

    let response = Json(json!({ "accessToken": access_token })).into_response();
    match body.get(REFRESH_COOKIE).and_then(Value::as_str) {
        Some(rotated) => with_cookie(response, &refresh_cookie(rotated)),
        None => Ok(response),
    }
}

async fn logout() -> Result<Response, ApiError> {
    let response = Json(json!({ "message": "Logged out" })).into_response();
    with_cookie(response, &cleared_refresh_cookie())
}

async fn guard(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let client = identity(&state)?;
    let authorization = bearer(&headers)
        .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "missing_access_token"))?;

    let reply = match client.verify_token(authorization).await {
        Ok(reply) => reply,
        Err(IdentityError::Unreachable(detail)) => {
            tracing::warn!(%detail, "guard could not reach identity provider");
            return Err(ApiError::new(
                StatusCode::BAD_GATEWAY,
                "error contacting identity provider",
            ));
        }
        Err(e) => return Err(e.into()),
    };
    match reply.status {
        200 => Ok(Json(json!({ "ok": true }))),
        403 => Err(ApiError::new(StatusCode::FORBIDDEN, "forbidden")),
        status => Err(ApiError::new(status_code(status), reply.body)),
    }
}
