//! HTTP handlers for the inspector API

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use mcpscope_core::{ErrorRecord, ManagerError, RoutedTool, ServerConfig, ServerSpec, ServerStatus};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::error::{ApiError, ApiResult};
use crate::pool::{ConnectionInfo, ConnectionManager};

/// Header carrying the caller's session id
pub const SESSION_HEADER: &str = "x-session-id";

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ConnectionManager>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub async fn health() -> Json<HealthResponse> {
    debug!("[Gateway] Health check");
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Debug, Deserialize)]
pub struct RegisterServerRequest {
    pub name: String,
    #[serde(flatten)]
    pub spec: ServerSpec,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolRequest {
    #[serde(default)]
    pub arguments: Option<Value>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// An empty body means "all defaults"
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> ApiResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError(ManagerError::Validation(format!("invalid request body: {}", e))))
}

fn millis(timeout_ms: Option<u64>) -> Option<Duration> {
    timeout_ms.map(Duration::from_millis)
}

pub async fn list_servers(State(state): State<AppState>) -> Json<Vec<ServerConfig>> {
    Json(state.manager.list())
}

pub async fn register_server(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let request: RegisterServerRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError(ManagerError::Validation(format!("invalid request body: {}", e))))?;
    let config = state.manager.register(&request.name, request.spec).await?;
    info!(server = %config.name, "[Gateway] Server registered via API");
    Ok((StatusCode::CREATED, Json(config)))
}

pub async fn get_server(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<ServerConfig>> {
    state
        .manager
        .get(&name)
        .map(Json)
        .ok_or_else(|| ApiError(ManagerError::NotRegistered(name)))
}

pub async fn remove_server(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    state.manager.remove(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn connect_server(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult<Json<ConnectionInfo>> {
    let request: ConnectRequest = parse_body(&body)?;
    let conn = state
        .manager
        .connect(&name, request.token.as_deref(), millis(request.timeout_ms))
        .await?;
    Ok(Json(conn.info()))
}

pub async fn disconnect_server(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Json<Value> {
    let disconnected = state.manager.disconnect(&name).await;
    Json(json!({ "disconnected": disconnected }))
}

pub async fn status(State(state): State<AppState>, headers: HeaderMap) -> Json<Vec<ServerStatus>> {
    let session = session_id(&headers);
    Json(state.manager.status(session.as_deref()))
}

pub async fn last_error(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Option<ErrorRecord>>> {
    if state.manager.get(&name).is_none() {
        return Err(ApiError(ManagerError::NotRegistered(name)));
    }
    let session = session_id(&headers);
    Ok(Json(state.manager.last_error(&name, session.as_deref())))
}

pub async fn list_tools(State(state): State<AppState>) -> Json<Vec<RoutedTool>> {
    Json(state.manager.list_tools())
}

pub async fn call_tool(
    State(state): State<AppState>,
    Path((name, tool)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let request: CallToolRequest = parse_body(&body)?;
    let session = session_id(&headers);
    let arguments = request.arguments.unwrap_or_else(|| json!({}));
    let result = state
        .manager
        .call(
            &name,
            &tool,
            arguments,
            session.as_deref(),
            millis(request.timeout_ms),
        )
        .await?;
    Ok(Json(result))
}

pub async fn open_session_connection(
    State(state): State<AppState>,
    Path((session, name)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<Json<ConnectionInfo>> {
    let request: ConnectRequest = parse_body(&body)?;
    let conn = state
        .manager
        .get_user_connection(
            &session,
            &name,
            request.token.as_deref(),
            millis(request.timeout_ms),
        )
        .await?;
    Ok(Json(conn.info()))
}

pub async fn drop_session_connection(
    State(state): State<AppState>,
    Path((session, name)): Path<(String, String)>,
) -> Json<Value> {
    let dropped = state.manager.drop_user_connection(&session, &name).await;
    Json(json!({ "dropped": dropped }))
}

pub async fn session_connections(
    State(state): State<AppState>,
    Path(session): Path<String>,
) -> Json<Vec<String>> {
    Json(state.manager.session_connections(&session))
}

pub async fn drop_session(
    State(state): State<AppState>,
    Path(session): Path<String>,
) -> Json<Value> {
    let closed = state.manager.drop_session(&session).await;
    Json(json!({ "closed": closed }))
}

pub async fn connections(State(state): State<AppState>) -> Json<Vec<ConnectionInfo>> {
    Json(state.manager.connections())
}
