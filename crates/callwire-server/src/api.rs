//! Session read and call-context handlers.

use crate::AppState;
use axum::{
    extract::{Extension, Json, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use callwire_directory::{CallContext, ContextDefaults};
use callwire_session::SessionSnapshot;
use callwire_types::SessionCode;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

/// Session code used when a call is placed without one.
pub const DEFAULT_SESSION_CODE: &str = "0000";

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

fn parse_code(raw: &str) -> Result<SessionCode, ApiError> {
    SessionCode::parse(raw)
        .map_err(|e| ApiError::BadRequest(format!("invalid session code: {}", e)))
}

/// Handler for `GET /api/sessions/{code}`.
///
/// Returns the session's history, phase and analysis reference. Unknown
/// codes are created on demand and read back empty.
pub async fn get_session_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let code = parse_code(&code)?;
    Ok(Json(state.relay.registry().read(&code).await))
}

/// Query parameters for the call-context lookup.
#[derive(Debug, Default, Deserialize)]
pub struct ContextParams {
    #[serde(rename = "firstName")]
    pub first_name: Option<String>,
    pub email: Option<String>,
    pub scenario: Option<String>,
}

/// Handler for `GET /api/sessions/{code}/context`.
///
/// Resolves the participant identity and opening greeting for a call. A
/// directory failure falls back to the query values and never fails the
/// request.
pub async fn get_call_context_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(code): Path<String>,
    Query(params): Query<ContextParams>,
) -> Result<Json<CallContext>, ApiError> {
    let raw = match code.trim() {
        "" => DEFAULT_SESSION_CODE,
        trimmed => trimmed,
    };
    let code = parse_code(raw)?;
    let defaults = ContextDefaults {
        first_name: params.first_name,
        email: params.email,
        scenario: params.scenario,
    };
    Ok(Json(state.directory.resolve_context(&code, &defaults).await))
}
