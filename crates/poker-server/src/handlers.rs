use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use poker_core::auth::Principal;
use poker_core::errors::SessionError;
use poker_engine::{SessionView, VoteAction};
use serde::Deserialize;

use crate::server::AppState;

/// HTTP projection of a [`SessionError`].
pub struct ApiError(pub SessionError);

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SessionError::Validation(_) => StatusCode::BAD_REQUEST,
            SessionError::Unauthenticated | SessionError::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            SessionError::Forbidden | SessionError::NotLeader => StatusCode::FORBIDDEN,
            SessionError::AlreadyOpen | SessionError::Closed | SessionError::VoteRejected => {
                StatusCode::CONFLICT
            }
            SessionError::System(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({
            "error": self.0.to_string(),
            "kind": self.0.error_kind(),
        });
        (status, Json(body)).into_response()
    }
}

/// The bearer token of a request, empty when absent.
pub fn bearer_token(headers: &HeaderMap) -> &str {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("")
}

fn principal(state: &AppState, headers: &HeaderMap) -> Result<Principal, ApiError> {
    Ok(state.auth.authenticate(bearer_token(headers))?)
}

#[derive(Debug, Deserialize)]
pub struct OpenRequest {
    pub voters: Vec<String>,
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}

pub async fn get_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SessionView>, ApiError> {
    let caller = principal(&state, &headers)?;
    Ok(Json(state.service.fetch(&caller).await))
}

pub async fn open_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<OpenRequest>,
) -> Result<Json<SessionView>, ApiError> {
    let caller = principal(&state, &headers)?;
    Ok(Json(state.service.open(&caller, request.voters).await?))
}

pub async fn close_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SessionView>, ApiError> {
    let caller = principal(&state, &headers)?;
    Ok(Json(state.service.close(&caller).await?))
}

pub async fn vote(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(action): Json<VoteAction>,
) -> Result<Json<SessionView>, ApiError> {
    let caller = principal(&state, &headers)?;
    Ok(Json(state.service.vote(&caller, action).await?))
}

pub async fn reset_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SessionView>, ApiError> {
    let caller = principal(&state, &headers)?;
    Ok(Json(state.service.reset(&caller).await?))
}

pub async fn unmask_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SessionView>, ApiError> {
    let caller = principal(&state, &headers)?;
    Ok(Json(state.service.unmask(&caller).await?))
}
