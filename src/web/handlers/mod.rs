use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::video::position::Position;
use crate::webrtc::signaling::{
    AnswerResponse, IceCandidateRequest, OfferRequest, SessionListResponse,
};
use crate::webrtc::session::SessionInfo;

/// Plain acknowledgement body
#[derive(Serialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Unwrap a JSON body, reporting malformed input as a negotiation error
fn json_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| AppError::Negotiation(rejection.body_text()))
}

// ============================================================================
// Health & Info
// ============================================================================

pub async fn index() -> &'static str {
    "Bouncing ball media service (H264) running"
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Active WebRTC sessions
    pub sessions: usize,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        sessions: state.sessions.session_count().await,
    })
}

// ============================================================================
// WebRTC signaling
// ============================================================================

/// Negotiate a new session for an SDP offer
pub async fn webrtc_offer(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<OfferRequest>, JsonRejection>,
) -> Result<Json<AnswerResponse>> {
    let req = json_body(payload)?;
    let answer = state.sessions.create_session(req).await?;
    info!("Answered offer for session {}", answer.session_id);
    Ok(Json(answer))
}

/// Add a trickled ICE candidate
pub async fn webrtc_ice_candidate(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<IceCandidateRequest>, JsonRejection>,
) -> Result<Json<ApiResponse>> {
    let req = json_body(payload)?;
    state
        .sessions
        .add_ice_candidate(&req.session_id, req.candidate)
        .await?;

    Ok(Json(ApiResponse {
        success: true,
        message: None,
    }))
}

pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<SessionListResponse> {
    Json(SessionListResponse {
        sessions: state.sessions.list_sessions().await,
    })
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionInfo>> {
    state
        .sessions
        .get_session(&session_id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Session not found: {}", session_id)))
}

pub async fn close_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse>> {
    state.sessions.close_session(&session_id).await?;

    Ok(Json(ApiResponse {
        success: true,
        message: Some("Session closed".to_string()),
    }))
}

// ============================================================================
// Position
// ============================================================================

/// Latest ball center from any session, `null` before the first frame
pub async fn position(State(state): State<Arc<AppState>>) -> Json<Position> {
    Json(state.positions.current())
}

pub async fn session_position(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<Position>> {
    state
        .positions
        .session(&session_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Session not found: {}", session_id)))
}
