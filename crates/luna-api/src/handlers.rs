//! Route handler functions for all API endpoints.
//!
//! Each handler extracts parameters via axum extractors, drives the
//! conversation core through AppState, and returns JSON responses.

use axum::extract::{Path, State};
use axum::Json;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use luna_core::types::SessionSummary;

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Request / response types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub reply: String,
    pub mood: String,
}

#[derive(Debug, Deserialize)]
pub struct VoiceRequest {
    pub session_id: String,
    /// Base64-encoded audio of one user utterance.
    pub audio_base64: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VoiceResponse {
    pub session_id: String,
    pub transcript: String,
    pub reply: String,
    pub mood: String,
    /// Base64-encoded reply audio; absent when synthesis is disabled or
    /// failed (audio is advisory, the text reply is authoritative).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_base64: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub turn_count: usize,
    pub has_summary: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<SessionSummary> for SessionInfo {
    fn from(s: SessionSummary) -> Self {
        Self {
            id: s.id,
            turn_count: s.turn_count,
            has_summary: s.has_summary,
            updated_at: s.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TurnResponse {
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub turns: Vec<TurnResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub sessions: usize,
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /health - liveness and basic counters.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        sessions: state.store.len(),
    })
}

/// POST /chat - one text exchange in a session.
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let reply = state
        .orchestrator
        .reply(&request.session_id, &request.message)
        .await?;

    Ok(Json(ChatResponse {
        session_id: request.session_id,
        reply: reply.text,
        mood: reply.mood.to_string(),
    }))
}

/// POST /voice - one voice exchange: transcribe, reply, synthesize.
pub async fn voice(
    State(state): State<AppState>,
    Json(request): Json<VoiceRequest>,
) -> Result<Json<VoiceResponse>, ApiError> {
    let audio = base64::engine::general_purpose::STANDARD
        .decode(&request.audio_base64)
        .map_err(|e| ApiError::BadRequest(format!("Invalid base64 audio: {}", e)))?;

    let transcript = state
        .transcriber
        .transcribe(&audio)
        .await
        .map_err(ApiError::from)?
        .trim()
        .to_string();
    if transcript.is_empty() {
        return Err(ApiError::UnprocessableEntity(
            "No speech detected in audio".to_string(),
        ));
    }

    let reply = state
        .orchestrator
        .reply(&request.session_id, &transcript)
        .await?;

    let audio_base64 = if state.config.voice.enabled {
        match state
            .synthesizer
            .synthesize(&reply.text, &state.config.voice.voice)
            .await
        {
            Ok(bytes) => Some(base64::engine::general_purpose::STANDARD.encode(bytes)),
            Err(e) => {
                warn!(session = %request.session_id, error = %e, "Reply synthesis failed");
                None
            }
        }
    } else {
        None
    };

    Ok(Json(VoiceResponse {
        session_id: request.session_id,
        transcript,
        reply: reply.text,
        mood: reply.mood.to_string(),
        audio_base64,
    }))
}

/// GET /sessions - list known sessions.
pub async fn sessions(State(state): State<AppState>) -> Json<SessionsResponse> {
    let sessions = state
        .store
        .list_sessions()
        .await
        .into_iter()
        .map(SessionInfo::from)
        .collect();
    Json(SessionsResponse { sessions })
}

/// GET /sessions/{id}/history - full turn history of one session.
pub async fn history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let turns = state
        .store
        .history(&id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Unknown session: {}", id)))?;

    let turns = turns
        .into_iter()
        .map(|t| TurnResponse {
            role: t.role.to_string(),
            content: t.content,
            created_at: t.created_at,
        })
        .collect();

    Ok(Json(HistoryResponse {
        session_id: id,
        turns,
    }))
}

// =============================================================================
// Tests
// =============================================================================
