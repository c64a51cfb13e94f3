use super::state::AppState;
use crate::arbitrator::InteractionState;
use crate::playback::PlaybackStats;
use crate::speech::RecognitionState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// Text to submit as a user turn
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct SpeechOutputRequest {
    pub enabled: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActionResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub interaction: InteractionState,
    pub recognition: RecognitionState,
    /// Missing if the playback actor has shut down
    pub playback: Option<PlaybackStats>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn accepted(status: &str, message: &str) -> axum::response::Response {
    (
        StatusCode::OK,
        Json(ActionResponse {
            status: status.to_string(),
            message: message.to_string(),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /voice/status
/// Current interaction, recognition and playback state
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let playback = state.playback.snapshot().await;
    if playback.is_none() {
        warn!("Playback actor unavailable for status");
    }

    (
        StatusCode::OK,
        Json(StatusResponse {
            interaction: state.arbitrator.state(),
            recognition: state.speech.state(),
            playback,
        }),
    )
        .into_response()
}

/// POST /voice/playback/stop
/// Stop button: cut off assistant audio and the reply being generated
pub async fn stop_playback(State(state): State<AppState>) -> impl IntoResponse {
    info!("Stop playback requested over HTTP");
    state.arbitrator.interrupt();
    accepted("stopping", "Playback stop requested")
}

/// POST /voice/speech/toggle
/// Flip whether replies are spoken
pub async fn toggle_speech_output(State(state): State<AppState>) -> impl IntoResponse {
    let enabled = !state.arbitrator.state().speech_output_enabled;
    info!(enabled, "Speech output toggle requested over HTTP");
    state.arbitrator.set_speech_output(enabled);
    accepted(
        if enabled { "enabled" } else { "disabled" },
        &format!("Speech output {}", if enabled { "enabled" } else { "disabled" }),
    )
}

/// PUT /voice/speech
pub async fn set_speech_output(
    State(state): State<AppState>,
    Json(req): Json<SpeechOutputRequest>,
) -> impl IntoResponse {
    state.arbitrator.set_speech_output(req.enabled);
    let status = if req.enabled { "enabled" } else { "disabled" };
    accepted(status, &format!("Speech output {}", status))
}

/// POST /voice/listen/toggle
pub async fn toggle_listening(State(state): State<AppState>) -> impl IntoResponse {
    let current = state.speech.state();
    info!("Toggle listening requested over HTTP (currently {})", current);
    state.arbitrator.toggle_listening();
    accepted("toggling", &format!("Listening toggle requested from {}", current))
}

/// POST /voice/listen/start
pub async fn start_listening(State(state): State<AppState>) -> impl IntoResponse {
    state.arbitrator.start_listening();
    accepted("starting", "Listening start requested")
}

/// POST /voice/listen/stop
pub async fn stop_listening(State(state): State<AppState>) -> impl IntoResponse {
    state.arbitrator.stop_listening();
    accepted("stopping", "Listening stop requested")
}

/// POST /voice/chat
/// Submit typed text; assistant playback is interrupted first
pub async fn submit_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> impl IntoResponse {
    if req.text.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "text must not be empty".to_string(),
            }),
        )
            .into_response();
    }

    info!("Chat submission over HTTP ({} chars)", req.text.len());
    state.arbitrator.submit(req.text);
    accepted("submitted", "Message submitted")
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
