use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        .route("/voice/status", get(handlers::get_status))
        // Stop button
        .route("/voice/playback/stop", post(handlers::stop_playback))
        // Spoken replies on/off
        .route("/voice/speech", put(handlers::set_speech_output))
        .route("/voice/speech/toggle", post(handlers::toggle_speech_output))
        // Listening controls
        .route("/voice/listen/toggle", post(handlers::toggle_listening))
        .route("/voice/listen/start", post(handlers::start_listening))
        .route("/voice/listen/stop", post(handlers::stop_listening))
        // Manual text submission
        .route("/voice/chat", post(handlers::submit_chat))
        // Browser clients call the control API from another origin
        .layer(CorsLayer::permissive())
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
