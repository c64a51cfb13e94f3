//! HTTP control API
//!
//! Explicit user signals and a status view for the voice engine:
//! - GET /health - Health check
//! - GET /voice/status - Interaction, recognition and playback state
//! - POST /voice/playback/stop - Stop button
//! - PUT /voice/speech, POST /voice/speech/toggle - Spoken replies on/off
//! - POST /voice/listen/{toggle,start,stop} - Microphone controls
//! - POST /voice/chat - Submit typed text

mod handlers;
mod routes;
mod state;

pub use handlers::{
    ActionResponse, ChatRequest, ErrorResponse, SpeechOutputRequest, StatusResponse,
};
pub use routes::create_router;
pub use state::AppState;
