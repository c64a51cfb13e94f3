use crate::arbitrator::ArbitratorHandle;
use crate::playback::PlaybackHandle;
use crate::speech::SpeechHandle;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Receives every user control
    pub arbitrator: ArbitratorHandle,

    /// Queried for playback statistics only
    pub playback: PlaybackHandle,

    /// Queried for recognition state only
    pub speech: SpeechHandle,
}

impl AppState {
    pub fn new(arbitrator: ArbitratorHandle, playback: PlaybackHandle, speech: SpeechHandle) -> Self {
        Self {
            arbitrator,
            playback,
            speech,
        }
    }
}
