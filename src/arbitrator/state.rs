use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the arbitrator currently believes about the microphone and speaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionState {
    /// Recognition session is listening
    pub mic_open: bool,

    /// Assistant audio is sounding
    pub is_playing_audio: bool,

    /// Last listening start, partial or final result, or manual action
    pub last_activity_at: DateTime<Utc>,

    /// Inactivity timer is armed
    pub timer_armed: bool,

    /// Backend connection is gone; nothing will re-open the microphone
    pub transport_closed: bool,

    /// Replies are requested with speech
    pub speech_output_enabled: bool,
}

impl Default for InteractionState {
    fn default() -> Self {
        Self {
            mic_open: false,
            is_playing_audio: false,
            last_activity_at: Utc::now(),
            timer_armed: false,
            transport_closed: false,
            speech_output_enabled: true,
        }
    }
}
