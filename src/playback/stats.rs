use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audio::AudioFormat;

/// Statistics about the playback queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackStats {
    /// Whether a frame is currently sounding
    pub is_playing: bool,

    /// Format session state, e.g. "active(mpeg)" or "discarding"
    pub session: String,

    /// Format of the active session, if any
    pub active_format: Option<AudioFormat>,

    /// Frames waiting to be handed to the output
    pub backlog_len: usize,

    /// Frames handed to the output, the sounding one included
    pub frames_in_flight: usize,

    pub frames_enqueued: u64,
    pub frames_played: u64,

    /// Frames dropped by rejection, discard windows, overflow or stops
    pub frames_dropped: u64,

    /// Frames that failed to decode or play
    pub playback_errors: u64,

    pub stops: u64,

    /// When the most recent frame started playing
    pub last_started_at: Option<DateTime<Utc>>,
}
