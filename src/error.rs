//! Error taxonomy for the voice engine.
//!
//! Application plumbing (config loading, connecting, serving HTTP) uses
//! `anyhow`. The engine components report failures with `VoiceError` so the
//! arbitrator and the status surfaces can tell them apart.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VoiceError {
    /// Announced audio format is outside the supported set
    #[error("unsupported audio format: {0}")]
    FormatRejected(String),

    /// A second format announcement arrived while a session was active
    #[error("format {announced} announced while {active} session is active")]
    FormatConflict { active: String, announced: String },

    /// A frame could not be decoded or played
    #[error("playback failed for frame {seq}: {message}")]
    PlaybackDecode { seq: u64, message: String },

    /// The output device could not be opened
    #[error("audio output unavailable: {0}")]
    PlaybackDevice(String),

    #[error("recognition failed to start: {0}")]
    RecognitionStartFailure(String),

    #[error("recognition error: {0}")]
    RecognitionRuntime(String),

    #[error("microphone device lost: {0}")]
    DeviceLost(String),

    #[error("recognition session stopped by engine")]
    SessionStoppedByEngine,

    #[error("transport closed: {0}")]
    TransportClosed(String),

    /// Malformed inbound frame
    #[error("protocol error: {0}")]
    Protocol(String),
}

pub type VoiceResult<T> = std::result::Result<T, VoiceError>;
