use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::error::VoiceError;

/// Who authored a chat turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

/// A chat turn as carried by the `chat` control command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: Sender,
    pub text: String,
    /// RFC3339 timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Outbound control command sent to the backend
///
/// Serialized as `{"action": "start-stt"}`, `{"action": "pause-stt"}`,
/// `{"action": "stop"}` or
/// `{"action": "chat", "messages": [...], "tts_enabled": true}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum ControlCommand {
    StartStt,
    PauseStt,
    Chat {
        messages: Vec<ChatMessage>,
        /// Whether the backend should synthesize speech for the reply
        #[serde(default = "default_tts_enabled")]
        tts_enabled: bool,
    },
    /// Stop generating the reply in progress
    Stop,
}

fn default_tts_enabled() -> bool {
    true
}

impl ControlCommand {
    pub fn action(&self) -> &'static str {
        match self {
            Self::StartStt => "start-stt",
            Self::PauseStt => "pause-stt",
            Self::Chat { .. } => "chat",
            Self::Stop => "stop",
        }
    }
}

/// Control object carried on the audio channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AudioControl {
    Format { format: String },
}

/// Status/content frame received on the chat channel
///
/// Every field is optional; a single frame may carry several of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stt_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_listening: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Marks the end of the assistant message being streamed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
}

impl StatusFrame {
    /// Split into discrete events, ordered status, recognized text, content, done
    pub fn into_events(self) -> Vec<InboundEvent> {
        let mut events = Vec::new();
        if let Some(listening) = self.is_listening {
            events.push(InboundEvent::ListeningStatus(listening));
        }
        if let Some(text) = self.stt_text {
            events.push(InboundEvent::RecognizedText(text));
        }
        if let Some(content) = self.content {
            events.push(InboundEvent::Content(content));
        }
        if self.done == Some(true) {
            events.push(InboundEvent::ContentDone);
        }
        events
    }
}

/// Logical channel of a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Control,
    Audio,
    Status,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Control => write!(f, "control"),
            Self::Audio => write!(f, "audio"),
            Self::Status => write!(f, "status"),
        }
    }
}

/// An inbound unit, decoded once at the transport boundary
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Audio session format announcement (raw string, validated by playback)
    FormatAnnounced(String),
    /// Encoded audio bytes (never empty)
    AudioData(Vec<u8>),
    /// Zero-length audio frame
    EndOfUtterance,
    ListeningStatus(bool),
    RecognizedText(String),
    Content(String),
    ContentDone,
    Closed { channel: Channel, reason: String },
}

impl InboundEvent {
    /// Classify a binary audio-channel payload
    pub fn from_audio_bytes(bytes: Vec<u8>) -> Self {
        if bytes.is_empty() {
            Self::EndOfUtterance
        } else {
            Self::AudioData(bytes)
        }
    }
}

/// Decode a text control object received on the audio channel
pub fn decode_audio_control(text: &str) -> Result<InboundEvent, VoiceError> {
    match serde_json::from_str::<AudioControl>(text) {
        Ok(AudioControl::Format { format }) => Ok(InboundEvent::FormatAnnounced(format)),
        Err(e) => Err(VoiceError::Protocol(format!("invalid audio control frame: {}", e))),
    }
}

/// Decode a status frame into its events
pub fn decode_status_frame(text: &str) -> Result<Vec<InboundEvent>, VoiceError> {
    serde_json::from_str::<StatusFrame>(text)
        .map(StatusFrame::into_events)
        .map_err(|e| VoiceError::Protocol(format!("invalid status frame: {}", e)))
}

/// Recognize a format announcement sent as the first binary frame of a session
///
/// Callers only ask this while a session is waiting for its format; once a
/// session is active every binary frame is audio.
pub fn parse_format_announcement(bytes: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(bytes).ok()?;
    match serde_json::from_str::<AudioControl>(text.trim()) {
        Ok(AudioControl::Format { format }) => Some(format),
        Err(_) => None,
    }
}

/// Decode a status frame, logging and dropping malformed input
pub(crate) fn status_events_or_log(text: &str) -> Vec<InboundEvent> {
    match decode_status_frame(text) {
        Ok(events) => events,
        Err(e) => {
            warn!("Dropping inbound frame: {}", e);
            Vec::new()
        }
    }
}
