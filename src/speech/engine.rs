use tokio::sync::mpsc;

use crate::error::{VoiceError, VoiceResult};

/// Final result of one utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transcript {
    Recognized(String),
    /// The engine heard speech but could not produce text
    NotRecognized,
}

impl Transcript {
    /// Classify raw engine text; blank text counts as not recognized
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        if text.trim().is_empty() {
            Self::NotRecognized
        } else {
            Self::Recognized(text)
        }
    }
}

/// Event produced by a running recognition engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Interim text for the current utterance
    Partial(String),
    /// Closes the current utterance
    Final(Transcript),
    /// The engine ended the session on its own (device lost, runtime error,
    /// remote pause)
    Cancelled(VoiceError),
}

/// Session-tagged engine event as seen by the speech controller
#[derive(Debug)]
pub(crate) struct TaggedEvent {
    pub session: u64,
    pub event: EngineEvent,
}

/// Where an engine reports events for the session it was started for
///
/// Events sent after the session has ended are ignored by the controller.
#[derive(Debug, Clone)]
pub struct EngineEvents {
    session: u64,
    tx: mpsc::UnboundedSender<TaggedEvent>,
}

impl EngineEvents {
    pub(crate) fn new(session: u64, tx: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        Self { session, tx }
    }

    /// Session id these events belong to
    pub fn session(&self) -> u64 {
        self.session
    }

    /// Report an event; returns false once the controller is gone
    pub fn emit(&self, event: EngineEvent) -> bool {
        self.tx
            .send(TaggedEvent {
                session: self.session,
                event,
            })
            .is_ok()
    }
}

/// Speech recognition engine trait
///
/// The controller serializes calls: `stop` is only called after `start` was
/// issued, and never concurrently with another `stop`. A `start` may be
/// abandoned (its future dropped) when the caller stops before it resolves.
/// A panic inside either call is reported as `RecognitionRuntime`.
#[async_trait::async_trait]
pub trait RecognitionEngine: Send + Sync {
    /// Open the microphone and begin recognizing
    ///
    /// Resolves once the engine confirms it is listening.
    async fn start(&self, events: EngineEvents) -> VoiceResult<()>;

    /// Stop recognizing and release the microphone
    ///
    /// `session` is the id the session was started with; state belonging to
    /// any later session must be left alone.
    async fn stop(&self, session: u64) -> VoiceResult<()>;

    /// Engine name for logging
    fn name(&self) -> &str;
}
