//! Seams between the arbitrator and the components it drives.
//!
//! All methods are synchronous: each implementation only posts a command to
//! its own actor, so the arbitrator never waits on playback or recognition.

use tokio::sync::watch;

use crate::playback::{PlaybackHandle, StopReason};
use crate::speech::{RecognitionState, SpeechHandle};

pub trait PlaybackControl: Send + Sync {
    fn stop(&self, reason: StopReason);
    fn is_playing(&self) -> bool;
    /// Playing-state transitions
    fn subscribe(&self) -> watch::Receiver<bool>;
    /// Bumped each time a reply plays through to its end-of-utterance marker
    fn subscribe_utterances(&self) -> watch::Receiver<u64>;
}

pub trait ListeningControl: Send + Sync {
    fn start_listening(&self);
    fn stop_listening(&self);
    fn state(&self) -> RecognitionState;
}

/// Forwards user turns to the chat pipeline
pub trait ChatSubmit: Send + Sync {
    /// Send a user turn; `speak` asks the backend to voice its reply
    fn submit(&self, text: String, speak: bool);
    /// Ask the backend to stop generating the reply in progress
    fn cancel(&self);
}

impl PlaybackControl for PlaybackHandle {
    fn stop(&self, reason: StopReason) {
        PlaybackHandle::stop(self, reason);
    }

    fn is_playing(&self) -> bool {
        PlaybackHandle::is_playing(self)
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        PlaybackHandle::subscribe(self)
    }

    fn subscribe_utterances(&self) -> watch::Receiver<u64> {
        PlaybackHandle::subscribe_utterances(self)
    }
}

impl ListeningControl for SpeechHandle {
    fn start_listening(&self) {
        self.start();
    }

    fn stop_listening(&self) {
        self.stop();
    }

    fn state(&self) -> RecognitionState {
        SpeechHandle::state(self)
    }
}
