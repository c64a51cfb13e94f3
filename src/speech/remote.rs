//! Recognition engine backed by the backend's recognizer.
//!
//! The microphone lives on the backend side; this engine only asks it to
//! start or pause (`start-stt` / `pause-stt`) and turns the `is_listening`
//! and `stt_text` status frames the demux hands it into engine events.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::engine::{EngineEvent, EngineEvents, RecognitionEngine, Transcript};
use crate::config::SpeechConfig;
use crate::error::{VoiceError, VoiceResult};
use crate::transport::ControlCommand;

#[derive(Default)]
struct RemoteState {
    /// Sink of the session in progress
    events: Option<EngineEvents>,
    /// Session whose `pause-stt` is awaiting confirmation
    stopping: Option<u64>,
}

pub struct RemoteRecognizer {
    outbound: mpsc::UnboundedSender<ControlCommand>,
    listening: watch::Sender<bool>,
    state: Mutex<RemoteState>,
    start_timeout: Duration,
    stop_timeout: Duration,
}

impl RemoteRecognizer {
    pub fn new(outbound: mpsc::UnboundedSender<ControlCommand>, config: &SpeechConfig) -> Self {
        let (listening, _) = watch::channel(false);
        Self {
            outbound,
            listening,
            state: Mutex::new(RemoteState::default()),
            start_timeout: config.start_timeout(),
            stop_timeout: config.stop_timeout(),
        }
    }

    /// Backend reported its listening status
    pub fn on_listening_status(&self, listening: bool) {
        let previous = self.listening.send_replace(listening);
        if previous == listening {
            return;
        }
        debug!(listening, "Backend listening status changed");

        if listening {
            return;
        }

        // A pause we did not ask for ends the session
        let mut state = self.lock();
        if state.stopping.is_none() {
            if let Some(events) = state.events.take() {
                events.emit(EngineEvent::Cancelled(VoiceError::SessionStoppedByEngine));
            }
        }
    }

    /// Backend delivered a recognized utterance
    pub fn on_recognized_text(&self, text: String) {
        let state = self.lock();
        match &state.events {
            Some(events) => {
                events.emit(EngineEvent::Final(Transcript::from_text(text)));
            }
            None => debug!("Dropping recognized text outside a session"),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn send(&self, command: ControlCommand) -> VoiceResult<()> {
        let action = command.action();
        self.outbound
            .send(command)
            .map_err(|_| VoiceError::TransportClosed(format!("cannot send {}", action)))
    }
}

#[async_trait::async_trait]
impl RecognitionEngine for RemoteRecognizer {
    async fn start(&self, events: EngineEvents) -> VoiceResult<()> {
        let session = events.session();
        {
            let mut state = self.lock();
            state.events = Some(events);
            state.stopping = None;
        }

        let mut listening = self.listening.subscribe();
        self.send(ControlCommand::StartStt)
            .map_err(|e| VoiceError::RecognitionStartFailure(e.to_string()))?;

        let confirmed = async { listening.wait_for(|on| *on).await.map(|_| ()) };
        match tokio::time::timeout(self.start_timeout, confirmed).await {
            Ok(Ok(_)) => {
                info!(session, "Backend recognizer listening");
                Ok(())
            }
            Ok(Err(_)) => Err(VoiceError::RecognitionStartFailure(
                "recognizer status channel closed".to_string(),
            )),
            Err(_) => {
                let mut state = self.lock();
                if state.events.as_ref().map(EngineEvents::session) == Some(session) {
                    state.events = None;
                }
                Err(VoiceError::RecognitionStartFailure(format!(
                    "backend did not confirm listening within {} ms",
                    self.start_timeout.as_millis()
                )))
            }
        }
    }

    async fn stop(&self, session: u64) -> VoiceResult<()> {
        self.lock().stopping = Some(session);

        let mut listening = self.listening.subscribe();
        let sent = self.send(ControlCommand::PauseStt);

        if sent.is_ok() {
            let confirmed = async { listening.wait_for(|on| !*on).await.map(|_| ()) };
            if tokio::time::timeout(self.stop_timeout, confirmed).await.is_err() {
                warn!(
                    "Backend did not confirm pause within {} ms, assuming stopped",
                    self.stop_timeout.as_millis()
                );
                self.listening.send_replace(false);
            }
        }

        // A newer session may have started while we waited
        let mut state = self.lock();
        if state.events.as_ref().map(EngineEvents::session) == Some(session) {
            state.events = None;
        }
        if state.stopping == Some(session) {
            state.stopping = None;
        }
        sent
    }

    fn name(&self) -> &str {
        "remote"
    }
}
