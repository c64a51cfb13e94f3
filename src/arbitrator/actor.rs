// Interaction arbitrator
//
// Decides from recognition events, playback state, manual controls and an
// inactivity timer when the microphone is opened or closed and when
// assistant playback is pre-empted. Every input is serialized through one
// task, so the checks below see a consistent view of both components.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::controls::{ChatSubmit, ListeningControl, PlaybackControl};
use super::state::InteractionState;
use crate::config::ArbitratorConfig;
use crate::playback::StopReason;
use crate::speech::{RecognitionState, SpeechEvent, Transcript};

#[derive(Debug)]
enum ArbitratorCommand {
    Interrupt,
    ToggleListening,
    StartListening,
    StopListening,
    Submit(String),
    ToggleSpeechOutput,
    SetSpeechOutput(bool),
    TransportClosed,
}

/// Components the arbitrator coordinates
#[derive(Clone)]
pub struct Collaborators {
    pub playback: Arc<dyn PlaybackControl>,
    pub listening: Arc<dyn ListeningControl>,
    pub chat: Arc<dyn ChatSubmit>,
}

/// Cloneable handle for user controls and the transport
#[derive(Clone)]
pub struct ArbitratorHandle {
    commands: mpsc::UnboundedSender<ArbitratorCommand>,
    state: watch::Receiver<InteractionState>,
}

impl ArbitratorHandle {
    pub fn spawn(
        config: &ArbitratorConfig,
        collaborators: Collaborators,
        speech_events: mpsc::UnboundedReceiver<SpeechEvent>,
    ) -> (Self, JoinHandle<()>) {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let initial = InteractionState {
            speech_output_enabled: config.speech_output_enabled,
            ..InteractionState::default()
        };
        let (state_tx, state) = watch::channel(initial.clone());

        info!(
            inactivity_timeout_ms = config.inactivity_timeout_ms,
            auto_listen = config.auto_listen_after_playback,
            "Starting interaction arbitrator"
        );

        let arbitrator = Arbitrator {
            playback: collaborators.playback,
            listening: collaborators.listening,
            chat: collaborators.chat,
            inactivity_timeout: config.inactivity_timeout(),
            auto_listen: config.auto_listen_after_playback,
            deadline: None,
            state: initial,
            state_tx,
        };
        let task = tokio::spawn(arbitrator.run(command_rx, speech_events));

        (Self { commands, state }, task)
    }

    /// Stop button / hotkey: cut off assistant playback and generation
    pub fn interrupt(&self) {
        self.send(ArbitratorCommand::Interrupt);
    }

    /// Open the microphone if closed, close it if open
    pub fn toggle_listening(&self) {
        self.send(ArbitratorCommand::ToggleListening);
    }

    pub fn start_listening(&self) {
        self.send(ArbitratorCommand::StartListening);
    }

    pub fn stop_listening(&self) {
        self.send(ArbitratorCommand::StopListening);
    }

    /// Typed user input, handled like a recognized utterance
    pub fn submit(&self, text: impl Into<String>) {
        self.send(ArbitratorCommand::Submit(text.into()));
    }

    /// Turn spoken replies on or off
    pub fn toggle_speech_output(&self) {
        self.send(ArbitratorCommand::ToggleSpeechOutput);
    }

    pub fn set_speech_output(&self, enabled: bool) {
        self.send(ArbitratorCommand::SetSpeechOutput(enabled));
    }

    /// The backend connection is gone
    pub fn transport_closed(&self) {
        self.send(ArbitratorCommand::TransportClosed);
    }

    pub fn state(&self) -> InteractionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<InteractionState> {
        self.state.clone()
    }

    fn send(&self, command: ArbitratorCommand) {
        if self.commands.send(command).is_err() {
            debug!("Arbitrator is gone, dropping command");
        }
    }
}

struct Arbitrator {
    playback: Arc<dyn PlaybackControl>,
    listening: Arc<dyn ListeningControl>,
    chat: Arc<dyn ChatSubmit>,
    inactivity_timeout: Duration,
    auto_listen: bool,
    /// Inactivity deadline; `None` when disarmed
    deadline: Option<Instant>,
    state: InteractionState,
    state_tx: watch::Sender<InteractionState>,
}

impl Arbitrator {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<ArbitratorCommand>,
        mut speech_events: mpsc::UnboundedReceiver<SpeechEvent>,
    ) {
        let mut playing = self.playback.subscribe();
        let mut utterances = self.playback.subscribe_utterances();
        let mut playing_open = true;
        let mut utterances_open = true;
        let mut speech_open = true;

        self.state.is_playing_audio = *playing.borrow_and_update();
        self.publish();

        loop {
            let deadline = self.deadline;

            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                event = speech_events.recv(), if speech_open => match event {
                    Some(event) => self.on_speech_event(event),
                    None => speech_open = false,
                },
                changed = playing.changed(), if playing_open => match changed {
                    Ok(()) => {
                        let now_playing = *playing.borrow_and_update();
                        self.on_playback_changed(now_playing);
                    }
                    Err(_) => playing_open = false,
                },
                changed = utterances.changed(), if utterances_open => match changed {
                    Ok(()) => {
                        utterances.borrow_and_update();
                        self.on_utterance_finished();
                    }
                    Err(_) => utterances_open = false,
                },
                _ = sleep_until(deadline) => self.on_timer(),
            }

            self.publish();
        }

        debug!("Arbitrator stopped");
    }

    fn handle(&mut self, command: ArbitratorCommand) {
        match command {
            ArbitratorCommand::Interrupt => {
                info!("Manual interrupt");
                self.touch();
                self.playback.stop(StopReason::UserRequested);
                if !self.state.transport_closed {
                    self.chat.cancel();
                }
            }
            ArbitratorCommand::ToggleListening => {
                self.touch();
                match self.listening.state() {
                    RecognitionState::Idle => self.listening.start_listening(),
                    RecognitionState::Starting | RecognitionState::Listening => {
                        self.disarm();
                        self.listening.stop_listening();
                    }
                    RecognitionState::Stopping => debug!("Toggle ignored while stopping"),
                }
            }
            ArbitratorCommand::StartListening => {
                self.touch();
                self.listening.start_listening();
            }
            ArbitratorCommand::StopListening => {
                self.touch();
                self.disarm();
                self.listening.stop_listening();
            }
            ArbitratorCommand::Submit(text) => {
                self.touch();
                self.forward(text);
            }
            ArbitratorCommand::ToggleSpeechOutput => {
                let enabled = !self.state.speech_output_enabled;
                self.set_speech_output(enabled);
            }
            ArbitratorCommand::SetSpeechOutput(enabled) => self.set_speech_output(enabled),
            ArbitratorCommand::TransportClosed => {
                warn!("Transport closed, stopping playback and recognition");
                self.state.transport_closed = true;
                self.disarm();
                self.playback.stop(StopReason::TransportClosed);
                self.listening.stop_listening();
            }
        }
    }

    fn on_speech_event(&mut self, event: SpeechEvent) {
        match event {
            SpeechEvent::ListeningStarted => {
                self.state.mic_open = true;
                self.touch();
                self.arm();
            }
            SpeechEvent::Partial(text) => {
                debug!(partial = %text, "Partial result");
                self.touch();
                self.arm();
            }
            SpeechEvent::Final(Transcript::Recognized(text)) => {
                self.touch();
                self.arm();
                self.forward(text);
            }
            SpeechEvent::Final(Transcript::NotRecognized) => {
                info!("Utterance not recognized");
                self.touch();
                self.arm();
            }
            SpeechEvent::ListeningStopped => {
                self.state.mic_open = false;
                self.disarm();
            }
            SpeechEvent::Error(e) => warn!("Recognition error: {}", e),
        }
    }

    /// Hand a user turn to chat, silencing the assistant first
    fn forward(&mut self, text: String) {
        if text.trim().is_empty() {
            debug!("Ignoring empty submission");
            return;
        }

        self.playback.stop(StopReason::Interrupted);
        info!(chars = text.len(), "Submitting user turn");
        self.chat.submit(text, self.state.speech_output_enabled);
    }

    fn set_speech_output(&mut self, enabled: bool) {
        if self.state.speech_output_enabled == enabled {
            return;
        }
        self.touch();
        self.state.speech_output_enabled = enabled;
        info!(enabled, "Speech output toggled");
        if !enabled {
            self.playback.stop(StopReason::UserRequested);
        }
    }

    fn on_playback_changed(&mut self, playing: bool) {
        self.state.is_playing_audio = playing;
    }

    /// A reply played to its end marker; a stopped reply never gets here
    fn on_utterance_finished(&mut self) {
        if self.auto_listen
            && !self.state.transport_closed
            && !self.playback.is_playing()
            && self.listening.state() == RecognitionState::Idle
        {
            info!("Reply finished, re-opening microphone");
            self.listening.start_listening();
        }
    }

    fn on_timer(&mut self) {
        self.deadline = None;

        match self.listening.state() {
            RecognitionState::Listening if self.playback.is_playing() => {
                debug!("Inactivity timer fired during playback, re-arming");
                self.arm();
            }
            RecognitionState::Listening => {
                info!(
                    "No speech for {} ms, closing microphone",
                    self.inactivity_timeout.as_millis()
                );
                self.listening.stop_listening();
            }
            state => debug!(%state, "Inactivity timer fired while not listening"),
        }
    }

    fn arm(&mut self) {
        self.deadline = Some(Instant::now() + self.inactivity_timeout);
    }

    fn disarm(&mut self) {
        self.deadline = None;
    }

    fn touch(&mut self) {
        self.state.last_activity_at = chrono::Utc::now();
    }

    fn publish(&mut self) {
        self.state.timer_armed = self.deadline.is_some();
        let state = self.state.clone();
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
