// Speech session controller
//
// One actor owns the recognition session: Idle -> Starting -> Listening ->
// Stopping -> Idle. Engine start/stop run as child tasks and report back as
// completions tagged with the session id, so a completion or engine event
// from a session that has since been stopped or replaced is dropped.

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::engine::{EngineEvent, EngineEvents, RecognitionEngine, TaggedEvent, Transcript};
use crate::error::{VoiceError, VoiceResult};

/// Recognition session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionState {
    Idle,
    Starting,
    Listening,
    Stopping,
}

impl fmt::Display for RecognitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Starting => write!(f, "starting"),
            Self::Listening => write!(f, "listening"),
            Self::Stopping => write!(f, "stopping"),
        }
    }
}

/// Event emitted to the arbitrator
#[derive(Debug, Clone, PartialEq)]
pub enum SpeechEvent {
    ListeningStarted,
    Partial(String),
    Final(Transcript),
    ListeningStopped,
    Error(VoiceError),
}

#[derive(Debug)]
enum SpeechCommand {
    Start,
    Stop,
}

#[derive(Debug)]
enum Completion {
    Started {
        session: u64,
        result: VoiceResult<()>,
    },
    Stopped {
        session: u64,
        result: VoiceResult<()>,
    },
}

/// Cloneable handle to the speech session actor
#[derive(Clone)]
pub struct SpeechHandle {
    commands: mpsc::UnboundedSender<SpeechCommand>,
    state: watch::Receiver<RecognitionState>,
}

impl SpeechHandle {
    /// Spawn the controller; events for the arbitrator arrive on the returned
    /// receiver
    pub fn spawn(
        engine: Arc<dyn RecognitionEngine>,
    ) -> (Self, mpsc::UnboundedReceiver<SpeechEvent>, JoinHandle<()>) {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(RecognitionState::Idle);
        let (completions_tx, completion_rx) = mpsc::unbounded_channel();
        let (engine_tx, engine_rx) = mpsc::unbounded_channel();

        info!(engine = engine.name(), "Starting speech session controller");

        let controller = Controller {
            engine,
            state: RecognitionState::Idle,
            session: 0,
            start_task: None,
            state_tx,
            events: events_tx,
            completions: completions_tx,
            engine_events: engine_tx,
        };
        let task = tokio::spawn(controller.run(command_rx, completion_rx, engine_rx));

        (Self { commands, state }, events_rx, task)
    }

    /// Begin a recognition session; a no-op unless idle
    pub fn start(&self) {
        self.send(SpeechCommand::Start);
    }

    /// End the recognition session; a no-op when idle or already stopping
    pub fn stop(&self) {
        self.send(SpeechCommand::Stop);
    }

    pub fn state(&self) -> RecognitionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<RecognitionState> {
        self.state.clone()
    }

    fn send(&self, command: SpeechCommand) {
        if self.commands.send(command).is_err() {
            debug!("Speech controller is gone, dropping command");
        }
    }
}

struct Controller {
    engine: Arc<dyn RecognitionEngine>,
    state: RecognitionState,
    /// Id of the current (or most recent) session
    session: u64,
    start_task: Option<JoinHandle<()>>,
    state_tx: watch::Sender<RecognitionState>,
    events: mpsc::UnboundedSender<SpeechEvent>,
    completions: mpsc::UnboundedSender<Completion>,
    engine_events: mpsc::UnboundedSender<TaggedEvent>,
}

impl Controller {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<SpeechCommand>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
        mut engine_events: mpsc::UnboundedReceiver<TaggedEvent>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SpeechCommand::Start) => self.start(),
                    Some(SpeechCommand::Stop) => self.stop(),
                    None => break,
                },
                Some(completion) = completions.recv() => self.on_completion(completion),
                Some(tagged) = engine_events.recv() => self.on_engine_event(tagged),
            }
        }

        if self.state != RecognitionState::Idle {
            if let Some(task) = self.start_task.take() {
                task.abort();
            }
            if let Err(e) = guarded(self.engine.stop(self.session)).await {
                warn!("Engine stop failed during shutdown: {}", e);
            }
            self.set_state(RecognitionState::Idle);
        }
        debug!("Speech controller stopped");
    }

    fn start(&mut self) {
        if self.state != RecognitionState::Idle {
            debug!(state = %self.state, "Ignoring start, session already exists");
            return;
        }

        self.session += 1;
        let session = self.session;
        self.set_state(RecognitionState::Starting);
        info!(session, "Starting recognition");

        let engine = Arc::clone(&self.engine);
        let events = EngineEvents::new(session, self.engine_events.clone());
        let completions = self.completions.clone();
        self.start_task = Some(tokio::spawn(async move {
            let result = guarded(engine.start(events)).await;
            let _ = completions.send(Completion::Started { session, result });
        }));
    }

    fn stop(&mut self) {
        match self.state {
            RecognitionState::Starting | RecognitionState::Listening => {}
            RecognitionState::Idle | RecognitionState::Stopping => {
                debug!(state = %self.state, "Ignoring stop");
                return;
            }
        }

        // Abandon a start that has not confirmed yet
        if let Some(task) = self.start_task.take() {
            task.abort();
        }

        let session = self.session;
        self.set_state(RecognitionState::Stopping);
        info!(session, "Stopping recognition");

        let engine = Arc::clone(&self.engine);
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let result = guarded(engine.stop(session)).await;
            let _ = completions.send(Completion::Stopped { session, result });
        });
    }

    fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Started { session, result } => {
                if session != self.session || self.state != RecognitionState::Starting {
                    debug!(session, "Ignoring stale start confirmation");
                    return;
                }
                self.start_task = None;
                match result {
                    Ok(()) => {
                        info!(session, "Listening");
                        self.set_state(RecognitionState::Listening);
                        self.emit(SpeechEvent::ListeningStarted);
                    }
                    Err(e) => {
                        warn!(session, "Recognition failed to start: {}", e);
                        self.set_state(RecognitionState::Idle);
                        self.emit(SpeechEvent::Error(e));
                    }
                }
            }
            Completion::Stopped { session, result } => {
                if session != self.session || self.state != RecognitionState::Stopping {
                    debug!(session, "Ignoring stale stop confirmation");
                    return;
                }
                self.set_state(RecognitionState::Idle);
                if let Err(e) = result {
                    warn!(session, "Recognition stop reported an error: {}", e);
                    self.emit(SpeechEvent::Error(e));
                }
                info!(session, "Listening stopped");
                self.emit(SpeechEvent::ListeningStopped);
            }
        }
    }

    fn on_engine_event(&mut self, tagged: TaggedEvent) {
        if tagged.session != self.session || self.state == RecognitionState::Idle {
            debug!(session = tagged.session, "Ignoring event from ended session");
            return;
        }

        match tagged.event {
            EngineEvent::Partial(text) => {
                if self.state == RecognitionState::Listening {
                    self.emit(SpeechEvent::Partial(text));
                }
            }
            EngineEvent::Final(transcript) => {
                if self.state == RecognitionState::Listening {
                    self.emit(SpeechEvent::Final(transcript));
                } else {
                    debug!(state = %self.state, "Dropping final result outside listening");
                }
            }
            EngineEvent::Cancelled(reason) => self.on_cancelled(reason),
        }
    }

    /// Engine-initiated end of session, handled like a completed stop
    fn on_cancelled(&mut self, reason: VoiceError) {
        // Our own stop is still running; its completion ends the session
        if self.state == RecognitionState::Stopping {
            debug!(session = self.session, "Engine ended session while stopping: {}", reason);
            return;
        }

        if let Some(task) = self.start_task.take() {
            task.abort();
        }

        self.set_state(RecognitionState::Stopping);
        self.set_state(RecognitionState::Idle);

        if reason == VoiceError::SessionStoppedByEngine {
            info!(session = self.session, "Recognition session ended by engine");
        } else {
            warn!(session = self.session, "Recognition cancelled: {}", reason);
            self.emit(SpeechEvent::Error(reason));
        }
        self.emit(SpeechEvent::ListeningStopped);
    }

    fn set_state(&mut self, state: RecognitionState) {
        self.state = state;
        self.state_tx.send_replace(state);
    }

    fn emit(&self, event: SpeechEvent) {
        if self.events.send(event).is_err() {
            debug!("No listener for speech events");
        }
    }
}

/// Run an engine call, turning a panic into a runtime error
async fn guarded(call: impl Future<Output = VoiceResult<()>>) -> VoiceResult<()> {
    AssertUnwindSafe(call)
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(VoiceError::RecognitionRuntime(panic_message(panic))))
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("engine panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("engine panicked: {}", message)
    } else {
        "engine panicked".to_string()
    }
}
