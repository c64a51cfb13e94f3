use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::queue::{PlaybackQueue, PushOutcome, QueuedFrame, SessionState, StopReason};
use super::sink::AudioSink;
use super::stats::PlaybackStats;
use crate::config::PlaybackConfig;
use crate::error::VoiceError;

#[derive(Debug)]
enum PlaybackCommand {
    Announce(String),
    Push(Vec<u8>),
    Stop(StopReason),
    Snapshot(oneshot::Sender<PlaybackStats>),
}

/// A frame finished (or failed) in the sink
#[derive(Debug)]
struct Completion {
    seq: u64,
    result: Result<(), VoiceError>,
}

/// Cloneable handle to the playback actor
///
/// Commands are applied in the order they are sent. Dropping every handle
/// stops playback and ends the actor.
#[derive(Clone)]
pub struct PlaybackHandle {
    commands: mpsc::UnboundedSender<PlaybackCommand>,
    playing: watch::Receiver<bool>,
    utterances: watch::Receiver<u64>,
}

impl PlaybackHandle {
    /// Spawn the playback actor on the current runtime
    pub fn spawn(config: &PlaybackConfig, sink: Arc<dyn AudioSink>) -> (Self, JoinHandle<()>) {
        let (commands, rx) = mpsc::unbounded_channel();
        let (playing_tx, playing) = watch::channel(false);
        let (utterances_tx, utterances) = watch::channel(0);
        let (done_tx, done_rx) = mpsc::unbounded_channel();

        info!(sink = sink.name(), "Starting playback queue");

        let player = Player {
            queue: PlaybackQueue::new(config),
            sink,
            in_flight: VecDeque::new(),
            done_tx,
            playing: playing_tx,
            utterances: utterances_tx,
            frames_played: 0,
            playback_errors: 0,
            last_started_at: None,
        };
        let task = tokio::spawn(player.run(rx, done_rx));

        (
            Self {
                commands,
                playing,
                utterances,
            },
            task,
        )
    }

    /// Start a playback session with the given format name
    pub fn announce_format(&self, format: impl Into<String>) {
        self.send(PlaybackCommand::Announce(format.into()));
    }

    /// Append a binary frame; an empty frame marks end of utterance
    pub fn enqueue(&self, frame: Vec<u8>) {
        self.send(PlaybackCommand::Push(frame));
    }

    /// Cancel playback and discard the backlog
    pub fn stop(&self, reason: StopReason) {
        self.send(PlaybackCommand::Stop(reason));
    }

    /// Last published playing state
    pub fn is_playing(&self) -> bool {
        *self.playing.borrow()
    }

    /// Watch playing-state transitions
    ///
    /// `false` also shows up between phrases when audio arrives slower than
    /// it plays; see `subscribe_utterances` for the end of a reply.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.playing.clone()
    }

    /// Count of utterances played through to their end-of-utterance marker
    ///
    /// Stopped utterances are never counted.
    pub fn subscribe_utterances(&self) -> watch::Receiver<u64> {
        self.utterances.clone()
    }

    /// Statistics as of every command sent before this call
    pub async fn snapshot(&self) -> Option<PlaybackStats> {
        let (tx, rx) = oneshot::channel();
        self.send(PlaybackCommand::Snapshot(tx));
        rx.await.ok()
    }

    fn send(&self, command: PlaybackCommand) {
        if self.commands.send(command).is_err() {
            debug!("Playback actor is gone, dropping command");
        }
    }
}

struct Player {
    queue: PlaybackQueue,
    sink: Arc<dyn AudioSink>,
    /// Completion forwarders for frames handed to the sink, in play order
    in_flight: VecDeque<(u64, JoinHandle<()>)>,
    done_tx: mpsc::UnboundedSender<Completion>,
    playing: watch::Sender<bool>,
    utterances: watch::Sender<u64>,
    frames_played: u64,
    playback_errors: u64,
    last_started_at: Option<DateTime<Utc>>,
}

impl Player {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<PlaybackCommand>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        debug!("Playback actor started");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                Some(done) = completions.recv() => self.on_complete(done),
            }
        }

        self.stop(StopReason::Shutdown);
        debug!("Playback actor stopped");
    }

    fn handle(&mut self, command: PlaybackCommand) {
        match command {
            PlaybackCommand::Announce(raw) => {
                if let Err(e) = self.queue.announce(&raw) {
                    warn!("Format announcement ignored: {}", e);
                }
            }
            PlaybackCommand::Push(frame) => self.push(frame),
            PlaybackCommand::Stop(reason) => self.stop(reason),
            PlaybackCommand::Snapshot(reply) => {
                let _ = reply.send(self.stats());
            }
        }
    }

    fn push(&mut self, frame: Vec<u8>) {
        let size = frame.len();
        match self.queue.push(frame) {
            PushOutcome::Queued { seq } | PushOutcome::QueuedEvicting { seq, .. } => {
                debug!(seq, size, "Frame queued");
                self.play_next();
            }
            PushOutcome::Announced(Ok(_)) => {}
            PushOutcome::Announced(Err(e)) => warn!("Format announcement ignored: {}", e),
            PushOutcome::EndOfUtterance => {
                debug!(backlog = self.queue.backlog_len(), "End of utterance");
                // Nothing left to drain: go idle right away
                if !self.queue.is_playing() {
                    self.play_next();
                }
                self.report_utterance();
            }
            PushOutcome::Dropped(_) => {}
        }
    }

    /// Hand backlog frames to the sink until the in-flight window is full
    fn play_next(&mut self) {
        while let Some(QueuedFrame {
            seq, bytes, format, ..
        }) = self.queue.next()
        {
            if self.in_flight.is_empty() {
                self.last_started_at = Some(Utc::now());
            }
            debug!(seq, size = bytes.len(), %format, "Submitting frame");

            let finished = self.sink.submit(seq, bytes, format);
            let done_tx = self.done_tx.clone();
            let forward = tokio::spawn(async move {
                let result = finished.await.unwrap_or_else(|_| {
                    Err(VoiceError::PlaybackDevice("frame dropped by sink".to_string()))
                });
                let _ = done_tx.send(Completion { seq, result });
            });
            self.in_flight.push_back((seq, forward));
        }

        self.set_playing(self.queue.is_playing());
    }

    fn on_complete(&mut self, done: Completion) {
        if !self.queue.complete(done.seq) {
            // Finished after a stop already cancelled it
            debug!(seq = done.seq, "Ignoring completion of cancelled frame");
            return;
        }
        self.in_flight.retain(|(seq, _)| *seq != done.seq);
        if !self.in_flight.is_empty() {
            self.last_started_at = Some(Utc::now());
        }

        match done.result {
            Ok(()) => self.frames_played += 1,
            Err(e) => {
                self.playback_errors += 1;
                warn!("Skipping frame: {}", e);
            }
        }

        self.play_next();
        self.report_utterance();
    }

    fn report_utterance(&mut self) {
        if self.queue.take_utterance_finished() {
            debug!("Utterance finished");
            self.utterances.send_modify(|count| *count += 1);
        }
    }

    fn stop(&mut self, reason: StopReason) {
        if !self.in_flight.is_empty() {
            for (_, task) in self.in_flight.drain(..) {
                task.abort();
            }
            self.sink.halt();
        }
        self.queue.stop(reason);
        self.set_playing(false);
    }

    fn set_playing(&self, playing: bool) {
        self.playing.send_if_modified(|current| {
            if *current == playing {
                false
            } else {
                *current = playing;
                true
            }
        });
    }

    fn stats(&self) -> PlaybackStats {
        let counters = self.queue.counters();
        let active_format = match self.queue.session() {
            SessionState::Active(format) => Some(*format),
            _ => None,
        };

        PlaybackStats {
            is_playing: self.queue.is_playing(),
            session: self.queue.session().to_string(),
            active_format,
            backlog_len: self.queue.backlog_len(),
            frames_in_flight: self.queue.in_flight_len(),
            frames_enqueued: counters.frames_enqueued,
            frames_played: self.frames_played,
            frames_dropped: counters.frames_dropped,
            playback_errors: self.playback_errors,
            stops: counters.stops,
            last_started_at: self.last_started_at,
        }
    }
}
