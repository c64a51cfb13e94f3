// Test doubles shared by the integration tests
//
// Every double records what it was asked to do into a shared call log so
// tests can assert on ordering across components.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;

use voxlink::arbitrator::{ChatSubmit, ListeningControl, PlaybackControl};
use voxlink::error::{VoiceError, VoiceResult};
use voxlink::playback::{AudioSink, FrameDone, StopReason};
use voxlink::speech::{EngineEvents, RecognitionEngine, RecognitionState};
use voxlink::AudioFormat;

/// Ordered record of calls made on the doubles
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.0.lock().unwrap().iter().any(|e| e == entry)
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

/// Let spawned actors process everything already sent to them
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

// ============================================================================
// Playback
// ============================================================================

/// Sink that "plays" each submitted frame for a fixed time, back to back
pub struct MockSink {
    /// (seq, frame size, format) in play-start order
    pub played: Arc<Mutex<Vec<(u64, usize, AudioFormat)>>>,
    pub halts: Arc<AtomicUsize>,
    /// Frames submitted so far, played or not
    pub submitted: Arc<AtomicUsize>,
    frame_duration: Duration,
    /// Frames of this size fail to decode
    fail_size: Option<usize>,
    /// Bumped by `halt`; frames from an older generation never sound
    generation: Arc<AtomicU64>,
    /// When the last submitted frame stops sounding
    busy_until: Mutex<Option<Instant>>,
}

impl MockSink {
    pub fn new(frame_duration: Duration) -> Self {
        Self {
            played: Arc::new(Mutex::new(Vec::new())),
            halts: Arc::new(AtomicUsize::new(0)),
            submitted: Arc::new(AtomicUsize::new(0)),
            frame_duration,
            fail_size: None,
            generation: Arc::new(AtomicU64::new(0)),
            busy_until: Mutex::new(None),
        }
    }

    pub fn failing_on(mut self, size: usize) -> Self {
        self.fail_size = Some(size);
        self
    }

    pub fn played_sizes(played: &Arc<Mutex<Vec<(u64, usize, AudioFormat)>>>) -> Vec<usize> {
        played.lock().unwrap().iter().map(|(_, size, _)| *size).collect()
    }
}

impl AudioSink for MockSink {
    fn submit(&self, seq: u64, frame: Vec<u8>, format: AudioFormat) -> FrameDone {
        let (done, finished) = oneshot::channel();
        self.submitted.fetch_add(1, Ordering::SeqCst);

        let size = frame.len();
        let fails = self.fail_size == Some(size);
        let now = Instant::now();
        let (start, end) = {
            let mut busy = self.busy_until.lock().unwrap();
            let start = busy.map_or(now, |until| until.max(now));
            let end = if fails { start } else { start + self.frame_duration };
            *busy = Some(end);
            (start, end)
        };

        let generation = self.generation.load(Ordering::SeqCst);
        let current = Arc::clone(&self.generation);
        let played = Arc::clone(&self.played);
        tokio::spawn(async move {
            tokio::time::sleep_until(start).await;
            if current.load(Ordering::SeqCst) != generation {
                return;
            }
            played.lock().unwrap().push((seq, size, format));

            tokio::time::sleep_until(end).await;
            if current.load(Ordering::SeqCst) != generation {
                return;
            }
            let result = if fails {
                Err(VoiceError::PlaybackDecode {
                    seq,
                    message: "corrupt frame".to_string(),
                })
            } else {
                Ok(())
            };
            let _ = done.send(result);
        });

        finished
    }

    fn halt(&self) {
        self.halts.fetch_add(1, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.busy_until.lock().unwrap() = None;
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ============================================================================
// Speech
// ============================================================================

/// Engine that confirms after a delay and can be told to fail
#[derive(Default)]
pub struct MockEngine {
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    start_delay: Duration,
    stop_delay: Duration,
    fail_start: Mutex<Option<VoiceError>>,
    fail_stop: Mutex<Option<VoiceError>>,
    panic_on_start: Mutex<bool>,
    /// Session ids passed to `stop`, in call order
    stopped_sessions: Mutex<Vec<u64>>,
    /// Event sink of the most recent start
    events: Mutex<Option<EngineEvents>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_start_delay(delay: Duration) -> Self {
        Self {
            start_delay: delay,
            ..Self::default()
        }
    }

    pub fn with_stop_delay(delay: Duration) -> Self {
        Self {
            stop_delay: delay,
            ..Self::default()
        }
    }

    pub fn fail_next_start(&self, error: VoiceError) {
        *self.fail_start.lock().unwrap() = Some(error);
    }

    pub fn fail_next_stop(&self, error: VoiceError) {
        *self.fail_stop.lock().unwrap() = Some(error);
    }

    pub fn panic_on_next_start(&self) {
        *self.panic_on_start.lock().unwrap() = true;
    }

    pub fn stopped_sessions(&self) -> Vec<u64> {
        self.stopped_sessions.lock().unwrap().clone()
    }

    /// Event sink handed to the most recent `start`
    pub fn events(&self) -> Option<EngineEvents> {
        self.events.lock().unwrap().clone()
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RecognitionEngine for MockEngine {
    async fn start(&self, events: EngineEvents) -> VoiceResult<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        *self.events.lock().unwrap() = Some(events);
        if !self.start_delay.is_zero() {
            tokio::time::sleep(self.start_delay).await;
        }
        if std::mem::take(&mut *self.panic_on_start.lock().unwrap()) {
            panic!("recognizer crashed");
        }
        match self.fail_start.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn stop(&self, session: u64) -> VoiceResult<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.stopped_sessions.lock().unwrap().push(session);
        if !self.stop_delay.is_zero() {
            tokio::time::sleep(self.stop_delay).await;
        }
        match self.fail_stop.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ============================================================================
// Arbitrator collaborators
// ============================================================================

pub struct MockPlayback {
    log: CallLog,
    playing: watch::Sender<bool>,
    utterances: watch::Sender<u64>,
}

impl MockPlayback {
    pub fn new(log: CallLog) -> Self {
        let (playing, _) = watch::channel(false);
        let (utterances, _) = watch::channel(0);
        Self {
            log,
            playing,
            utterances,
        }
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.send_replace(playing);
    }

    /// A reply played through to its end marker
    pub fn finish_utterance(&self) {
        self.playing.send_replace(false);
        self.utterances.send_modify(|count| *count += 1);
    }
}

impl PlaybackControl for MockPlayback {
    fn stop(&self, reason: StopReason) {
        self.log.push(format!("playback.stop({})", reason));
    }

    fn is_playing(&self) -> bool {
        *self.playing.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.playing.subscribe()
    }

    fn subscribe_utterances(&self) -> watch::Receiver<u64> {
        self.utterances.subscribe()
    }
}

pub struct MockListening {
    log: CallLog,
    state: Mutex<RecognitionState>,
}

impl MockListening {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            state: Mutex::new(RecognitionState::Idle),
        }
    }

    pub fn set_state(&self, state: RecognitionState) {
        *self.state.lock().unwrap() = state;
    }
}

impl ListeningControl for MockListening {
    fn start_listening(&self) {
        self.log.push("listen.start");
    }

    fn stop_listening(&self) {
        self.log.push("listen.stop");
    }

    fn state(&self) -> RecognitionState {
        *self.state.lock().unwrap()
    }
}

pub struct MockChat {
    log: CallLog,
}

impl MockChat {
    pub fn new(log: CallLog) -> Self {
        Self { log }
    }
}

impl ChatSubmit for MockChat {
    fn submit(&self, text: String, speak: bool) {
        if speak {
            self.log.push(format!("chat.submit({})", text));
        } else {
            self.log.push(format!("chat.submit({}, muted)", text));
        }
    }

    fn cancel(&self) {
        self.log.push("chat.cancel");
    }
}
