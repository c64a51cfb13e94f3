// Playback backlog and format-session state
//
// This is the synchronous core of the playback actor: it decides what is
// queued, dropped, or played next. It never touches the output device; the
// actor in `player.rs` drives a sink from the frames this hands out.
//
// Up to `1 + lookahead_frames` frames are in flight at once. The first is
// sounding, the rest are already decoded and queued behind it in the sink.
// Completions arrive in the order frames were handed out.

use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, info, warn};

use crate::audio::AudioFormat;
use crate::config::{OverflowPolicy, PlaybackConfig};
use crate::error::VoiceError;
use crate::transport::messages::parse_format_announcement;

/// One encoded frame waiting in the backlog
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedFrame {
    /// Arrival order, starting at 1
    pub seq: u64,
    pub bytes: Vec<u8>,
    /// Format of the session the frame arrived in
    pub format: AudioFormat,
    /// Last frame before an end-of-utterance marker
    pub ends_utterance: bool,
}

/// Format state of the current playback session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No format yet; the configured default applies to bare audio
    AwaitingFormat,
    Active(AudioFormat),
    /// Announced format was unsupported; audio is dropped until a new session
    Rejected(String),
    /// Playback was stopped mid-session; the old session's audio is dropped
    Discarding,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingFormat => write!(f, "awaiting_format"),
            Self::Active(format) => write!(f, "active({})", format),
            Self::Rejected(raw) => write!(f, "rejected({})", raw),
            Self::Discarding => write!(f, "discarding"),
        }
    }
}

/// Why playback was stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Stop button or hotkey
    UserRequested,
    /// Pre-empted by a new user utterance
    Interrupted,
    TransportClosed,
    Shutdown,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserRequested => write!(f, "user_requested"),
            Self::Interrupted => write!(f, "interrupted"),
            Self::TransportClosed => write!(f, "transport_closed"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    NoFormat,
    FormatRejected,
    Discarding,
    BacklogFull,
}

/// Result of pushing one binary frame
#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    Queued { seq: u64 },
    /// Queued after evicting the oldest backlog entry
    QueuedEvicting { seq: u64, evicted: u64 },
    /// The frame was the session's format announcement
    Announced(Result<AudioFormat, VoiceError>),
    EndOfUtterance,
    Dropped(DropReason),
}

/// Counters kept across sessions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounters {
    pub frames_enqueued: u64,
    pub frames_dropped: u64,
    pub stops: u64,
}

/// A frame handed to the sink and not yet completed
#[derive(Debug, Clone, Copy)]
struct InFlight {
    seq: u64,
    ends_utterance: bool,
}

pub struct PlaybackQueue {
    backlog: VecDeque<QueuedFrame>,
    in_flight: VecDeque<InFlight>,
    max_in_flight: usize,
    /// A frame of the current utterance has finished sounding
    heard_in_utterance: bool,
    /// An utterance played through to its end marker
    utterance_finished: bool,
    session: SessionState,
    default_format: Option<AudioFormat>,
    max_backlog: Option<usize>,
    overflow: OverflowPolicy,
    next_seq: u64,
    counters: QueueCounters,
}

impl PlaybackQueue {
    pub fn new(config: &PlaybackConfig) -> Self {
        Self {
            backlog: VecDeque::new(),
            in_flight: VecDeque::new(),
            max_in_flight: 1 + config.lookahead_frames,
            heard_in_utterance: false,
            utterance_finished: false,
            session: SessionState::AwaitingFormat,
            default_format: config.default_format,
            max_backlog: config.max_backlog,
            overflow: config.overflow,
            next_seq: 1,
            counters: QueueCounters::default(),
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// Frame currently sounding
    pub fn now_playing(&self) -> Option<u64> {
        self.in_flight.front().map(|f| f.seq)
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_playing(&self) -> bool {
        !self.in_flight.is_empty()
    }

    pub fn counters(&self) -> QueueCounters {
        self.counters
    }

    /// Handle a format announcement
    ///
    /// An announcement while a session is active is a conflict and leaves the
    /// active format in place.
    pub fn announce(&mut self, raw: &str) -> Result<AudioFormat, VoiceError> {
        if let SessionState::Active(active) = &self.session {
            return Err(VoiceError::FormatConflict {
                active: active.to_string(),
                announced: raw.to_string(),
            });
        }

        match raw.parse::<AudioFormat>() {
            Ok(format) => {
                info!(%format, "Playback session format announced");
                self.session = SessionState::Active(format);
                Ok(format)
            }
            Err(e) => {
                self.session = SessionState::Rejected(raw.to_string());
                Err(e)
            }
        }
    }

    /// Handle one binary frame from the audio channel
    pub fn push(&mut self, bytes: Vec<u8>) -> PushOutcome {
        if bytes.is_empty() {
            return self.end_of_utterance();
        }

        // Only a session without a format may open with a JSON announcement
        if !matches!(self.session, SessionState::Active(_)) {
            if let Some(raw) = parse_format_announcement(&bytes) {
                return PushOutcome::Announced(self.announce(&raw));
            }
        }

        let format = match &self.session {
            SessionState::Active(format) => *format,
            SessionState::AwaitingFormat => match self.default_format {
                Some(format) => {
                    debug!(%format, "Audio without announcement, using default format");
                    self.session = SessionState::Active(format);
                    format
                }
                None => return self.drop_frame(DropReason::NoFormat),
            },
            SessionState::Rejected(_) => return self.drop_frame(DropReason::FormatRejected),
            SessionState::Discarding => return self.drop_frame(DropReason::Discarding),
        };

        let mut evicted = None;
        if let Some(max) = self.max_backlog {
            if self.backlog.len() >= max {
                match self.overflow {
                    OverflowPolicy::DropNewest => return self.drop_frame(DropReason::BacklogFull),
                    OverflowPolicy::DropOldest => {
                        if let Some(oldest) = self.backlog.pop_front() {
                            self.counters.frames_dropped += 1;
                            warn!(seq = oldest.seq, max, "Backlog full, dropping oldest frame");
                            evicted = Some(oldest.seq);
                            if oldest.ends_utterance {
                                if let Some(last) = self.in_flight.back_mut() {
                                    last.ends_utterance = true;
                                }
                            }
                        }
                    }
                }
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.counters.frames_enqueued += 1;
        self.backlog.push_back(QueuedFrame {
            seq,
            bytes,
            format,
            ends_utterance: false,
        });

        match evicted {
            Some(evicted) => PushOutcome::QueuedEvicting { seq, evicted },
            None => PushOutcome::Queued { seq },
        }
    }

    fn end_of_utterance(&mut self) -> PushOutcome {
        if self.session == SessionState::Discarding {
            debug!("End of utterance closes discard window");
        }
        self.session = SessionState::AwaitingFormat;

        // Mark wherever the utterance's audio currently ends
        if let Some(last) = self.backlog.back_mut() {
            last.ends_utterance = true;
        } else if let Some(last) = self.in_flight.back_mut() {
            last.ends_utterance = true;
        } else if std::mem::take(&mut self.heard_in_utterance) {
            self.utterance_finished = true;
        }
        PushOutcome::EndOfUtterance
    }

    fn drop_frame(&mut self, reason: DropReason) -> PushOutcome {
        self.counters.frames_dropped += 1;
        debug!(?reason, session = %self.session, "Dropping audio frame");
        PushOutcome::Dropped(reason)
    }

    /// Take the next frame to hand to the sink
    ///
    /// Returns `None` while the in-flight window is full.
    pub fn next(&mut self) -> Option<QueuedFrame> {
        if self.in_flight.len() >= self.max_in_flight {
            return None;
        }
        let frame = self.backlog.pop_front()?;
        self.in_flight.push_back(InFlight {
            seq: frame.seq,
            ends_utterance: frame.ends_utterance,
        });
        // More audio follows whatever utterance finished before
        self.utterance_finished = false;
        Some(frame)
    }

    /// Mark `seq` finished. Returns false for completions of frames that are
    /// no longer in flight (cancelled by a stop).
    pub fn complete(&mut self, seq: u64) -> bool {
        let Some(index) = self.in_flight.iter().position(|f| f.seq == seq) else {
            return false;
        };
        if index != 0 {
            warn!(seq, "Frame completed ahead of an earlier frame");
        }
        let Some(done) = self.in_flight.remove(index) else {
            return false;
        };

        if done.ends_utterance {
            self.heard_in_utterance = false;
            self.utterance_finished = true;
        } else {
            self.heard_in_utterance = true;
        }
        true
    }

    /// Whether an utterance has played through to its end marker with
    /// nothing queued after it. Reports each utterance once.
    pub fn take_utterance_finished(&mut self) -> bool {
        if self.utterance_finished && self.in_flight.is_empty() && self.backlog.is_empty() {
            self.utterance_finished = false;
            true
        } else {
            false
        }
    }

    /// Discard everything, returning the number of frames cancelled
    ///
    /// Only a stop that actually cancelled audio opens a discard window for
    /// the rest of that session.
    pub fn stop(&mut self, reason: StopReason) -> usize {
        let cancelled = self.backlog.len() + self.in_flight.len();
        self.backlog.clear();
        self.in_flight.clear();
        // A stopped utterance never counts as finished
        self.heard_in_utterance = false;
        self.utterance_finished = false;
        self.counters.stops += 1;
        self.counters.frames_dropped += cancelled as u64;

        if cancelled > 0 && matches!(self.session, SessionState::Active(_)) {
            self.session = SessionState::Discarding;
        }

        if cancelled > 0 {
            info!(%reason, cancelled, "Playback stopped");
        } else {
            debug!(%reason, "Playback stop with nothing queued");
        }
        cancelled
    }
}
