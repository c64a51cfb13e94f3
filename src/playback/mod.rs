//! Audio playback queue
//!
//! Format sessions, the FIFO backlog and the actor that feeds it to an
//! output sink a bounded number of frames ahead.

pub mod player;
pub mod queue;
pub mod sink;
pub mod stats;

pub use player::PlaybackHandle;
pub use queue::{DropReason, PlaybackQueue, PushOutcome, QueuedFrame, SessionState, StopReason};
pub use sink::{AudioSink, FrameDone, RodioSink};
pub use stats::PlaybackStats;
