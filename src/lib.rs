pub mod arbitrator;
pub mod audio;
pub mod chat;
pub mod config;
pub mod console;
pub mod error;
pub mod http;
pub mod playback;
pub mod speech;
pub mod transport;

pub use arbitrator::{ArbitratorHandle, Collaborators, InteractionState};
pub use audio::{decode_frame, AudioFormat, DecodedAudio};
pub use config::Config;
pub use error::{VoiceError, VoiceResult};
pub use http::{create_router, AppState};
pub use playback::{AudioSink, PlaybackHandle, PlaybackStats, RodioSink, StopReason};
pub use speech::{RecognitionEngine, RecognitionState, RemoteRecognizer, SpeechEvent, SpeechHandle};
pub use transport::{ControlCommand, InboundEvent, Transport, TransportFactory, TransportLink};
