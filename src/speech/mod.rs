pub mod controller;
pub mod engine;
pub mod remote;

pub use controller::{RecognitionState, SpeechEvent, SpeechHandle};
pub use engine::{EngineEvent, EngineEvents, RecognitionEngine, Transcript};
pub use remote::RemoteRecognizer;
