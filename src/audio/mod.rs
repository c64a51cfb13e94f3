pub mod decode;
pub mod format;

pub use decode::{decode_frame, DecodedAudio};
pub use format::AudioFormat;
