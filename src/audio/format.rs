use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::VoiceError;

/// Encoded audio formats the playback queue can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AudioFormat {
    /// MPEG audio (MP3)
    Mpeg,
    /// AAC in ADTS framing
    Aac,
    /// Opus in an Ogg container
    OggOpus,
    /// Opus in a WebM/Matroska container
    WebmOpus,
    /// PCM in a RIFF/WAVE container
    Wav,
}

impl AudioFormat {
    /// File extension hint passed to the symphonia probe
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mpeg => "mp3",
            Self::Aac => "aac",
            Self::OggOpus => "ogg",
            Self::WebmOpus => "webm",
            Self::Wav => "wav",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Mpeg => "audio/mpeg",
            Self::Aac => "audio/aac",
            Self::OggOpus => "audio/ogg",
            Self::WebmOpus => "audio/webm",
            Self::Wav => "audio/wav",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mpeg => write!(f, "mpeg"),
            Self::Aac => write!(f, "aac"),
            Self::OggOpus => write!(f, "ogg/opus"),
            Self::WebmOpus => write!(f, "webm/opus"),
            Self::Wav => write!(f, "wav"),
        }
    }
}

impl FromStr for AudioFormat {
    type Err = VoiceError;

    /// Accepts short names ("mpeg", "ogg/opus") and MIME types
    /// ("audio/mpeg", "audio/ogg; codecs=opus").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        let (base, params) = match normalized.split_once(';') {
            Some((base, params)) => (base.trim(), params.trim()),
            None => (normalized.as_str(), ""),
        };

        let format = match base {
            "mpeg" | "mp3" | "audio/mpeg" | "audio/mp3" => Self::Mpeg,
            "aac" | "audio/aac" => Self::Aac,
            "ogg/opus" | "opus" | "audio/ogg" | "audio/opus" => Self::OggOpus,
            "webm/opus" | "audio/webm" => Self::WebmOpus,
            "wav" | "audio/wav" | "audio/wave" | "audio/x-wav" => Self::Wav,
            _ => return Err(VoiceError::FormatRejected(s.to_string())),
        };

        // Ogg and WebM containers are only accepted with Opus inside
        if matches!(format, Self::OggOpus | Self::WebmOpus)
            && !params.is_empty()
            && params != "codecs=opus"
            && params != "codecs=\"opus\""
        {
            return Err(VoiceError::FormatRejected(s.to_string()));
        }

        Ok(format)
    }
}

impl TryFrom<String> for AudioFormat {
    type Error = VoiceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AudioFormat> for String {
    fn from(format: AudioFormat) -> Self {
        format.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_short_names() {
        assert_eq!("mpeg".parse::<AudioFormat>().unwrap(), AudioFormat::Mpeg);
        assert_eq!("aac".parse::<AudioFormat>().unwrap(), AudioFormat::Aac);
        assert_eq!("ogg/opus".parse::<AudioFormat>().unwrap(), AudioFormat::OggOpus);
        assert_eq!("webm/opus".parse::<AudioFormat>().unwrap(), AudioFormat::WebmOpus);
    }

    #[test]
    fn test_parse_mime_types() {
        assert_eq!("audio/mpeg".parse::<AudioFormat>().unwrap(), AudioFormat::Mpeg);
        assert_eq!("Audio/MPEG".parse::<AudioFormat>().unwrap(), AudioFormat::Mpeg);
        assert_eq!(
            "audio/ogg; codecs=opus".parse::<AudioFormat>().unwrap(),
            AudioFormat::OggOpus
        );
        assert_eq!("audio/webm".parse::<AudioFormat>().unwrap(), AudioFormat::WebmOpus);
    }

    #[test]
    fn test_parse_rejects_unknown() {
        let err = "audio/flac".parse::<AudioFormat>().unwrap_err();
        assert_eq!(err, VoiceError::FormatRejected("audio/flac".to_string()));
        assert!("audio/ogg; codecs=vorbis".parse::<AudioFormat>().is_err());
    }

    #[test]
    fn test_display_roundtrips_through_parse() {
        for format in [
            AudioFormat::Mpeg,
            AudioFormat::Aac,
            AudioFormat::OggOpus,
            AudioFormat::WebmOpus,
            AudioFormat::Wav,
        ] {
            assert_eq!(format.to_string().parse::<AudioFormat>().unwrap(), format);
        }
    }
}
