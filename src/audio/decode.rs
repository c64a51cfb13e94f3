//! Decoding of encoded audio frames into PCM via Symphonia.

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use super::format::AudioFormat;
use crate::error::VoiceError;

/// One decoded playable unit (f32 PCM, interleaved)
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedAudio {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }
}

/// Decode a complete encoded frame using the announced format as the probe hint.
///
/// Packets that fail to decode are skipped; the frame only fails as a whole
/// when the container cannot be probed, has no decodable track, or yields no
/// samples at all.
pub fn decode_frame(seq: u64, bytes: &[u8], format: AudioFormat) -> Result<DecodedAudio, VoiceError> {
    let fail = |message: String| VoiceError::PlaybackDecode { seq, message };

    // MediaSourceStream needs an owned ('static) source
    let cursor = std::io::Cursor::new(bytes.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    hint.with_extension(format.extension());
    hint.mime_type(format.mime_type());

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| fail(format!("{} probe failed: {}", format, e)))?;

    let mut reader = probed.format;
    let track = reader
        .default_track()
        .ok_or_else(|| fail(format!("no audio track in {} frame", format)))?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| fail(format!("{} decoder init failed: {}", format, e)))?;

    let mut samples = Vec::new();
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);

    loop {
        let packet = match reader.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => {
                // A truncated tail is common for streamed chunks; keep what decoded
                if samples.is_empty() {
                    return Err(fail(format!("{} read error: {}", format, e)));
                }
                debug!(seq, "Stopping decode at read error: {}", e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(e) => {
                warn!(seq, "Packet decode error (skipping): {}", e);
                continue;
            }
        };

        let spec = *decoded.spec();
        sample_rate = spec.rate;
        channels = spec.channels.count() as u16;

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    if samples.is_empty() || sample_rate == 0 || channels == 0 {
        return Err(fail(format!("{} frame produced no audio", format)));
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels,
    })
}
