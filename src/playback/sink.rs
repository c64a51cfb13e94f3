//! Audio output sinks.
//!
//! The playback actor submits encoded frames in play order and gets one
//! completion per frame back, in the same order. `RodioSink` owns the output
//! device on a dedicated thread (rodio's `OutputStream` is not `Send`),
//! decodes with Symphonia and appends every frame to one long-lived rodio
//! `Sink`, so a frame submitted while its predecessor is sounding plays
//! straight after it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use cpal::traits::{DeviceTrait, HostTrait};
use rodio::buffer::SamplesBuffer;
use rodio::source::EmptyCallback;
use rodio::{OutputStream, OutputStreamHandle, Sink};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::audio::{decode_frame, AudioFormat};
use crate::config::PlaybackConfig;
use crate::error::{VoiceError, VoiceResult};

/// Resolves once a submitted frame has finished sounding (or failed)
pub type FrameDone = oneshot::Receiver<VoiceResult<()>>;

/// Audio output trait
///
/// Frames play in submission order, back to back. `halt` cuts off the frame
/// sounding now and drops everything submitted after it; their completions
/// never resolve.
pub trait AudioSink: Send + Sync {
    /// Queue one frame behind everything submitted before it
    fn submit(&self, seq: u64, frame: Vec<u8>, format: AudioFormat) -> FrameDone;

    /// Cut off whatever is playing now
    fn halt(&self);

    /// Sink name for logging
    fn name(&self) -> &str;
}

struct PlayRequest {
    seq: u64,
    frame: Vec<u8>,
    format: AudioFormat,
    generation: u64,
    done: oneshot::Sender<VoiceResult<()>>,
}

/// Plays decoded frames on the default (or a named) output device
pub struct RodioSink {
    requests: mpsc::UnboundedSender<PlayRequest>,
    /// Bumped by `halt`; requests from an older generation are skipped
    generation: Arc<AtomicU64>,
    /// rodio queue frames are appended to; replaced after a halt
    current: Arc<Mutex<Option<Sink>>>,
}

impl RodioSink {
    pub fn new(config: &PlaybackConfig) -> Self {
        let (requests, rx) = mpsc::unbounded_channel::<PlayRequest>();
        let generation = Arc::new(AtomicU64::new(0));
        let current = Arc::new(Mutex::new(None));

        let output = OutputThread {
            device: config.output_device.clone(),
            volume: config.volume.clamp(0.0, 2.0),
            generation: Arc::clone(&generation),
            current: Arc::clone(&current),
        };
        let spawned = std::thread::Builder::new()
            .name("voxlink-playback".to_string())
            .spawn(move || output.run(rx));
        if let Err(e) = spawned {
            // Every submit will now fail with PlaybackDevice
            warn!("Failed to spawn playback thread: {}", e);
        }

        Self {
            requests,
            generation,
            current,
        }
    }
}

impl AudioSink for RodioSink {
    fn submit(&self, seq: u64, frame: Vec<u8>, format: AudioFormat) -> FrameDone {
        let (done, finished) = oneshot::channel();
        let request = PlayRequest {
            seq,
            frame,
            format,
            generation: self.generation.load(Ordering::SeqCst),
            done,
        };

        if let Err(mpsc::error::SendError(request)) = self.requests.send(request) {
            let _ = request.done.send(Err(VoiceError::PlaybackDevice(
                "playback thread is gone".to_string(),
            )));
        }
        finished
    }

    fn halt(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(sink) = lock(&self.current).take() {
            sink.stop();
            debug!("Playback halted");
        }
    }

    fn name(&self) -> &str {
        "rodio"
    }
}

fn lock(current: &Mutex<Option<Sink>>) -> MutexGuard<'_, Option<Sink>> {
    current.lock().unwrap_or_else(|e| e.into_inner())
}

/// Owns the output stream; decodes and appends requests in order
struct OutputThread {
    device: Option<String>,
    volume: f32,
    generation: Arc<AtomicU64>,
    current: Arc<Mutex<Option<Sink>>>,
}

impl OutputThread {
    fn run(self, mut rx: mpsc::UnboundedReceiver<PlayRequest>) {
        let mut output: Option<(OutputStream, OutputStreamHandle)> = None;

        while let Some(request) = rx.blocking_recv() {
            if self.generation.load(Ordering::SeqCst) != request.generation {
                debug!(seq = request.seq, "Skipping frame submitted before a halt");
                continue;
            }

            // Open lazily and retry on the next frame if the device is missing
            if output.is_none() {
                match open_output_stream(self.device.as_deref()) {
                    Ok(stream) => output = Some(stream),
                    Err(e) => {
                        let _ = request.done.send(Err(VoiceError::PlaybackDevice(e)));
                        continue;
                    }
                }
            }
            let Some((_, handle)) = output.as_ref() else {
                continue;
            };

            if let Err(e) = self.append(handle, request) {
                // Stream may have died with the device; reopen next time
                warn!("{}", e);
                output = None;
            }
        }

        debug!("Playback thread exiting");
    }

    /// Decode one frame and queue it behind the previous one
    ///
    /// Decode failures are queued too, so their completion resolves in order.
    fn append(&self, handle: &OutputStreamHandle, request: PlayRequest) -> Result<(), VoiceError> {
        let PlayRequest {
            seq,
            frame,
            format,
            generation,
            done,
        } = request;

        let decoded = decode_frame(seq, &frame, format);
        if let Ok(audio) = &decoded {
            debug!(
                seq,
                sample_rate = audio.sample_rate,
                channels = audio.channels,
                duration_secs = format!("{:.2}", audio.duration_secs()),
                "Frame decoded"
            );
        }

        let mut current = lock(&self.current);
        // A halt raced with the decode
        if self.generation.load(Ordering::SeqCst) != generation {
            return Ok(());
        }
        if current.is_none() {
            match Sink::try_new(handle) {
                Ok(sink) => {
                    sink.set_volume(self.volume);
                    *current = Some(sink);
                }
                Err(e) => {
                    let error =
                        VoiceError::PlaybackDevice(format!("failed to create audio sink: {}", e));
                    let _ = done.send(Err(error.clone()));
                    return Err(error);
                }
            }
        }
        let Some(sink) = current.as_ref() else {
            return Ok(());
        };

        let result = match decoded {
            Ok(audio) => {
                sink.append(SamplesBuffer::new(audio.channels, audio.sample_rate, audio.samples));
                Ok(())
            }
            Err(e) => Err(e),
        };

        // Fires when playback reaches this point in the queue
        let done = Mutex::new(Some((done, result)));
        sink.append(EmptyCallback::<f32>::new(Box::new(move || {
            let taken = done.lock().unwrap_or_else(|e| e.into_inner()).take();
            if let Some((done, result)) = taken {
                let _ = done.send(result);
            }
        })));

        Ok(())
    }
}

/// Open the audio output stream for a named or default device
fn open_output_stream(name: Option<&str>) -> Result<(OutputStream, OutputStreamHandle), String> {
    if let Some(name) = name {
        let host = cpal::default_host();
        let device = host
            .output_devices()
            .map_err(|e| format!("Failed to enumerate output devices: {}", e))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false));

        match device {
            Some(dev) => {
                info!(device = %name, "Using configured output device");
                return OutputStream::try_from_device(&dev)
                    .map_err(|e| format!("Failed to open output device '{}': {}", name, e));
            }
            None => {
                warn!(device = %name, "Configured output device not found, falling back to default");
            }
        }
    }

    OutputStream::try_default().map_err(|e| format!("No audio output device available: {}", e))
}
