use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::audio::AudioFormat;

/// Environment variable prefix, e.g. `VOXLINK__PLAYBACK__VOLUME=0.5`
pub const ENV_PREFIX: &str = "VOXLINK";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub transport: TransportConfig,
    pub playback: PlaybackConfig,
    pub speech: SpeechConfig,
    pub arbitrator: ArbitratorConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "voxlink".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "127.0.0.1".to_string(),
            port: 8765,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Websocket,
    Nats,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub kind: TransportKind,
    /// WebSocket carrying control commands out and status frames in
    pub chat_url: String,
    /// WebSocket carrying format announcements and audio frames in
    pub audio_url: String,
    pub nats_url: String,
    /// Scopes the NATS subjects (`voxlink.<session_id>.*`)
    pub session_id: String,
    /// Capacity of the inbound event and outbound command channels
    pub channel_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::Websocket,
            chat_url: "ws://localhost:8000/ws/chat".to_string(),
            audio_url: "ws://localhost:8000/ws/audio".to_string(),
            nats_url: "nats://localhost:4222".to_string(),
            session_id: format!("voice-{}", uuid::Uuid::new_v4()),
            channel_capacity: 256,
        }
    }
}

/// What to drop when a bounded backlog is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    DropOldest,
    DropNewest,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Format assumed when audio arrives without an announcement
    pub default_format: Option<AudioFormat>,
    /// Backlog bound; `None` keeps it unbounded
    pub max_backlog: Option<usize>,
    pub overflow: OverflowPolicy,
    /// Output device name; `None` uses the system default
    pub output_device: Option<String>,
    pub volume: f32,
    /// Frames handed to the output ahead of the one sounding, so the next
    /// frame is decoded and queued before the current one ends
    pub lookahead_frames: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            default_format: Some(AudioFormat::Mpeg),
            max_backlog: None,
            overflow: OverflowPolicy::DropOldest,
            output_device: None,
            volume: 1.0,
            lookahead_frames: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// How long the backend may take to confirm `start-stt`
    pub start_timeout_ms: u64,
    /// How long to wait for `pause-stt` confirmation before assuming it
    pub stop_timeout_ms: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            start_timeout_ms: 5000,
            stop_timeout_ms: 2000,
        }
    }
}

impl SpeechConfig {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArbitratorConfig {
    /// Idle time after which an open microphone is closed
    pub inactivity_timeout_ms: u64,
    /// Re-open the microphone once assistant playback finishes
    pub auto_listen_after_playback: bool,
    /// Ask the backend to speak its replies; toggled at runtime
    pub speech_output_enabled: bool,
}

impl Default for ArbitratorConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_ms: 5000,
            auto_listen_after_playback: false,
            speech_output_enabled: true,
        }
    }
}

impl ArbitratorConfig {
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_millis(self.inactivity_timeout_ms)
    }
}

impl Config {
    /// Load defaults, then the optional config file at `path`, then
    /// `VOXLINK__*` environment overrides.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        let cfg: Self = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.playback.volume) {
            anyhow::bail!("playback.volume must be within 0.0..=2.0, got {}", self.playback.volume);
        }
        if self.playback.max_backlog == Some(0) {
            anyhow::bail!("playback.max_backlog must be at least 1 when set");
        }
        if self.arbitrator.inactivity_timeout_ms == 0 {
            anyhow::bail!("arbitrator.inactivity_timeout_ms must be positive");
        }
        if self.transport.channel_capacity == 0 {
            anyhow::bail!("transport.channel_capacity must be positive");
        }
        Ok(())
    }
}
