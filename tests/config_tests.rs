// Integration tests for configuration loading
//
// Defaults, then the optional file, then VOXLINK__* environment overrides.

use anyhow::Result;
use std::fs;
use tempfile::TempDir;
use voxlink::config::{OverflowPolicy, TransportKind};
use voxlink::{AudioFormat, Config};

#[test]
fn test_missing_file_uses_defaults() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("absent");

    let cfg = Config::load(path.to_str().unwrap())?;

    assert_eq!(cfg.service.name, "voxlink");
    assert_eq!(cfg.transport.kind, TransportKind::Websocket);
    assert!(cfg.transport.session_id.starts_with("voice-"));
    assert_eq!(cfg.playback.default_format, Some(AudioFormat::Mpeg));
    assert_eq!(cfg.playback.max_backlog, None);
    assert_eq!(cfg.arbitrator.inactivity_timeout_ms, 5000);
    assert!(!cfg.arbitrator.auto_listen_after_playback);

    Ok(())
}

#[test]
fn test_file_overrides_defaults() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("voxlink.toml");
    fs::write(
        &path,
        r#"
[transport]
kind = "nats"
session_id = "kitchen"

[playback]
default_format = "audio/aac"
max_backlog = 16
overflow = "drop_newest"
volume = 0.5

[arbitrator]
inactivity_timeout_ms = 8000
auto_listen_after_playback = true
"#,
    )?;

    let cfg = Config::load(path.to_str().unwrap())?;

    assert_eq!(cfg.transport.kind, TransportKind::Nats);
    assert_eq!(cfg.transport.session_id, "kitchen");
    assert_eq!(cfg.playback.default_format, Some(AudioFormat::Aac));
    assert_eq!(cfg.playback.max_backlog, Some(16));
    assert_eq!(cfg.playback.overflow, OverflowPolicy::DropNewest);
    assert_eq!(cfg.playback.volume, 0.5);
    assert_eq!(cfg.arbitrator.inactivity_timeout_ms, 8000);
    assert!(cfg.arbitrator.auto_listen_after_playback);
    // Untouched sections keep their defaults
    assert_eq!(cfg.service.http.port, 8765);

    Ok(())
}

#[test]
fn test_environment_overrides_file() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("voxlink.toml");
    fs::write(&path, "[speech]\nstop_timeout_ms = 1000\n")?;

    std::env::set_var("VOXLINK__SPEECH__STOP_TIMEOUT_MS", "1234");
    let cfg = Config::load(path.to_str().unwrap());
    std::env::remove_var("VOXLINK__SPEECH__STOP_TIMEOUT_MS");

    assert_eq!(cfg?.speech.stop_timeout_ms, 1234);
    Ok(())
}

#[test]
fn test_unsupported_default_format_is_rejected() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("voxlink.toml");
    fs::write(&path, "[playback]\ndefault_format = \"flac\"\n")?;

    assert!(Config::load(path.to_str().unwrap()).is_err());
    Ok(())
}

#[test]
fn test_validation() {
    let mut cfg = Config::default();
    assert!(cfg.validate().is_ok());

    cfg.playback.max_backlog = Some(0);
    assert!(cfg.validate().is_err());

    let mut cfg = Config::default();
    cfg.playback.volume = 3.0;
    assert!(cfg.validate().is_err());

    let mut cfg = Config::default();
    cfg.arbitrator.inactivity_timeout_ms = 0;
    assert!(cfg.validate().is_err());
}
