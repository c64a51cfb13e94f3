use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use voxlink::arbitrator::{ArbitratorHandle, Collaborators};
use voxlink::chat::Conversation;
use voxlink::config::TransportKind;
use voxlink::console;
use voxlink::playback::{PlaybackHandle, RodioSink};
use voxlink::speech::{RemoteRecognizer, SpeechHandle};
use voxlink::transport::{Demux, TransportFactory};
use voxlink::{create_router, AppState, Config};

/// Voice interaction engine for a chat backend
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/voxlink")]
    config: String,

    /// Override the configured transport
    #[arg(long, value_enum)]
    transport: Option<TransportKind>,

    /// Override the HTTP bind address
    #[arg(long)]
    bind: Option<String>,

    /// Override the HTTP port
    #[arg(long)]
    port: Option<u16>,

    /// Disable the HTTP control API
    #[arg(long)]
    no_http: bool,

    /// Do not read commands from stdin
    #[arg(long)]
    no_console: bool,
}

impl Args {
    fn apply(&self, cfg: &mut Config) {
        if let Some(kind) = self.transport {
            cfg.transport.kind = kind;
        }
        if let Some(bind) = &self.bind {
            cfg.service.http.bind = bind.clone();
        }
        if let Some(port) = self.port {
            cfg.service.http.port = port;
        }
        if self.no_http {
            cfg.service.http.enabled = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut cfg = Config::load(&args.config)?;
    args.apply(&mut cfg);
    cfg.validate()?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Session: {}", cfg.transport.session_id);

    // Transport
    let mut transport = TransportFactory::create(&cfg.transport);
    let link = transport
        .connect()
        .await
        .with_context(|| format!("Failed to connect {} transport", transport.name()))?;
    info!("Connected via {}", transport.name());

    // Playback
    let sink = Arc::new(RodioSink::new(&cfg.playback));
    let (playback, playback_task) = PlaybackHandle::spawn(&cfg.playback, sink);

    // Speech
    let recognizer = Arc::new(RemoteRecognizer::new(link.outbound.clone(), &cfg.speech));
    let (speech, speech_events, speech_task) = SpeechHandle::spawn(recognizer.clone());

    // Chat collaborator and arbitrator
    let chat = Arc::new(Conversation::new(link.outbound.clone()));
    let (arbitrator, arbitrator_task) = ArbitratorHandle::spawn(
        &cfg.arbitrator,
        Collaborators {
            playback: Arc::new(playback.clone()),
            listening: Arc::new(speech.clone()),
            chat: chat.clone(),
        },
        speech_events,
    );

    let demux = Demux::new(playback.clone(), recognizer, chat, arbitrator.clone());
    let demux_task = tokio::spawn(demux.run(link.inbound));

    // HTTP control API
    let http_task = if cfg.service.http.enabled {
        let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind HTTP server to {}", addr))?;
        info!("HTTP control API listening on {}", addr);

        let app = create_router(AppState::new(arbitrator.clone(), playback.clone(), speech.clone()));
        Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("HTTP server error: {}", e);
            }
        }))
    } else {
        None
    };

    // Console controls
    let mut console_task = if args.no_console {
        None
    } else {
        info!("Console: s = stop playback, l = toggle listening, t = toggle spoken replies, q = quit, anything else is sent as chat");
        Some(tokio::spawn(console::run(
            console::spawn_stdin_reader(),
            arbitrator.clone(),
        )))
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for ctrl-c")?;
            info!("Received ctrl-c, shutting down");
        }
        _ = quit_requested(console_task.as_mut()) => {}
    }

    // Shutdown: close the transport, then let every actor drain
    if let Some(task) = http_task {
        task.abort();
    }
    if let Some(task) = console_task {
        task.abort();
    }
    if let Err(e) = transport.close().await {
        warn!("Failed to close transport: {}", e);
    }
    drop(arbitrator);
    drop(playback);
    drop(speech);

    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        let _ = demux_task.await;
        let _ = arbitrator_task.await;
        let _ = speech_task.await;
        let _ = playback_task.await;
    })
    .await;
    if drained.is_err() {
        warn!("Timed out waiting for voice components to stop");
    }

    info!("Shutdown complete");
    Ok(())
}

/// Resolves only when the console asked to quit
async fn quit_requested(console: Option<&mut tokio::task::JoinHandle<bool>>) {
    if let Some(task) = console {
        if let Ok(true) = task.await {
            return;
        }
    }
    std::future::pending::<()>().await
}
