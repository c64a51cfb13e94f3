//! WebSocket transport.
//!
//! Two sockets: the chat socket carries control commands out and status
//! frames in; the audio socket carries text format announcements and binary
//! audio frames in. The opcode (text vs binary) is the discriminator on the
//! audio socket.

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::messages::{decode_audio_control, status_events_or_log, Channel, InboundEvent};
use super::{CloseNotifier, ControlCommand, Transport, TransportLink};
use crate::config::TransportConfig;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WebSocketTransport {
    config: TransportConfig,
    tasks: Vec<JoinHandle<()>>,
    closed: Option<CloseNotifier>,
}

impl WebSocketTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            tasks: Vec::new(),
            closed: None,
        }
    }

    async fn open(url: &str) -> Result<WsStream> {
        info!("Connecting to {}", url);
        let (stream, _) = connect_async(url)
            .await
            .with_context(|| format!("Failed to connect to {}", url))?;
        info!("Connected to {}", url);
        Ok(stream)
    }
}

#[async_trait::async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&mut self) -> Result<TransportLink> {
        if self.is_connected() {
            anyhow::bail!("WebSocket transport is already connected");
        }

        let chat = Self::open(&self.config.chat_url).await?;
        let audio = Self::open(&self.config.audio_url).await?;

        let (inbound_tx, inbound) = mpsc::channel(self.config.channel_capacity);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let closed = CloseNotifier::new(inbound_tx.clone());

        let (chat_write, chat_read) = chat.split();
        let (_audio_write, audio_read) = audio.split();

        self.tasks = vec![
            tokio::spawn(write_commands(chat_write, outbound_rx, closed.clone())),
            tokio::spawn(read_status(chat_read, inbound_tx.clone(), closed.clone())),
            tokio::spawn(read_audio(audio_read, inbound_tx, closed.clone())),
        ];
        self.closed = Some(closed);

        Ok(TransportLink { inbound, outbound })
    }

    async fn close(&mut self) -> Result<()> {
        info!("Closing WebSocket transport");
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.closed = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.closed.as_ref().map(|c| !c.is_closed()).unwrap_or(false)
    }

    fn name(&self) -> &str {
        "websocket"
    }
}

async fn write_commands(
    mut sink: futures::stream::SplitSink<WsStream, Message>,
    mut commands: mpsc::UnboundedReceiver<ControlCommand>,
    closed: CloseNotifier,
) {
    while let Some(command) = commands.recv().await {
        let json = match serde_json::to_string(&command) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to encode {} command: {}", command.action(), e);
                continue;
            }
        };
        debug!(action = command.action(), "Sending control command");

        if let Err(e) = sink.send(Message::Text(json.into())).await {
            closed.notify(Channel::Control, e.to_string()).await;
            return;
        }
    }

    let _ = sink.send(Message::Close(None)).await;
    debug!("Control writer finished");
}

async fn read_status(
    mut stream: futures::stream::SplitStream<WsStream>,
    inbound: mpsc::Sender<InboundEvent>,
    closed: CloseNotifier,
) {
    let reason = loop {
        let message = match stream.next().await {
            Some(Ok(message)) => message,
            Some(Err(e)) => break e.to_string(),
            None => break "stream ended".to_string(),
        };

        match message {
            Message::Text(text) => {
                for event in status_events_or_log(text.as_str()) {
                    if inbound.send(event).await.is_err() {
                        return;
                    }
                }
            }
            Message::Binary(data) => {
                warn!(len = data.len(), "Unexpected binary frame on chat socket");
            }
            Message::Close(frame) => {
                break frame
                    .map(|f| f.reason.to_string())
                    .unwrap_or_else(|| "closed by peer".to_string());
            }
            _ => {}
        }
    };

    closed.notify(Channel::Status, reason).await;
}

async fn read_audio(
    mut stream: futures::stream::SplitStream<WsStream>,
    inbound: mpsc::Sender<InboundEvent>,
    closed: CloseNotifier,
) {
    let reason = loop {
        let message = match stream.next().await {
            Some(Ok(message)) => message,
            Some(Err(e)) => break e.to_string(),
            None => break "stream ended".to_string(),
        };

        let event = match message {
            Message::Binary(data) => InboundEvent::from_audio_bytes(data.to_vec()),
            Message::Text(text) => match decode_audio_control(text.as_str()) {
                Ok(event) => event,
                Err(e) => {
                    warn!("Dropping audio control frame: {}", e);
                    continue;
                }
            },
            Message::Close(frame) => {
                break frame
                    .map(|f| f.reason.to_string())
                    .unwrap_or_else(|| "closed by peer".to_string());
            }
            _ => continue,
        };

        if inbound.send(event).await.is_err() {
            return;
        }
    };

    closed.notify(Channel::Audio, reason).await;
}
