use anyhow::{Context, Result};
use async_nats::{Client, Subscriber};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::messages::{parse_format_announcement, status_events_or_log, Channel, InboundEvent};
use super::{CloseNotifier, ControlCommand, Transport, TransportLink};
use crate::config::TransportConfig;

/// Subjects for one voice session, all under `voxlink.<session_id>`
///
/// Inbound traffic is read through one wildcard subscription so audio,
/// format announcements and status frames keep their publish order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subjects {
    /// Everything under the session prefix (subscribed)
    pub wildcard: String,
    /// Control commands (published)
    pub control: String,
    /// Raw audio payloads; an empty payload ends the utterance
    pub audio: String,
    /// JSON format announcements
    pub audio_format: String,
    /// JSON status frames
    pub status: String,
}

impl Subjects {
    pub fn for_session(session_id: &str) -> Self {
        let prefix = format!("voxlink.{}", session_id);
        Self {
            wildcard: format!("{}.>", prefix),
            control: format!("{}.control", prefix),
            audio: format!("{}.audio", prefix),
            audio_format: format!("{}.audio.format", prefix),
            status: format!("{}.status", prefix),
        }
    }

    /// Decode a message received on one of the session's subjects
    pub fn decode(&self, subject: &str, payload: &[u8]) -> Vec<InboundEvent> {
        if subject == self.audio {
            vec![InboundEvent::from_audio_bytes(payload.to_vec())]
        } else if subject == self.audio_format {
            match parse_format_announcement(payload) {
                Some(format) => vec![InboundEvent::FormatAnnounced(format)],
                None => {
                    warn!("Dropping malformed format announcement");
                    Vec::new()
                }
            }
        } else if subject == self.status {
            match std::str::from_utf8(payload) {
                Ok(text) => status_events_or_log(text),
                Err(_) => {
                    warn!("Dropping non-UTF-8 status frame");
                    Vec::new()
                }
            }
        } else if subject == self.control {
            // Our own commands echoed back by the wildcard
            Vec::new()
        } else {
            debug!(subject, "Ignoring message on unknown subject");
            Vec::new()
        }
    }
}

/// Transport over a NATS bus, one subject per logical channel
pub struct NatsTransport {
    config: TransportConfig,
    subjects: Subjects,
    client: Option<Client>,
    tasks: Vec<JoinHandle<()>>,
    closed: Option<CloseNotifier>,
}

impl NatsTransport {
    pub fn new(config: TransportConfig) -> Self {
        let subjects = Subjects::for_session(&config.session_id);
        Self {
            config,
            subjects,
            client: None,
            tasks: Vec::new(),
            closed: None,
        }
    }

    pub fn subjects(&self) -> &Subjects {
        &self.subjects
    }

    async fn subscribe(client: &Client, subject: &str) -> Result<Subscriber> {
        let subscriber = client
            .subscribe(subject.to_string())
            .await
            .with_context(|| format!("Failed to subscribe to {}", subject))?;
        info!("Subscribed to {}", subject);
        Ok(subscriber)
    }
}

#[async_trait::async_trait]
impl Transport for NatsTransport {
    async fn connect(&mut self) -> Result<TransportLink> {
        if self.is_connected() {
            anyhow::bail!("NATS transport is already connected");
        }

        info!("Connecting to NATS at {}", self.config.nats_url);
        let client = async_nats::connect(self.config.nats_url.as_str())
            .await
            .context("Failed to connect to NATS")?;
        info!("Connected to NATS successfully");

        let subscriber = Self::subscribe(&client, &self.subjects.wildcard).await?;

        let (inbound_tx, inbound) = mpsc::channel(self.config.channel_capacity);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let closed = CloseNotifier::new(inbound_tx.clone());

        self.tasks = vec![
            tokio::spawn(publish_commands(
                client.clone(),
                self.subjects.control.clone(),
                outbound_rx,
                closed.clone(),
            )),
            tokio::spawn(read_inbound(
                subscriber,
                self.subjects.clone(),
                inbound_tx,
                closed.clone(),
            )),
        ];
        self.client = Some(client);
        self.closed = Some(closed);

        Ok(TransportLink { inbound, outbound })
    }

    async fn close(&mut self) -> Result<()> {
        info!("Closing NATS connection");
        for task in self.tasks.drain(..) {
            task.abort();
        }
        if let Some(client) = self.client.take() {
            client.flush().await.context("Failed to flush NATS connection")?;
        }
        self.closed = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.closed.as_ref().map(|c| !c.is_closed()).unwrap_or(false)
    }

    fn name(&self) -> &str {
        "nats"
    }
}

async fn publish_commands(
    client: Client,
    subject: String,
    mut commands: mpsc::UnboundedReceiver<ControlCommand>,
    closed: CloseNotifier,
) {
    while let Some(command) = commands.recv().await {
        let payload = match serde_json::to_vec(&command) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode {} command: {}", command.action(), e);
                continue;
            }
        };

        if let Err(e) = client.publish(subject.clone(), payload.into()).await {
            closed.notify(Channel::Control, e.to_string()).await;
            return;
        }
        debug!(action = command.action(), subject = %subject, "Published control command");
    }
}

/// Decode every session message in arrival order
async fn read_inbound(
    mut subscriber: Subscriber,
    subjects: Subjects,
    inbound: mpsc::Sender<InboundEvent>,
    closed: CloseNotifier,
) {
    while let Some(message) = subscriber.next().await {
        for event in subjects.decode(&message.subject, message.payload.as_ref()) {
            if inbound.send(event).await.is_err() {
                return;
            }
        }
    }

    closed.notify(Channel::Audio, "subscription ended").await;
}
