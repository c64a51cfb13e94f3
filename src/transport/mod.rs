//! Binary frame transport to the backend.
//!
//! A transport carries three logical channels: control commands out, audio
//! frames in and status frames in. Whatever the physical layout, inbound
//! units are decoded once into `InboundEvent` and outbound commands are the
//! closed `ControlCommand` enum.

pub mod demux;
pub mod messages;
pub mod nats;
pub mod websocket;

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::{TransportConfig, TransportKind};

pub use demux::{route, Demux, Route};
pub use messages::{
    AudioControl, Channel, ChatMessage, ControlCommand, InboundEvent, Sender, StatusFrame,
};
pub use nats::NatsTransport;
pub use websocket::WebSocketTransport;

/// Both directions of a connected transport
pub struct TransportLink {
    /// Decoded inbound events from every channel, in arrival order per channel
    pub inbound: mpsc::Receiver<InboundEvent>,
    /// Control commands to send; dropping every sender closes the control side
    pub outbound: mpsc::UnboundedSender<ControlCommand>,
}

/// Backend transport trait
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Connect every channel and start the reader/writer tasks
    async fn connect(&mut self) -> Result<TransportLink>;

    /// Tear down the connection
    async fn close(&mut self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Transport name for logging
    fn name(&self) -> &str;
}

/// Transport factory
pub struct TransportFactory;

impl TransportFactory {
    /// Create the transport selected by configuration
    pub fn create(config: &TransportConfig) -> Box<dyn Transport> {
        match config.kind {
            TransportKind::Websocket => Box::new(WebSocketTransport::new(config.clone())),
            TransportKind::Nats => Box::new(NatsTransport::new(config.clone())),
        }
    }
}

/// Forwards `Closed` for the first channel of a link to go down
#[derive(Clone)]
pub(crate) struct CloseNotifier {
    sent: Arc<AtomicBool>,
    inbound: mpsc::Sender<InboundEvent>,
}

impl CloseNotifier {
    pub(crate) fn new(inbound: mpsc::Sender<InboundEvent>) -> Self {
        Self {
            sent: Arc::new(AtomicBool::new(false)),
            inbound,
        }
    }

    pub(crate) async fn notify(&self, channel: Channel, reason: impl Into<String>) {
        if self.sent.swap(true, Ordering::SeqCst) {
            return;
        }
        let reason = reason.into();
        info!(%channel, %reason, "Transport channel closed");
        if self
            .inbound
            .send(InboundEvent::Closed { channel, reason })
            .await
            .is_err()
        {
            debug!("Inbound receiver dropped before close notification");
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.sent.load(Ordering::SeqCst)
    }
}
