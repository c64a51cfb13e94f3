use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::messages::InboundEvent;
use crate::arbitrator::ArbitratorHandle;
use crate::chat::Conversation;
use crate::playback::PlaybackHandle;
use crate::speech::RemoteRecognizer;

/// Consumer of an inbound event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Playback,
    Speech,
    Chat,
    Arbitrator,
}

/// Pick the single consumer of an event from its variant
pub fn route(event: &InboundEvent) -> Route {
    match event {
        InboundEvent::FormatAnnounced(_)
        | InboundEvent::AudioData(_)
        | InboundEvent::EndOfUtterance => Route::Playback,
        InboundEvent::ListeningStatus(_) | InboundEvent::RecognizedText(_) => Route::Speech,
        InboundEvent::Content(_) | InboundEvent::ContentDone => Route::Chat,
        InboundEvent::Closed { .. } => Route::Arbitrator,
    }
}

/// Routes decoded inbound events to the component that owns them
pub struct Demux {
    playback: PlaybackHandle,
    recognizer: Arc<RemoteRecognizer>,
    chat: Arc<Conversation>,
    arbitrator: ArbitratorHandle,
}

impl Demux {
    pub fn new(
        playback: PlaybackHandle,
        recognizer: Arc<RemoteRecognizer>,
        chat: Arc<Conversation>,
        arbitrator: ArbitratorHandle,
    ) -> Self {
        Self {
            playback,
            recognizer,
            chat,
            arbitrator,
        }
    }

    pub fn dispatch(&self, event: InboundEvent) {
        debug!(route = ?route(&event), "Inbound event");

        match event {
            InboundEvent::FormatAnnounced(format) => self.playback.announce_format(format),
            InboundEvent::AudioData(bytes) => self.playback.enqueue(bytes),
            InboundEvent::EndOfUtterance => self.playback.enqueue(Vec::new()),
            InboundEvent::ListeningStatus(listening) => {
                self.recognizer.on_listening_status(listening)
            }
            InboundEvent::RecognizedText(text) => self.recognizer.on_recognized_text(text),
            InboundEvent::Content(delta) => self.chat.on_content(&delta),
            InboundEvent::ContentDone => self.chat.on_done(),
            InboundEvent::Closed { .. } => self.arbitrator.transport_closed(),
        }
    }

    /// Dispatch until the transport's inbound side ends
    ///
    /// An inbound stream that ends without a close event still counts as the
    /// transport closing.
    pub async fn run(self, mut inbound: mpsc::Receiver<InboundEvent>) {
        let mut closed = false;

        while let Some(event) = inbound.recv().await {
            closed |= matches!(event, InboundEvent::Closed { .. });
            self.dispatch(event);
        }

        if !closed {
            self.arbitrator.transport_closed();
        }
        info!("Inbound stream ended");
    }
}
