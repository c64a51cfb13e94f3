//! Chat delta accumulator.
//!
//! Grows the assistant reply from streamed content deltas and sends user
//! turns (typed or recognized) to the backend as `chat` commands carrying
//! the conversation so far, plus `stop` when the user cuts a reply off.
//! History lives in memory only.

use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::arbitrator::ChatSubmit;
use crate::transport::{ChatMessage, ControlCommand, Sender};

#[derive(Default)]
struct ChatLog {
    messages: Vec<ChatMessage>,
    /// Assistant reply still being streamed
    streaming: Option<String>,
}

impl ChatLog {
    /// Move a partially streamed reply into the history
    fn finish_reply(&mut self) -> Option<usize> {
        let text = self.streaming.take()?;
        let len = text.len();
        self.messages.push(ChatMessage {
            sender: Sender::Assistant,
            text,
            timestamp: Some(chrono::Utc::now().to_rfc3339()),
        });
        Some(len)
    }
}

pub struct Conversation {
    outbound: mpsc::UnboundedSender<ControlCommand>,
    log: Mutex<ChatLog>,
}

impl Conversation {
    pub fn new(outbound: mpsc::UnboundedSender<ControlCommand>) -> Self {
        Self {
            outbound,
            log: Mutex::new(ChatLog::default()),
        }
    }

    /// Append an assistant content delta
    pub fn on_content(&self, delta: &str) {
        let mut log = self.lock();
        log.streaming.get_or_insert_with(String::new).push_str(delta);
    }

    /// The assistant reply is complete
    pub fn on_done(&self) {
        match self.lock().finish_reply() {
            Some(len) => info!(chars = len, "Assistant reply complete"),
            None => debug!("Completion flag without content"),
        }
    }

    /// Completed messages, oldest first
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.lock().messages.clone()
    }

    /// Assistant text streamed so far for the reply in progress
    pub fn pending_reply(&self) -> Option<String> {
        self.lock().streaming.clone()
    }

    fn lock(&self) -> MutexGuard<'_, ChatLog> {
        self.log.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Conversation {
    fn send(&self, command: ControlCommand) {
        let action = command.action();
        if self.outbound.send(command).is_err() {
            warn!(action, "Transport is closed, command not sent");
        }
    }
}

impl ChatSubmit for Conversation {
    fn submit(&self, text: String, speak: bool) {
        let messages = {
            let mut log = self.lock();
            // An interrupted reply is kept as far as it got
            log.finish_reply();
            log.messages.push(ChatMessage {
                sender: Sender::User,
                text,
                timestamp: Some(chrono::Utc::now().to_rfc3339()),
            });
            log.messages.clone()
        };

        self.send(ControlCommand::Chat {
            messages,
            tts_enabled: speak,
        });
    }

    fn cancel(&self) {
        // Keep what was streamed; later deltas start a fresh reply
        if let Some(len) = self.lock().finish_reply() {
            info!(chars = len, "Assistant reply cut off");
        }
        self.send(ControlCommand::Stop);
    }
}
