//! Console controls.
//!
//! A blocking thread reads stdin lines and forwards them as commands; the
//! async side applies them to the arbitrator. This is the terminal stand-in
//! for the hotkey and stop button.

use std::io::{self, BufRead};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::arbitrator::ArbitratorHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// `s` / `stop`
    StopPlayback,
    /// `l` / `listen`
    ToggleListening,
    /// `t` / `tts`
    ToggleSpeechOutput,
    /// `q` / `quit`
    Quit,
    /// Any other non-empty line
    Submit(String),
}

impl ConsoleCommand {
    /// Parse one input line; blank lines yield `None`
    pub fn parse(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        match trimmed {
            "" => None,
            "s" | "stop" => Some(Self::StopPlayback),
            "l" | "listen" => Some(Self::ToggleListening),
            "t" | "tts" => Some(Self::ToggleSpeechOutput),
            "q" | "quit" => Some(Self::Quit),
            text => Some(Self::Submit(text.to_string())),
        }
    }
}

/// Spawn a blocking thread that reads stdin lines and forwards parsed
/// commands through the returned channel
///
/// The thread exits when stdin is closed or the receiver is dropped.
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<ConsoleCommand> {
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        let stdin = io::stdin();
        let reader = stdin.lock();
        for line in reader.lines() {
            match line {
                Ok(text) => {
                    let Some(command) = ConsoleCommand::parse(&text) else {
                        continue;
                    };
                    debug!(?command, "Console command");
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!("stdin read error: {}", e);
                    break;
                }
            }
        }
        debug!("stdin reader thread exiting");
    });

    rx
}

/// Apply console commands until `quit` or end of input
///
/// Returns true when the user asked to quit.
pub async fn run(
    mut commands: mpsc::UnboundedReceiver<ConsoleCommand>,
    arbitrator: ArbitratorHandle,
) -> bool {
    while let Some(command) = commands.recv().await {
        match command {
            ConsoleCommand::StopPlayback => arbitrator.interrupt(),
            ConsoleCommand::ToggleListening => arbitrator.toggle_listening(),
            ConsoleCommand::ToggleSpeechOutput => arbitrator.toggle_speech_output(),
            ConsoleCommand::Submit(text) => arbitrator.submit(text),
            ConsoleCommand::Quit => {
                info!("Quit requested from console");
                return true;
            }
        }
    }
    info!("Console input closed");
    false
}
