//! Bidirectional text link to a UCI engine
//!
//! Whatever hosts the engine (a child process, a loader that is still
//! looking for a binary, an in-process responder), the rest of the crate
//! only sees a pair of channels: commands go out one line at a time and
//! deliveries come back in. A delivery is either a raw text block or a
//! JSON envelope `{"type":"stdout","data":"..."}`; both are unwrapped and
//! split into lines here.

use serde::Deserialize;
use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Engine-side half of a link
pub struct EngineEndpoint {
    /// Commands sent by the client
    pub commands: UnboundedReceiver<String>,
    /// Deliveries back to the client
    pub deliveries: UnboundedSender<String>,
}

impl EngineEndpoint {
    /// Sends one delivery; false once the client has gone away
    pub fn deliver(&self, text: impl Into<String>) -> bool {
        self.deliveries.send(text.into()).is_ok()
    }
}

/// Client-side half of a link
pub struct EngineLink {
    commands: UnboundedSender<String>,
    deliveries: UnboundedReceiver<String>,
    pending: VecDeque<String>,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: Option<String>,
    data: Option<serde_json::Value>,
}

impl EngineLink {
    /// Creates a connected link and endpoint
    pub fn pair() -> (EngineLink, EngineEndpoint) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();

        let link = EngineLink {
            commands: command_tx,
            deliveries: delivery_rx,
            pending: VecDeque::new(),
        };
        let endpoint = EngineEndpoint {
            commands: command_rx,
            deliveries: delivery_tx,
        };
        (link, endpoint)
    }

    /// Spawns an engine binary and pumps its stdin/stdout through a link.
    ///
    /// The child is killed when the link is dropped.
    pub fn spawn_process(path: &Path) -> Result<EngineLink> {
        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Io(std::io::Error::other("engine stdin unavailable")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Io(std::io::Error::other("engine stdout unavailable")))?;

        let (link, endpoint) = EngineLink::pair();
        let EngineEndpoint {
            mut commands,
            deliveries,
        } = endpoint;

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if deliveries.send(line).is_err() {
                    break;
                }
            }
            debug!("engine stdout closed");
        });

        let label = path.display().to_string();
        tokio::spawn(async move {
            while let Some(cmd) = commands.recv().await {
                let written = stdin.write_all(format!("{cmd}\n").as_bytes()).await;
                if let Err(e) = written.and(stdin.flush().await) {
                    warn!(engine = label.as_str(), "write to engine failed: {}", e);
                    break;
                }
            }
            // Dropping the child kills the process
            drop(child);
        });

        Ok(link)
    }

    /// Sends one command line
    pub fn send(&self, cmd: &str) -> Result<()> {
        debug!(cmd, "engine <");
        self.commands
            .send(cmd.to_string())
            .map_err(|_| Error::Disconnected)
    }

    /// Next text line from the engine, `None` once the link is closed
    pub async fn next_line(&mut self) -> Option<String> {
        loop {
            if let Some(line) = self.pending.pop_front() {
                debug!(line = line.as_str(), "engine >");
                return Some(line);
            }
            let delivery = self.deliveries.recv().await?;
            self.pending.extend(decode_delivery(&delivery));
        }
    }

    /// Discards everything already delivered but not yet read.
    ///
    /// Returns false if the link turned out to be closed.
    pub fn drain(&mut self) -> bool {
        let mut dropped = self.pending.len();
        self.pending.clear();
        loop {
            match self.deliveries.try_recv() {
                Ok(_) => dropped += 1,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
        if dropped > 0 {
            debug!(dropped, "discarded stale engine output");
        }
        true
    }

    /// True once either direction is gone, e.g. the engine process exited
    /// while its stdin pump is still waiting for commands
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed() || self.deliveries.is_closed()
    }
}

/// Unwraps a delivery into its text lines
pub fn decode_delivery(delivery: &str) -> Vec<String> {
    let trimmed = delivery.trim_start();
    if trimmed.starts_with('{') {
        if let Ok(envelope) = serde_json::from_str::<Envelope>(trimmed) {
            if matches!(envelope.kind.as_deref(), Some(kind) if kind != "stdout") {
                return Vec::new();
            }
            return match envelope.data {
                Some(serde_json::Value::String(text)) => split_lines(&text),
                Some(other) => split_lines(&other.to_string()),
                None => Vec::new(),
            };
        }
    }
    split_lines(delivery)
}

fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}
