//! In-process UCI responder
//!
//! Answers the handshake and readiness probes like a real engine and, on
//! `go`, replays canned `info` lines for the position it was given. Used
//! for offline runs and throughout the tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Notify;

use super::info::InfoRecord;
use super::link::{EngineEndpoint, EngineLink};
use super::session::{EngineSource, BOOTSTRAP_FAILED};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handshake {
    Answer,
    Silent,
    BootstrapFailure,
}

/// Every command a scripted engine received, in order
#[derive(Debug, Clone, Default)]
pub struct CommandJournal {
    inner: Arc<JournalInner>,
}

#[derive(Debug, Default)]
struct JournalInner {
    commands: Mutex<Vec<String>>,
    changed: Notify,
}

impl CommandJournal {
    pub fn commands(&self) -> Vec<String> {
        self.inner
            .commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn contains(&self, prefix: &str) -> bool {
        self.commands().iter().any(|cmd| cmd.starts_with(prefix))
    }

    /// Resolves once a command starting with `prefix` has been received
    pub async fn wait_for(&self, prefix: &str) {
        loop {
            let changed = self.inner.changed.notified();
            if self.contains(prefix) {
                return;
            }
            changed.await;
        }
    }

    fn record(&self, cmd: &str) {
        self.inner
            .commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(cmd.to_string());
        self.inner.changed.notify_waiters();
    }
}

#[derive(Debug, Clone)]
pub struct ScriptedEngine {
    positions: HashMap<String, Vec<String>>,
    default_lines: Vec<String>,
    finishes: bool,
    enveloped: bool,
    handshake: Handshake,
    journal: CommandJournal,
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            positions: HashMap::new(),
            default_lines: Vec::new(),
            finishes: true,
            enveloped: false,
            handshake: Handshake::Answer,
            journal: CommandJournal::default(),
        }
    }

    /// Info lines replayed on `go` when the position matches `fen`
    pub fn on_position<I, S>(mut self, fen: impl Into<String>, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.positions
            .insert(fen.into(), lines.into_iter().map(Into::into).collect());
        self
    }

    /// Info lines replayed on `go` for any other position
    pub fn default_lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_lines = lines.into_iter().map(Into::into).collect();
        self
    }

    /// Keeps searching until told to `stop`
    pub fn without_bestmove(mut self) -> Self {
        self.finishes = false;
        self
    }

    /// Wraps every delivery in a `{"type":"stdout","data":...}` envelope
    pub fn enveloped(mut self) -> Self {
        self.enveloped = true;
        self
    }

    /// Never answers anything
    pub fn silent(mut self) -> Self {
        self.handshake = Handshake::Silent;
        self
    }

    /// Answers `uci` the way a bootstrap loader reports total failure
    pub fn failing_bootstrap(mut self) -> Self {
        self.handshake = Handshake::BootstrapFailure;
        self
    }

    pub fn journal(&self) -> CommandJournal {
        self.journal.clone()
    }

    /// Starts a responder task and returns the client side of its link
    pub fn spawn(&self) -> EngineLink {
        let (link, endpoint) = EngineLink::pair();
        let engine = self.clone();
        tokio::spawn(async move { engine.run(endpoint).await });
        link
    }

    /// A source that spawns a fresh responder for every connection
    pub fn source(self, label: &str) -> EngineSource {
        EngineSource::channel(label, move || Ok(self.spawn()))
    }

    async fn run(self, mut endpoint: EngineEndpoint) {
        let mut fen: Option<String> = None;
        let mut searching: Option<String> = None;

        while let Some(cmd) = endpoint.commands.recv().await {
            self.journal.record(&cmd);

            if self.handshake == Handshake::Silent {
                continue;
            }

            match cmd.split_whitespace().next() {
                Some("uci") => {
                    if self.handshake == Handshake::BootstrapFailure {
                        self.deliver(&endpoint, BOOTSTRAP_FAILED);
                    } else {
                        self.deliver(&endpoint, "id name Scripted\nid author position-trainer");
                        self.deliver(&endpoint, "uciok");
                    }
                }
                Some("isready") => self.deliver(&endpoint, "readyok"),
                Some("position") => {
                    fen = cmd.strip_prefix("position fen ").map(|f| f.trim().to_string());
                }
                Some("go") => {
                    let lines = fen
                        .as_ref()
                        .and_then(|f| self.positions.get(f))
                        .unwrap_or(&self.default_lines);
                    for line in lines {
                        self.deliver(&endpoint, line);
                    }
                    let bestmove = bestmove_line(lines);
                    if self.finishes {
                        self.deliver(&endpoint, &bestmove);
                    } else {
                        searching = Some(bestmove);
                    }
                }
                Some("stop") => {
                    if let Some(bestmove) = searching.take() {
                        self.deliver(&endpoint, &bestmove);
                    }
                }
                Some("quit") => break,
                _ => {}
            }
        }
    }

    fn deliver(&self, endpoint: &EngineEndpoint, text: &str) {
        let delivery = if self.enveloped {
            serde_json::json!({ "type": "stdout", "data": text }).to_string()
        } else {
            text.to_string()
        };
        endpoint.deliver(delivery);
    }
}

fn bestmove_line(lines: &[String]) -> String {
    let best = lines
        .iter()
        .filter_map(|line| InfoRecord::parse(line).ok())
        .filter(|info| info.rank == 1)
        .last()
        .and_then(|info| info.pv.into_iter().next());

    match best {
        Some(mv) => format!("bestmove {}", mv),
        None => "bestmove (none)".to_string(),
    }
}
