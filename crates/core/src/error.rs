//! Error types for position-trainer-core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("No analysis engine could be started")]
    ConnectionUnavailable,

    #[error("Engine is busy with another analysis")]
    EngineBusy,

    #[error("No game in the database matches the requested interval")]
    NoMatchingGame,

    #[error("No database loaded")]
    NoDatabase,

    #[error("Malformed engine record: {0}")]
    MalformedRecord(String),

    #[error("Could not evaluate the submitted move: {0}")]
    GradingIndeterminate(String),

    #[error("Timed out waiting for {0}")]
    StepTimeout(&'static str),

    #[error("Engine did not acknowledge the handshake in time")]
    HandshakeTimeout,

    #[error("Engine bootstrap failed")]
    BootstrapFailed,

    #[error("Engine connection closed")]
    Disconnected,

    #[error("Illegal move: {0}")]
    IllegalMove(String),

    #[error("Invalid position: {0}")]
    InvalidPosition(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
