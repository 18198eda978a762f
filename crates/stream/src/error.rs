use thiserror::Error;

use crate::ConnectionId;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Connection {0} is closed")]
    ConnectionClosed(ConnectionId),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Event stream endpoint answered with status {0}")]
    UnexpectedStatus(u16),

    #[error("Transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, StreamError>;
