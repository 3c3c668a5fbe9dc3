use std::time::Duration;

use thiserror::Error;

use crate::live::session::SessionState;

#[derive(Error, Debug)]
pub enum LiveError {
    #[error("failed to connect to relay {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no thread acknowledgement within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("relay stream error: {0}")]
    Codec(#[from] CodecError),

    #[error("player status is {status} ({code})")]
    StatusNotOk { status: String, code: String },

    #[error("failed to parse player status: {0}")]
    StatusParse(String),

    #[error("failed to get post key: {0}")]
    PostKey(String),

    #[error("invalid session transition {from:?} -> {to:?}")]
    InvalidTransition { from: SessionState, to: SessionState },

    #[error("session is not streaming")]
    NotStreaming,

    #[error("session closed before the comment was written")]
    Closed,

    #[error("not a live id: {0}")]
    InvalidLiveId(String),
}

/// Fragment-level decode failure. Never escapes the reader loop.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed fragment: {0}")]
    Malformed(String),
}
