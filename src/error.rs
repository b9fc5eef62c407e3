// ABOUTME: Crate-wide error type
// ABOUTME: Per-chunk failures are logged and swallowed by callers; these variants are for per-session failures

use thiserror::Error;

/// Result type alias for sendspin-sync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can terminate a session or a single outbound operation.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport connection could not be established or was lost.
    #[error("connection error: {0}")]
    Connection(String),

    /// A WebSocket-level error (as opposed to a higher-level protocol error).
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// A malformed or unexpected protocol message.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A decoder failed to decode a chunk.
    #[error("decode error: {0}")]
    Decode(String),

    /// The audio sink failed to initialize or write.
    #[error("audio output error: {0}")]
    Output(String),

    /// A command was rejected because the server did not advertise support for it.
    #[error("unsupported command: {0}")]
    Unsupported(String),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
