//! Error types for danmaku-client.

use thiserror::Error;

/// Main error type for all danmaku client operations.
#[derive(Debug, Error)]
pub enum DanmakuError {
    /// `connect` was called while the connection is not idle.
    #[error("connection is not idle")]
    InvalidState,

    /// Operation on a disposed connection.
    #[error("connection has been disposed")]
    Disposed,

    /// The server-info provider could not produce an endpoint or token.
    #[error("credentials unavailable: {0}")]
    CredentialUnavailable(String),

    /// The peer closed the transport.
    #[error("transport closed")]
    TransportClosed,

    /// I/O error during transport operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Inbound frame body exceeds the 64 KiB cap.
    #[error("frame body of {0} bytes exceeds maximum")]
    FrameTooLarge(usize),

    /// A heartbeat send took longer than one heartbeat interval.
    #[error("heartbeat send exceeded the heartbeat interval")]
    HeartbeatOverrun,

    /// The operation was cancelled through its shutdown token.
    #[error("operation cancelled")]
    Cancelled,

    /// Malformed frame or payload (invalid header, bad compression,
    /// unparseable JSON document).
    #[error("decode error: {0}")]
    Decode(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket protocol error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Invalid connection options.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl DanmakuError {
    /// Whether this error represents a clean, token-driven shutdown.
    ///
    /// A cancelled loop does not populate the `Disconnected` event's error.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DanmakuError::Cancelled)
    }
}

/// Result type alias using DanmakuError.
pub type Result<T> = std::result::Result<T, DanmakuError>;
