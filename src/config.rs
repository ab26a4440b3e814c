//! Connection options.
//!
//! [`ConnectOptions`] carries everything a [`Connection`](crate::Connection)
//! needs to join a room: the room id, the uid sent in the join payload, the
//! heartbeat cadence, and the protocol version advertised to the server.

use std::time::Duration;

use crate::error::{DanmakuError, Result};

/// Default heartbeat interval (the server expects one every 30 s).
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default protocol version advertised in the join payload.
///
/// Version 2 wraps action-5 bodies in zlib-compressed sub-frames.
pub const DEFAULT_PROTOCOL_VERSION: u16 = 2;

/// Highest protocol version the wire format defines.
pub const MAX_PROTOCOL_VERSION: u16 = 3;

/// Options for a danmaku connection.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Live-room id to join.
    pub room_id: u64,
    /// User id sent in the join payload (0 for anonymous).
    pub uid: u64,
    /// Interval between outbound heartbeat frames. Must be positive.
    pub heartbeat_interval: Duration,
    /// Protocol version requested in the join payload (0-3).
    pub protocol_version: u16,
}

impl ConnectOptions {
    /// Create options for a room with the default heartbeat cadence and
    /// protocol version.
    pub fn new(room_id: u64) -> Self {
        Self {
            room_id,
            uid: 0,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            protocol_version: DEFAULT_PROTOCOL_VERSION,
        }
    }

    /// Set the uid sent in the join payload.
    pub fn uid(mut self, uid: u64) -> Self {
        self.uid = uid;
        self
    }

    /// Set the heartbeat interval.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the protocol version (0-3).
    pub fn protocol_version(mut self, version: u16) -> Self {
        self.protocol_version = version;
        self
    }

    /// Validate the options.
    ///
    /// Checks:
    /// - heartbeat interval is positive
    /// - protocol version is within the defined range
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval.is_zero() {
            return Err(DanmakuError::Config(
                "heartbeat interval must be positive".to_string(),
            ));
        }

        if self.protocol_version > MAX_PROTOCOL_VERSION {
            return Err(DanmakuError::Config(format!(
                "protocol version {} out of range 0-{}",
                self.protocol_version, MAX_PROTOCOL_VERSION
            )));
        }

        Ok(())
    }
}
