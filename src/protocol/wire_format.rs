//! Wire format encoding and decoding.
//!
//! Implements the 16-byte header format:
//! ```text
//! ┌───────────────┬───────────────┬─────────────────┬───────────┬───────────┐
//! │ Packet Length │ Header Length │ Protocol Version│ Action    │ Parameter │
//! │ 4 bytes       │ 2 bytes       │ 2 bytes         │ 4 bytes   │ 4 bytes   │
//! │ uint32 BE     │ uint16 BE     │ uint16 BE       │ uint32 BE │ uint32 BE │
//! └───────────────┴───────────────┴─────────────────┴───────────┴───────────┘
//! ```
//!
//! All multi-byte integers are Big Endian. `packet_length` covers the whole
//! frame including the header; `header_length` is always 16.

use crate::error::{DanmakuError, Result};

/// Header size in bytes (fixed, exactly 16).
pub const HEADER_SIZE: usize = 16;

/// Maximum accepted inbound body size in bytes.
pub const MAX_BODY_SIZE: usize = 65535;

/// Value of the `parameter` field on every outbound frame.
pub const WRITE_PARAMETER: u32 = 1;

/// The fixed heartbeat frame, sent verbatim on every heartbeat tick.
pub const HEARTBEAT_FRAME: [u8; HEADER_SIZE] = [
    0x00, 0x00, 0x00, 0x10, // packet_length = 16
    0x00, 0x10, // header_length = 16
    0x00, 0x02, // protocol_version = 2
    0x00, 0x00, 0x00, 0x02, // action = heartbeat
    0x00, 0x00, 0x00, 0x01, // parameter = 1
];

/// Action codes used by this client.
pub mod ops {
    /// Heartbeat (outbound, empty body).
    pub const HEARTBEAT: u32 = 2;
    /// Popularity count (inbound, 4-byte big-endian body).
    pub const POPULARITY: u32 = 3;
    /// Regular message (inbound, JSON or compressed sub-frames).
    pub const MESSAGE: u32 = 5;
    /// Join room (outbound, JSON body).
    pub const JOIN: u32 = 7;
    /// Connect acknowledgment (inbound, reply to join).
    pub const CONNECT_ACK: u32 = 8;
}

/// Protocol version values carried in the header.
pub mod version {
    /// Plain body (one JSON document).
    pub const PLAIN: u16 = 0;
    /// Header-only popularity frame.
    pub const POPULARITY: u16 = 1;
    /// Body is zlib-deflated concatenated sub-frames.
    pub const DEFLATE: u16 = 2;
    /// Body is brotli-wrapped sub-frames (not carried by this client).
    pub const BROTLI: u16 = 3;
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Total frame size including the 16-byte header.
    pub packet_length: u32,
    /// Header size on the wire (always 16).
    pub header_length: u16,
    /// Protocol version of the body (see [`version`]).
    pub protocol_version: u16,
    /// Operation code (see [`ops`]).
    pub action: u32,
    /// Always 1 on write; ignored on read.
    pub parameter: u32,
}

impl Header {
    /// Create a header for an outbound frame with the given body length.
    pub fn for_body(action: u32, protocol_version: u16, body_length: usize) -> Self {
        Self {
            packet_length: (HEADER_SIZE + body_length) as u32,
            header_length: HEADER_SIZE as u16,
            protocol_version,
            action,
            parameter: WRITE_PARAMETER,
        }
    }

    /// Create a header for an outbound control frame (empty body).
    pub fn control(action: u32, protocol_version: u16) -> Self {
        Self::for_body(action, protocol_version, 0)
    }

    /// Encode header to bytes (Big Endian).
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (16 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0..4].copy_from_slice(&self.packet_length.to_be_bytes());
        buf[4..6].copy_from_slice(&self.header_length.to_be_bytes());
        buf[6..8].copy_from_slice(&self.protocol_version.to_be_bytes());
        buf[8..12].copy_from_slice(&self.action.to_be_bytes());
        buf[12..16].copy_from_slice(&self.parameter.to_be_bytes());
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Validates the header-length magic and that `packet_length` covers at
    /// least the header itself.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(DanmakuError::Decode(format!(
                "header needs {} bytes, got {}",
                HEADER_SIZE,
                buf.len()
            )));
        }

        let header = Self {
            packet_length: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            header_length: u16::from_be_bytes([buf[4], buf[5]]),
            protocol_version: u16::from_be_bytes([buf[6], buf[7]]),
            action: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            parameter: u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]),
        };

        if header.header_length != HEADER_SIZE as u16 {
            return Err(DanmakuError::Decode(format!(
                "header length {} != {}",
                header.header_length, HEADER_SIZE
            )));
        }

        if (header.packet_length as usize) < HEADER_SIZE {
            return Err(DanmakuError::Decode(format!(
                "packet length {} smaller than header",
                header.packet_length
            )));
        }

        Ok(header)
    }

    /// Body length implied by `packet_length`.
    #[inline]
    pub fn body_length(&self) -> usize {
        self.packet_length as usize - HEADER_SIZE
    }
}
