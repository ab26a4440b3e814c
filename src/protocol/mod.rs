//! Protocol module - wire format and frame building.
//!
//! This module implements the binary protocol spoken with the live-room
//! message server:
//! - 16-byte big-endian header encoding/decoding
//! - contiguous outbound frame builders
//! - the join-room payload

mod frame;
mod wire_format;

pub use frame::{control_frame, frame_with_body, join_frame};
pub use wire_format::{
    ops, version, Header, HEADER_SIZE, HEARTBEAT_FRAME, MAX_BODY_SIZE, WRITE_PARAMETER,
};
