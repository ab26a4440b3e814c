//! Outbound frame builders and the join-room payload.
//!
//! Frames are built into a single contiguous buffer (header + body) so the
//! transport makes exactly one `send` call per frame with no intermediate
//! copies.

use serde::Serialize;

use super::wire_format::{Header, HEADER_SIZE};
use crate::config::ConnectOptions;
use crate::error::Result;
use crate::protocol::ops;

/// Platform string sent in the join payload.
const JOIN_PLATFORM: &str = "web";

/// Client version string sent in the join payload.
const JOIN_CLIENT_VERSION: &str = "1.13.4";

/// Join type discriminator sent in the join payload.
const JOIN_TYPE: u8 = 2;

/// Build a control frame (empty body) as a 16-byte array.
pub fn control_frame(action: u32, protocol_version: u16) -> [u8; HEADER_SIZE] {
    Header::control(action, protocol_version).encode()
}

/// Build a complete frame as a single byte vector.
///
/// Encodes the header and appends the body into one contiguous buffer.
pub fn frame_with_body(action: u32, protocol_version: u16, body: &[u8]) -> Vec<u8> {
    let header = Header::for_body(action, protocol_version, body.len());
    let mut buf = Vec::with_capacity(HEADER_SIZE + body.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(body);
    buf
}

/// JSON body of the join-room frame.
///
/// Field order matters: the serializer emits fields in declaration order and
/// the server-visible document is part of the wire contract.
#[derive(Debug, Serialize)]
struct JoinPayload<'a> {
    uid: u64,
    roomid: u64,
    protover: u16,
    platform: &'static str,
    clientver: &'static str,
    #[serde(rename = "type")]
    join_type: u8,
    key: &'a str,
}

/// Build the action-7 join frame for a room.
///
/// The body is the UTF-8 JSON join payload; `token` is the auth key obtained
/// from the server-info provider.
pub fn join_frame(options: &ConnectOptions, token: &str) -> Result<Vec<u8>> {
    let payload = JoinPayload {
        uid: options.uid,
        roomid: options.room_id,
        protover: options.protocol_version,
        platform: JOIN_PLATFORM,
        clientver: JOIN_CLIENT_VERSION,
        join_type: JOIN_TYPE,
        key: token,
    };

    let body = serde_json::to_vec(&payload)?;
    Ok(frame_with_body(ops::JOIN, options.protocol_version, &body))
}
