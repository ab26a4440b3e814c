//! Payload classifier - maps decoded frames to semantic events.
//!
//! Action 3 carries a big-endian popularity count, action 5 carries one JSON
//! document (protocol version 0/1) or a zlib-deflated run of concatenated
//! sub-frames (version 2) that the classifier walks recursively. Version 3
//! (brotli) is not carried by this client and is reported as a per-frame
//! decode error; the receive loop drops such frames without ending the
//! session.

use std::io::Read;
use std::time::SystemTime;

use flate2::read::ZlibDecoder;
use tracing::trace;

use crate::dispatch::{Invoker, Popularity, RawData};
use crate::error::{DanmakuError, Result};
use crate::protocol::{ops, version, Header, HEADER_SIZE};

/// Classify one decoded frame and publish the resulting events.
///
/// Handler errors propagate to the caller; the receive loop swallows them
/// there. `scratch` is the reusable decompression buffer owned by the loop.
pub(crate) async fn classify_frame(
    header: &Header,
    body: &[u8],
    scratch: &mut Vec<u8>,
    invoker: &Invoker,
) -> Result<()> {
    match header.action {
        ops::POPULARITY => {
            if body.len() < 4 {
                return Err(DanmakuError::Decode(format!(
                    "popularity body of {} bytes, need 4",
                    body.len()
                )));
            }
            let value = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
            invoker
                .publish(&Popularity {
                    value,
                    time: SystemTime::now(),
                })
                .await
        }

        ops::MESSAGE => match header.protocol_version {
            version::PLAIN | version::POPULARITY => {
                let json = serde_json::from_slice(body)?;
                invoker.publish(&RawData { json }).await
            }
            version::DEFLATE => {
                inflate_into(body, scratch)?;
                // Move the inflated bytes out so nested frames can borrow a
                // fresh scratch; the allocation is handed back afterwards.
                let inflated = std::mem::take(scratch);
                let result = walk_sub_frames(&inflated, invoker).await;
                *scratch = inflated;
                result
            }
            version::BROTLI => Err(DanmakuError::Decode(
                "brotli-wrapped frames are not supported".to_string(),
            )),
            other => Err(DanmakuError::Decode(format!(
                "unknown protocol version {other}"
            ))),
        },

        // The connection core consumes connect-acks before classification.
        ops::CONNECT_ACK => Ok(()),

        other => {
            trace!(action = other, "dropping frame with unknown action");
            Ok(())
        }
    }
}

/// Walk concatenated sub-frames, each with its own 16-byte header.
async fn walk_sub_frames(data: &[u8], invoker: &Invoker) -> Result<()> {
    let mut offset = 0;
    let mut nested_scratch = Vec::new();

    while offset < data.len() {
        if offset + HEADER_SIZE > data.len() {
            return Err(DanmakuError::Decode(format!(
                "trailing {} bytes after last sub-frame",
                data.len() - offset
            )));
        }

        let header = Header::decode(&data[offset..offset + HEADER_SIZE])?;
        let end = offset + header.packet_length as usize;
        if end > data.len() {
            return Err(DanmakuError::Decode(format!(
                "sub-frame of {} bytes overruns buffer",
                header.packet_length
            )));
        }

        let body = &data[offset + HEADER_SIZE..end];
        Box::pin(classify_frame(&header, body, &mut nested_scratch, invoker)).await?;
        offset = end;
    }

    Ok(())
}

/// Inflate a zlib-deflated body into the scratch buffer.
fn inflate_into(body: &[u8], scratch: &mut Vec<u8>) -> Result<()> {
    scratch.clear();
    let mut decoder = ZlibDecoder::new(body);
    decoder
        .read_to_end(scratch)
        .map_err(|e| DanmakuError::Decode(format!("inflate failed: {e}")))?;
    Ok(())
}
