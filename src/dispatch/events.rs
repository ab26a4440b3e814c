//! Messages emitted by a connection.

use std::any::Any;
use std::fmt;
use std::time::SystemTime;

use crate::error::DanmakuError;

/// Supertype of everything the invoker can deliver.
///
/// Exact-type handlers subscribe per concrete message type; blanket handlers
/// subscribe to this trait and receive every message, downcasting through
/// [`Message::as_any`] when they care about specific kinds.
pub trait Message: Any + Send + Sync + fmt::Debug {
    /// Upcast for downcasting in blanket handlers.
    fn as_any(&self) -> &dyn Any;
}

/// The session completed its join handshake.
#[derive(Debug, Clone)]
pub struct Connected {
    /// Wall-clock time the connect-ack arrived.
    pub time: SystemTime,
}

/// The session ended.
///
/// Emitted at most once per connect-disconnect cycle, strictly after the
/// last delivered message. `error` is `None` for a clean or cancelled
/// shutdown.
#[derive(Debug)]
pub struct Disconnected {
    /// The failure that tore the session down, if any.
    pub error: Option<DanmakuError>,
    /// Wall-clock time of the teardown.
    pub time: SystemTime,
}

/// Viewer-attention metric pushed periodically by the server.
#[derive(Debug, Clone)]
pub struct Popularity {
    /// Popularity count.
    pub value: u32,
    /// Wall-clock time the frame was decoded.
    pub time: SystemTime,
}

/// One undecoded JSON document from an action-5 frame.
///
/// A parser stage subscribed to this type can turn documents into typed
/// domain messages and publish them back through the invoker.
#[derive(Debug, Clone)]
pub struct RawData {
    /// The document as parsed JSON.
    pub json: serde_json::Value,
}

impl Message for Connected {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Message for Disconnected {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Message for Popularity {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Message for RawData {
    fn as_any(&self) -> &dyn Any {
        self
    }
}
