//! Transport module - byte-stream adapters underneath the connection core.
//!
//! The connection core relies on all-or-fail semantics: [`Transport::send`]
//! writes the whole buffer or fails, [`Transport::receive_exact`] fills the
//! whole buffer or fails. Partial reads and writes are handled inside the
//! adapter, and writes are serialized internally so the receive loop and the
//! heartbeat loop can share one transport.
//!
//! Both operations honour a shutdown token: cancelling it fails the pending
//! call with [`DanmakuError::Cancelled`], which is how the connection core
//! unblocks its loops during teardown.
//!
//! Variants:
//! - [`TcpTransport`] streams frames directly over a TCP socket
//! - [`WsTransport`] wraps each outbound frame in one binary WebSocket
//!   message and drains inbound binary messages through an accumulation
//!   buffer

mod tcp;
mod websocket;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{DanmakuError, Result};
use crate::provider::ServerInfo;

pub use tcp::TcpTransport;
pub use websocket::WsTransport;

/// Byte-level transport underneath a danmaku connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write `buf` in full, or fail.
    ///
    /// Writes from concurrent tasks are serialized internally.
    async fn send(&self, buf: &[u8], shutdown: &CancellationToken) -> Result<()>;

    /// Fill `buf` completely, or fail.
    async fn receive_exact(&self, buf: &mut [u8], shutdown: &CancellationToken) -> Result<()>;

    /// Close the transport. Subsequent operations fail.
    async fn close(&self);
}

/// Factory for transports, one per connection attempt.
///
/// This is the variant-specific half of `connect`: the TCP connector dials
/// the endpoint, the WebSocket connector performs the upgrade. Tests inject
/// scripted connectors through this seam.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a transport to the given server.
    async fn connect(
        &self,
        info: &ServerInfo,
        shutdown: &CancellationToken,
    ) -> Result<Arc<dyn Transport>>;
}

/// Connector for the raw-TCP transport variant.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(
        &self,
        info: &ServerInfo,
        shutdown: &CancellationToken,
    ) -> Result<Arc<dyn Transport>> {
        let transport = TcpTransport::connect(&info.host, info.port, shutdown).await?;
        Ok(Arc::new(transport))
    }
}

/// Connector for the WebSocket transport variant.
///
/// Upgrades `ws://{host}:{port}/sub` and speaks binary messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(
        &self,
        info: &ServerInfo,
        shutdown: &CancellationToken,
    ) -> Result<Arc<dyn Transport>> {
        let url = format!("ws://{}:{}/sub", info.host, info.port);
        let transport = WsTransport::connect(&url, shutdown).await?;
        Ok(Arc::new(transport))
    }
}

/// Race an I/O future against the shutdown token.
pub(crate) async fn with_shutdown<F, T>(shutdown: &CancellationToken, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    tokio::select! {
        _ = shutdown.cancelled() => Err(DanmakuError::Cancelled),
        result = fut => result,
    }
}
