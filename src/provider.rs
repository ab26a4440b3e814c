//! Server-info provider seam.
//!
//! The connection core treats endpoint discovery as opaque: a provider turns
//! a room id into a host, port and auth token. Real deployments query the
//! room-info HTTP API; tests and fixed setups use [`StaticServerInfo`].

use async_trait::async_trait;

use crate::error::Result;

/// Endpoint and auth token for one danmaku server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    /// Message-server hostname.
    pub host: String,
    /// Message-server port.
    pub port: u16,
    /// Auth token sent as `key` in the join payload.
    pub token: String,
}

/// Produces the endpoint and auth token for a room.
///
/// Failures surface to `connect` as
/// [`CredentialUnavailable`](crate::DanmakuError::CredentialUnavailable).
#[async_trait]
pub trait ServerInfoProvider: Send + Sync {
    /// Resolve the server info for `room_id`.
    async fn resolve(&self, room_id: u64) -> Result<ServerInfo>;
}

/// Provider returning a fixed endpoint and token for every room.
#[derive(Debug, Clone)]
pub struct StaticServerInfo {
    info: ServerInfo,
}

impl StaticServerInfo {
    /// Create a provider that always resolves to `info`.
    pub fn new(info: ServerInfo) -> Self {
        Self { info }
    }
}

#[async_trait]
impl ServerInfoProvider for StaticServerInfo {
    async fn resolve(&self, _room_id: u64) -> Result<ServerInfo> {
        Ok(self.info.clone())
    }
}
