//! # danmaku-client
//!
//! Async client for the Bilibili live-room danmaku (live-chat) protocol.
//!
//! The client keeps one persistent framed connection to a room's message
//! server: it performs the join handshake, keeps the session alive with
//! periodic heartbeats, demultiplexes inbound frames, and dispatches
//! decoded payloads to subscribed handlers.
//!
//! ## Architecture
//!
//! - **Protocol** ([`protocol`]): 16-byte big-endian frame header, join
//!   payload, heartbeat constant
//! - **Transport** ([`transport`]): all-or-fail byte adapters over raw TCP
//!   or binary WebSocket messages, cancellation-aware
//! - **Dispatch** ([`dispatch`]): type-indexed subscription table delivering
//!   [`Connected`](dispatch::Connected), [`Disconnected`](dispatch::Disconnected),
//!   [`Popularity`](dispatch::Popularity) and [`RawData`](dispatch::RawData)
//!   events to handlers in registration order
//! - **Connection** ([`Connection`]): the lifecycle state machine owning the
//!   receive loop, the heartbeat loop and the coordinated shutdown path
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use danmaku_client::provider::{ServerInfo, StaticServerInfo};
//! use danmaku_client::{CancellationToken, ConnectOptions, Connection};
//!
//! #[tokio::main]
//! async fn main() -> danmaku_client::Result<()> {
//!     let provider = Arc::new(StaticServerInfo::new(ServerInfo {
//!         host: "broadcastlv.chat.bilibili.com".into(),
//!         port: 2243,
//!         token: "...".into(),
//!     }));
//!
//!     let connection = Connection::builder(ConnectOptions::new(12345), provider)
//!         .invoker(my_subscriptions())
//!         .build()?;
//!
//!     connection.connect(&CancellationToken::new()).await?;
//!     // ... the receive and heartbeat loops run detached ...
//!     connection.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod provider;
pub mod transport;

mod classify;
mod connection;

pub use config::ConnectOptions;
pub use connection::{Connection, ConnectionBuilder};
pub use error::{DanmakuError, Result};

/// Re-exported so callers can hand `connect` a token without depending on
/// `tokio-util` directly.
pub use tokio_util::sync::CancellationToken;
