//! WebSocket-binary transport variant.
//!
//! Each outbound frame becomes exactly one binary WebSocket message. On the
//! read side the peer's binary messages are accumulated into an internal
//! buffer from which `receive_exact` draws, so the byte-oriented receive
//! loop never sees message boundaries. Text, Ping and Pong messages are
//! ignored; a Close message or stream end maps to `TransportClosed`.

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{with_shutdown, Transport};
use crate::error::{DanmakuError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Read half plus the accumulation buffer it feeds.
struct WsReader {
    stream: SplitStream<WsStream>,
    buffer: BytesMut,
}

/// WebSocket transport speaking one binary message per protocol frame.
pub struct WsTransport {
    reader: Mutex<WsReader>,
    writer: Mutex<SplitSink<WsStream, Message>>,
}

impl WsTransport {
    /// Perform the WebSocket upgrade against `url`.
    pub async fn connect(url: &str, shutdown: &CancellationToken) -> Result<Self> {
        let (stream, _response) = with_shutdown(shutdown, async {
            connect_async(url).await.map_err(map_ws_error)
        })
        .await?;

        debug!(url, "WebSocket transport connected");
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already-upgraded stream.
    pub fn from_stream(stream: WsStream) -> Self {
        let (writer, reader) = stream.split();
        Self {
            reader: Mutex::new(WsReader {
                stream: reader,
                buffer: BytesMut::new(),
            }),
            writer: Mutex::new(writer),
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&self, buf: &[u8], shutdown: &CancellationToken) -> Result<()> {
        with_shutdown(shutdown, async {
            let mut writer = self.writer.lock().await;
            writer
                .send(Message::Binary(buf.to_vec()))
                .await
                .map_err(map_ws_error)
        })
        .await
    }

    async fn receive_exact(&self, buf: &mut [u8], shutdown: &CancellationToken) -> Result<()> {
        with_shutdown(shutdown, async {
            let mut reader = self.reader.lock().await;

            while reader.buffer.len() < buf.len() {
                match reader.stream.next().await {
                    Some(Ok(Message::Binary(data))) => reader.buffer.extend_from_slice(&data),
                    Some(Ok(Message::Close(_))) | None => {
                        return Err(DanmakuError::TransportClosed)
                    }
                    // Text, Ping, Pong and raw frames carry no protocol bytes.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(map_ws_error(e)),
                }
            }

            let front = reader.buffer.split_to(buf.len());
            buf.copy_from_slice(front.chunk());
            Ok(())
        })
        .await
    }

    async fn close(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.close().await;
    }
}

fn map_ws_error(e: WsError) -> DanmakuError {
    match e {
        WsError::ConnectionClosed | WsError::AlreadyClosed => DanmakuError::TransportClosed,
        WsError::Io(io) => DanmakuError::Io(io),
        other => DanmakuError::WebSocket(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    /// Local WebSocket server that sends the given binary messages, then
    /// echoes everything it receives back as a single binary message.
    async fn serve(messages: Vec<Vec<u8>>) -> (WsTransport, tokio::task::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            for m in messages {
                ws.send(Message::Binary(m)).await.unwrap();
            }

            let mut received = Vec::new();
            while let Some(Ok(msg)) = ws.next().await {
                if let Message::Binary(data) = msg {
                    received.extend_from_slice(&data);
                }
            }
            received
        });

        let url = format!("ws://{}/sub", addr);
        let transport = WsTransport::connect(&url, &CancellationToken::new())
            .await
            .unwrap();
        (transport, server)
    }

    #[tokio::test]
    async fn test_receive_exact_spans_messages() {
        let (transport, _server) = serve(vec![b"abc".to_vec(), b"defgh".to_vec()]).await;
        let token = CancellationToken::new();

        let mut buf = [0u8; 6];
        transport.receive_exact(&mut buf, &token).await.unwrap();
        assert_eq!(&buf, b"abcdef");

        // Remainder of the second message stays buffered.
        let mut rest = [0u8; 2];
        transport.receive_exact(&mut rest, &token).await.unwrap();
        assert_eq!(&rest, b"gh");
    }

    #[tokio::test]
    async fn test_send_delivers_binary_message() {
        let (transport, server) = serve(vec![]).await;
        let token = CancellationToken::new();

        transport.send(b"frame-bytes", &token).await.unwrap();
        transport.close().await;

        assert_eq!(server.await.unwrap(), b"frame-bytes");
    }

    #[tokio::test]
    async fn test_server_close_maps_to_transport_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.close(None).await.unwrap();
        });

        let url = format!("ws://{}/sub", addr);
        let transport = WsTransport::connect(&url, &CancellationToken::new())
            .await
            .unwrap();

        let mut buf = [0u8; 1];
        let result = transport
            .receive_exact(&mut buf, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(DanmakuError::TransportClosed)));
        server.await.unwrap();
    }
}
