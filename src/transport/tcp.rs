//! Raw-TCP transport variant.
//!
//! The stream is split into owned halves: the read half belongs to the
//! receive loop, the write half is shared between the heartbeat loop and
//! `connect`, so each half sits behind its own async mutex.

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{with_shutdown, Transport};
use crate::error::{DanmakuError, Result};

/// TCP transport speaking raw protocol frames.
pub struct TcpTransport {
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
}

impl TcpTransport {
    /// Dial `host:port`.
    pub async fn connect(host: &str, port: u16, shutdown: &CancellationToken) -> Result<Self> {
        let stream = with_shutdown(shutdown, async {
            TcpStream::connect((host, port)).await.map_err(Into::into)
        })
        .await?;

        debug!(host, port, "TCP transport connected");
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already-connected stream.
    pub fn from_stream(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&self, buf: &[u8], shutdown: &CancellationToken) -> Result<()> {
        with_shutdown(shutdown, async {
            let mut writer = self.writer.lock().await;
            writer.write_all(buf).await?;
            writer.flush().await?;
            Ok(())
        })
        .await
    }

    async fn receive_exact(&self, buf: &mut [u8], shutdown: &CancellationToken) -> Result<()> {
        with_shutdown(shutdown, async {
            let mut reader = self.reader.lock().await;
            match reader.read_exact(buf).await {
                Ok(_) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    Err(DanmakuError::TransportClosed)
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn close(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn pair() -> (TcpTransport, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move {
            TcpTransport::connect("127.0.0.1", addr.port(), &CancellationToken::new())
                .await
                .unwrap()
        });
        let (server, _) = listener.accept().await.unwrap();
        (client.await.unwrap(), server)
    }

    #[tokio::test]
    async fn test_send_writes_whole_buffer() {
        let (transport, mut server) = pair().await;
        let token = CancellationToken::new();

        transport.send(b"hello frame", &token).await.unwrap();

        let mut buf = vec![0u8; 11];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello frame");
    }

    #[tokio::test]
    async fn test_receive_exact_fills_buffer_across_writes() {
        let (transport, mut server) = pair().await;
        let token = CancellationToken::new();

        server.write_all(b"abc").await.unwrap();
        let reader = tokio::spawn(async move {
            let mut buf = [0u8; 6];
            transport.receive_exact(&mut buf, &token).await.unwrap();
            buf
        });
        server.write_all(b"def").await.unwrap();

        assert_eq!(&reader.await.unwrap(), b"abcdef");
    }

    #[tokio::test]
    async fn test_receive_eof_maps_to_transport_closed() {
        let (transport, server) = pair().await;
        drop(server);

        let mut buf = [0u8; 4];
        let result = transport
            .receive_exact(&mut buf, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(DanmakuError::TransportClosed)));
    }

    #[tokio::test]
    async fn test_cancellation_unblocks_pending_read() {
        let (transport, _server) = pair().await;
        let token = CancellationToken::new();

        let reader = {
            let token = token.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 4];
                transport.receive_exact(&mut buf, &token).await
            })
        };

        token.cancel();
        assert!(matches!(
            reader.await.unwrap(),
            Err(DanmakuError::Cancelled)
        ));
    }
}
