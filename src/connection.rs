//! Connection core - lifecycle state machine and background loops.
//!
//! A [`Connection`] moves through Idle → Connecting → Running and back to
//! Idle on disconnect; `dispose` is terminal. The lifecycle is guarded by
//! two token slots:
//!
//! - the *lifetime* token lives as long as the connection; `dispose` takes
//!   and cancels it
//! - the *worker* token is a child of the lifetime token, installed by
//!   `connect` and linked to the caller-supplied token; `disconnect` takes
//!   and cancels it
//!
//! Every transition is a take-the-slot swap: the winner runs teardown,
//! losers return without side effects, so `disconnect` and `dispose` are
//! idempotent and safe to race from any task.
//!
//! `connect` spawns two detached loops sharing the transport: the receive
//! loop demultiplexes inbound frames into the dispatch fabric, the
//! heartbeat loop sends the fixed heartbeat frame on a cadence. Either loop
//! failing triggers the coordinated shutdown path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::classify::classify_frame;
use crate::config::ConnectOptions;
use crate::dispatch::{Connected, Disconnected, Invoker};
use crate::error::{DanmakuError, Result};
use crate::protocol::{join_frame, ops, Header, HEADER_SIZE, HEARTBEAT_FRAME, MAX_BODY_SIZE};
use crate::provider::ServerInfoProvider;
use crate::transport::{Connector, TcpConnector, Transport};

/// Initial capacity of the receive loop's body buffer.
const INITIAL_BODY_CAPACITY: usize = 4096;

/// Builder for a [`Connection`].
///
/// The subscription table and the transport variant are fixed at build time;
/// `connect` can then be called repeatedly on the built connection.
pub struct ConnectionBuilder {
    options: ConnectOptions,
    provider: Arc<dyn ServerInfoProvider>,
    connector: Arc<dyn Connector>,
    invoker: Invoker,
}

impl ConnectionBuilder {
    /// Create a builder with the TCP connector and an empty invoker.
    pub fn new(options: ConnectOptions, provider: Arc<dyn ServerInfoProvider>) -> Self {
        Self {
            options,
            provider,
            connector: Arc::new(TcpConnector),
            invoker: Invoker::empty(),
        }
    }

    /// Use a different transport variant.
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Install the subscription table built with
    /// [`Invoker::builder`](crate::dispatch::Invoker::builder).
    pub fn invoker(mut self, invoker: Invoker) -> Self {
        self.invoker = invoker;
        self
    }

    /// Validate the options and build the connection.
    pub fn build(self) -> Result<Arc<Connection>> {
        self.options.validate()?;

        Ok(Arc::new(Connection {
            options: self.options,
            provider: self.provider,
            connector: self.connector,
            invoker: Arc::new(self.invoker),
            lifetime: Mutex::new(Some(CancellationToken::new())),
            worker: Mutex::new(None),
            transport: Mutex::new(None),
            connected: AtomicBool::new(false),
        }))
    }
}

/// A danmaku connection to one live room.
pub struct Connection {
    options: ConnectOptions,
    provider: Arc<dyn ServerInfoProvider>,
    connector: Arc<dyn Connector>,
    invoker: Arc<Invoker>,
    /// Taken by the winning `dispose`.
    lifetime: Mutex<Option<CancellationToken>>,
    /// Taken by the winning `disconnect`; occupied while a session runs.
    worker: Mutex<Option<CancellationToken>>,
    /// The live transport, installed by `connect`, closed by `disconnect`.
    transport: Mutex<Option<Arc<dyn Transport>>>,
    connected: AtomicBool,
}

impl Connection {
    /// Create a builder.
    pub fn builder(
        options: ConnectOptions,
        provider: Arc<dyn ServerInfoProvider>,
    ) -> ConnectionBuilder {
        ConnectionBuilder::new(options, provider)
    }

    /// The room this connection joins.
    pub fn room_id(&self) -> u64 {
        self.options.room_id
    }

    /// Whether the join handshake has completed and the session is live.
    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Whether `dispose` has been called.
    pub fn is_disposed(&self) -> bool {
        self.lifetime.lock().is_none()
    }

    /// Connect to the room and run the session loops.
    ///
    /// Resolves the server info, opens the transport, sends the join frame,
    /// then waits for the server's connect-ack before returning. The receive
    /// and heartbeat loops keep running detached until `disconnect`,
    /// `dispose`, a loop failure, or cancellation of `cancel`.
    ///
    /// # Errors
    ///
    /// - [`DanmakuError::Disposed`] after `dispose`
    /// - [`DanmakuError::InvalidState`] if a session is already running
    /// - [`DanmakuError::Cancelled`] if `cancel` fires before the ack
    /// - any failure of the provider, transport or handshake
    pub async fn connect(self: &Arc<Self>, cancel: &CancellationToken) -> Result<()> {
        // Install the worker token. The slot swap is the connect guard:
        // concurrent callers lose here before any side effect.
        let worker = {
            let lifetime = self.lifetime.lock();
            let Some(lifetime) = lifetime.as_ref() else {
                return Err(DanmakuError::Disposed);
            };

            let mut slot = self.worker.lock();
            if slot.is_some() {
                return Err(DanmakuError::InvalidState);
            }
            let worker = lifetime.child_token();
            *slot = Some(worker.clone());
            worker
        };

        // Link the caller's token: cancelling it cancels the worker token.
        // The forwarder exits once either side fires.
        {
            let caller = cancel.clone();
            let worker = worker.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = caller.cancelled() => worker.cancel(),
                    _ = worker.cancelled() => {}
                }
            });
        }

        match self.establish(&worker).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // Unwind the half-built session. No Connected was emitted,
                // so this emits no Disconnected either.
                self.disconnect_with(None).await;
                Err(e)
            }
        }
    }

    async fn establish(self: &Arc<Self>, worker: &CancellationToken) -> Result<()> {
        let info = self
            .provider
            .resolve(self.options.room_id)
            .await
            .map_err(|e| match e {
                e @ DanmakuError::CredentialUnavailable(_) => e,
                other => DanmakuError::CredentialUnavailable(other.to_string()),
            })?;

        let transport = self.connector.connect(&info, worker).await?;
        let join = join_frame(&self.options, &info.token)?;
        transport.send(&join, worker).await?;
        debug!(room_id = self.options.room_id, "join frame sent");

        *self.transport.lock() = Some(transport.clone());

        let (ack_tx, ack_rx) = oneshot::channel();
        tokio::spawn(receive_loop(
            Arc::downgrade(self),
            transport.clone(),
            self.invoker.clone(),
            worker.clone(),
            ack_tx,
        ));

        // Wait for the server's connect-ack. The receive loop completes the
        // channel with any pre-ack failure, including cancellation.
        match ack_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(DanmakuError::Cancelled),
        }

        tokio::spawn(heartbeat_loop(
            Arc::downgrade(self),
            transport,
            self.options.heartbeat_interval,
            worker.clone(),
        ));

        Ok(())
    }

    /// Tear down the running session. Idempotent; losers of the slot swap
    /// return without side effects.
    pub async fn disconnect(&self) {
        self.disconnect_with(None).await;
    }

    pub(crate) async fn disconnect_with(&self, error: Option<DanmakuError>) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        worker.cancel();

        let transport = self.transport.lock().take();
        if let Some(transport) = transport {
            transport.close().await;
        }

        let was_connected = self.connected.swap(false, Ordering::AcqRel);
        if !was_connected {
            return;
        }

        // Cancellation is a clean shutdown and carries no error.
        let error = error.filter(|e| !e.is_cancelled());
        match &error {
            Some(e) => warn!(error = %e, "session ended with error"),
            None => debug!("session ended"),
        }

        let event = Disconnected {
            error,
            time: SystemTime::now(),
        };
        if let Err(e) = self.invoker.publish(&event).await {
            warn!(error = %e, "disconnected handler failed");
        }
    }

    /// Dispose the connection. Runs `disconnect`, cancels the lifetime
    /// token, and makes every later operation fail with
    /// [`DanmakuError::Disposed`]. Idempotent.
    pub async fn dispose(&self) {
        let Some(lifetime) = self.lifetime.lock().take() else {
            return;
        };
        self.disconnect_with(None).await;
        lifetime.cancel();
        debug!(room_id = self.options.room_id, "connection disposed");
    }
}

/// Receive loop: read frames, feed the classifier, complete the ack.
async fn receive_loop(
    conn: Weak<Connection>,
    transport: Arc<dyn Transport>,
    invoker: Arc<Invoker>,
    shutdown: CancellationToken,
    ack: oneshot::Sender<Result<()>>,
) {
    let mut ack = Some(ack);
    let err = match run_receive(&conn, &transport, &invoker, &shutdown, &mut ack).await {
        Ok(()) => return,
        Err(e) => e,
    };

    if err.is_cancelled() {
        debug!("receive loop cancelled");
    } else {
        error!(error = %err, "receive loop terminated");
    }

    if let Some(conn) = conn.upgrade() {
        match ack.take() {
            // Pre-ack failure: the error surfaces out of `connect`; the
            // teardown itself stays quiet.
            Some(tx) => {
                let _ = tx.send(Err(err));
                conn.disconnect_with(None).await;
            }
            None => conn.disconnect_with(Some(err)).await,
        }
    }
}

async fn run_receive(
    conn: &Weak<Connection>,
    transport: &Arc<dyn Transport>,
    invoker: &Invoker,
    shutdown: &CancellationToken,
    ack: &mut Option<oneshot::Sender<Result<()>>>,
) -> Result<()> {
    // The loop owns its buffers for its whole lifetime; the body buffer
    // grows on demand and is reused across frames.
    let mut header_buf = [0u8; HEADER_SIZE];
    let mut body = BytesMut::with_capacity(INITIAL_BODY_CAPACITY);
    let mut scratch = Vec::new();

    loop {
        transport.receive_exact(&mut header_buf, shutdown).await?;
        let header = Header::decode(&header_buf)?;

        let body_len = header.body_length();
        if body_len > MAX_BODY_SIZE {
            return Err(DanmakuError::FrameTooLarge(body_len));
        }

        body.resize(body_len, 0);
        transport
            .receive_exact(&mut body[..body_len], shutdown)
            .await?;

        if header.action == ops::CONNECT_ACK {
            // First ack completes the pending connect; later acks are
            // ignored.
            if let Some(tx) = ack.take() {
                if let Some(conn) = conn.upgrade() {
                    conn.connected.store(true, Ordering::Release);
                }
                let _ = tx.send(Ok(()));

                let event = Connected {
                    time: SystemTime::now(),
                };
                if let Err(e) = invoker.publish(&event).await {
                    warn!(error = %e, "connected handler failed");
                }
            }
            continue;
        }

        // Per-frame isolation: a malformed payload or a faulty handler must
        // not sever the session.
        if let Err(e) = classify_frame(&header, &body[..body_len], &mut scratch, invoker).await {
            warn!(error = %e, action = header.action, "dropping frame");
        }
    }
}

/// Heartbeat loop: send the fixed heartbeat frame once per interval.
async fn heartbeat_loop(
    conn: Weak<Connection>,
    transport: Arc<dyn Transport>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let err = match run_heartbeat(&transport, interval, &shutdown).await {
        Ok(()) => return,
        Err(e) => e,
    };

    if err.is_cancelled() {
        debug!("heartbeat loop cancelled");
    } else {
        error!(error = %err, "heartbeat loop terminated");
    }

    if let Some(conn) = conn.upgrade() {
        conn.disconnect_with(Some(err)).await;
    }
}

async fn run_heartbeat(
    transport: &Arc<dyn Transport>,
    interval: Duration,
    shutdown: &CancellationToken,
) -> Result<()> {
    loop {
        let t0 = Instant::now();
        transport.send(&HEARTBEAT_FRAME, shutdown).await?;

        // A send that ate the whole interval is a liveness failure.
        let elapsed = t0.elapsed();
        if elapsed >= interval {
            return Err(DanmakuError::HeartbeatOverrun);
        }

        tokio::select! {
            _ = shutdown.cancelled() => return Err(DanmakuError::Cancelled),
            _ = tokio::time::sleep(interval - elapsed) => {}
        }
    }
}
