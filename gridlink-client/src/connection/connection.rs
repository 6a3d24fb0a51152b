//! Single connection to a cluster member.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use gridlink_core::protocol::{
    AuthenticationRequest, AuthenticationResponse, ClientMessage, ClientMessageCodec,
    PROTOCOL_PREAMBLE,
};
use gridlink_core::{GridError, Result};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::instrument;
use uuid::Uuid;

use crate::config::{ClientConfig, TlsConfig};

/// Correlation id of the authentication exchange, the only frame in flight
/// before the connection is handed out.
const HANDSHAKE_CORRELATION_ID: i64 = 1;

/// Frames queued per connection before writers are suspended.
const WRITE_QUEUE_CAPACITY: usize = 1024;

trait IoStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> IoStream for T {}

type FramedStream = Framed<Box<dyn IoStream>, ClientMessageCodec>;

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generates a new unique connection ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw ID value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Frames and closure notices produced by connection read loops.
#[derive(Debug)]
pub enum InboundEvent {
    /// A frame arrived.
    Message {
        /// Connection the frame arrived on.
        connection_id: ConnectionId,
        /// Member on the other end.
        member_uuid: Uuid,
        /// The frame.
        message: ClientMessage,
    },
    /// The connection stopped reading. Emitted exactly once per connection.
    Closed {
        /// Connection that closed.
        connection_id: ConnectionId,
        /// Member on the other end.
        member_uuid: Uuid,
        /// Remote address.
        address: SocketAddr,
        /// Why the connection closed.
        reason: String,
    },
}

/// Settings needed to open and authenticate a connection.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Bound on the TCP connect and, separately, on the handshake.
    pub connection_timeout: Duration,
    /// Largest accepted frame in either direction.
    pub max_frame_size: usize,
    /// TLS settings; ignored unless enabled.
    pub tls: TlsConfig,
    /// Request sent as the first frame.
    pub authentication: AuthenticationRequest,
}

impl ConnectionSettings {
    /// Derives connection settings from the client configuration.
    pub fn from_config(config: &ClientConfig, client_uuid: Uuid) -> Self {
        let client_name = config
            .client_name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("gridlink-client-{}", client_uuid.simple()));

        Self {
            connection_timeout: config.network().connection_timeout(),
            max_frame_size: config.network().max_frame_size(),
            tls: config.network().tls().clone(),
            authentication: AuthenticationRequest {
                cluster_name: config.cluster_name().to_string(),
                credentials: config.security().credentials(),
                client_uuid,
                client_name,
                serialization_version: gridlink_core::protocol::SERIALIZATION_VERSION,
            },
        }
    }
}

/// Liveness and activity timestamps shared with the I/O tasks.
#[derive(Debug)]
struct Activity {
    created_at: Instant,
    alive: AtomicBool,
    last_read_ms: AtomicU64,
    last_write_ms: AtomicU64,
}

impl Activity {
    fn new() -> Self {
        Self {
            created_at: Instant::now(),
            alive: AtomicBool::new(true),
            last_read_ms: AtomicU64::new(0),
            last_write_ms: AtomicU64::new(0),
        }
    }

    fn offset_ms(&self) -> u64 {
        self.created_at.elapsed().as_millis() as u64
    }

    fn touch_read(&self) {
        self.last_read_ms.store(self.offset_ms(), Ordering::Relaxed);
    }

    fn touch_write(&self) {
        self.last_write_ms.store(self.offset_ms(), Ordering::Relaxed);
    }

    fn since(&self, stamp: &AtomicU64) -> Duration {
        let now = self.offset_ms();
        Duration::from_millis(now.saturating_sub(stamp.load(Ordering::Relaxed)))
    }
}

/// Records the first close reason; later ones are ignored.
fn signal_close(close_tx: &watch::Sender<Option<String>>, reason: impl Into<String>) {
    let reason = reason.into();
    close_tx.send_if_modified(|current| {
        if current.is_none() {
            *current = Some(reason);
            true
        } else {
            false
        }
    });
}

/// An authenticated connection to a single cluster member.
///
/// Writes are queued to a dedicated writer task; a reader task forwards every
/// inbound frame, and finally one [`InboundEvent::Closed`], to the dispatcher.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    member_uuid: Uuid,
    address: SocketAddr,
    partition_count: i32,
    cluster_id: Uuid,
    max_frame_size: usize,
    writer: mpsc::Sender<ClientMessage>,
    activity: Arc<Activity>,
    close_tx: Arc<watch::Sender<Option<String>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Connection {
    /// Opens a connection to `address`, performs the handshake and starts the
    /// I/O tasks.
    ///
    /// # Errors
    ///
    /// - `GridError::Timeout` if the connect or the handshake exceeds the timeout.
    /// - `GridError::Transport` on I/O failure.
    /// - `GridError::Authentication` if the member rejects the client.
    #[instrument(name = "connection.establish", skip(address, settings, inbound), fields(address = %address))]
    pub async fn establish(
        address: SocketAddr,
        settings: &ConnectionSettings,
        inbound: mpsc::Sender<InboundEvent>,
    ) -> Result<Arc<Self>> {
        let stream = Self::open_stream(address, settings).await?;
        let mut framed = Framed::new(
            stream,
            ClientMessageCodec::with_max_frame_size(settings.max_frame_size),
        );

        let response = tokio::time::timeout(
            settings.connection_timeout,
            Self::authenticate(&mut framed, &settings.authentication),
        )
        .await
        .map_err(|_| {
            GridError::Timeout(format!(
                "handshake with {} did not finish within {:?}",
                address, settings.connection_timeout
            ))
        })??;

        let (sink, stream) = framed.split();
        let (writer, write_rx) = mpsc::channel(WRITE_QUEUE_CAPACITY);
        let (close_tx, _) = watch::channel(None);
        let close_tx = Arc::new(close_tx);
        let activity = Arc::new(Activity::new());

        let connection = Arc::new(Self {
            id: ConnectionId::new(),
            member_uuid: response.member_uuid,
            address,
            partition_count: response.partition_count,
            cluster_id: response.cluster_id,
            max_frame_size: settings.max_frame_size,
            writer,
            activity: Arc::clone(&activity),
            close_tx: Arc::clone(&close_tx),
            tasks: Mutex::new(Vec::with_capacity(2)),
        });

        let writer_task = tokio::spawn(run_writer(
            sink,
            write_rx,
            Arc::clone(&activity),
            Arc::clone(&close_tx),
        ));
        let reader_task = tokio::spawn(run_reader(
            stream,
            connection.id,
            connection.member_uuid,
            address,
            activity,
            close_tx,
            inbound,
        ));
        connection.tasks.lock().await.extend([writer_task, reader_task]);

        tracing::debug!(
            id = %connection.id,
            member = %connection.member_uuid,
            partition_count = connection.partition_count,
            "connection authenticated"
        );
        Ok(connection)
    }

    async fn open_stream(address: SocketAddr, settings: &ConnectionSettings) -> Result<Box<dyn IoStream>> {
        let tcp = tokio::time::timeout(settings.connection_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| {
                GridError::Timeout(format!(
                    "connecting to {} timed out after {:?}",
                    address, settings.connection_timeout
                ))
            })?
            .map_err(|e| GridError::Transport(format!("failed to connect to {}: {}", address, e)))?;

        tcp.set_nodelay(true)
            .map_err(|e| GridError::Transport(format!("failed to set TCP_NODELAY: {}", e)))?;

        #[cfg(feature = "tls")]
        if settings.tls.enabled() {
            let tls = tokio::time::timeout(
                settings.connection_timeout,
                super::tls::connect(&settings.tls, address, tcp),
            )
            .await
            .map_err(|_| GridError::Timeout(format!("TLS handshake with {} timed out", address)))??;
            return Ok(Box::new(tls));
        }

        Ok(Box::new(tcp))
    }

    async fn authenticate(
        framed: &mut FramedStream,
        request: &AuthenticationRequest,
    ) -> Result<AuthenticationResponse> {
        framed
            .get_mut()
            .write_all(PROTOCOL_PREAMBLE)
            .await
            .map_err(|e| GridError::Transport(format!("failed to write protocol preamble: {}", e)))?;

        let mut message = request.encode();
        message.set_correlation_id(HANDSHAKE_CORRELATION_ID);
        framed.send(message).await.map_err(into_transport)?;

        let reply = match framed.next().await {
            Some(Ok(reply)) => reply,
            Some(Err(e)) => return Err(into_transport(e)),
            None => {
                return Err(GridError::Transport(
                    "connection closed during handshake".to_string(),
                ))
            }
        };

        if reply.correlation_id() != HANDSHAKE_CORRELATION_ID {
            return Err(GridError::Protocol(format!(
                "unexpected correlation id {} in handshake response",
                reply.correlation_id()
            )));
        }

        AuthenticationResponse::decode(&reply)?.into_result()
    }

    /// Returns the connection's unique identifier.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the UUID of the member on the other end.
    pub fn member_uuid(&self) -> Uuid {
        self.member_uuid
    }

    /// Returns the remote address of this connection.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Returns the partition count announced in the handshake.
    pub fn partition_count(&self) -> i32 {
        self.partition_count
    }

    /// Returns the cluster id announced in the handshake.
    pub fn cluster_id(&self) -> Uuid {
        self.cluster_id
    }

    /// Returns true until the connection is closed or its I/O fails.
    pub fn is_alive(&self) -> bool {
        self.activity.alive.load(Ordering::Acquire)
    }

    /// Returns when this connection was created.
    pub fn created_at(&self) -> Instant {
        self.activity.created_at
    }

    /// Returns the time since the last inbound frame.
    pub fn idle_read(&self) -> Duration {
        self.activity.since(&self.activity.last_read_ms)
    }

    /// Returns the time since the last frame was written.
    pub fn idle_write(&self) -> Duration {
        self.activity.since(&self.activity.last_write_ms)
    }

    /// Queues a frame for writing.
    ///
    /// Returns once the frame is queued; frames are written in queue order.
    ///
    /// # Errors
    ///
    /// - `GridError::Protocol` if the frame exceeds the size limit.
    /// - `GridError::Transport` if the connection is closed.
    pub async fn send(&self, message: ClientMessage) -> Result<()> {
        if message.wire_size() > self.max_frame_size {
            return Err(GridError::Protocol(format!(
                "frame of {} bytes exceeds limit of {} bytes",
                message.wire_size(),
                self.max_frame_size
            )));
        }
        if !self.is_alive() {
            return Err(GridError::Transport(format!("{} to {} is closed", self.id, self.address)));
        }
        self.writer
            .send(message)
            .await
            .map_err(|_| GridError::Transport(format!("{} to {} is closed", self.id, self.address)))
    }

    /// Marks the connection dead and stops its I/O tasks.
    ///
    /// The reader reports `reason` in its closing [`InboundEvent::Closed`].
    pub fn close(&self, reason: impl Into<String>) {
        self.activity.alive.store(false, Ordering::Release);
        signal_close(&self.close_tx, reason);
    }

    /// Closes the connection and waits for its I/O tasks to finish.
    pub async fn close_and_wait(&self, reason: impl Into<String>) {
        self.close(reason);
        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
        tracing::debug!(id = %self.id, address = %self.address, "connection closed");
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        signal_close(&self.close_tx, "connection dropped");
    }
}

fn into_transport(err: GridError) -> GridError {
    match err {
        GridError::Io(e) => GridError::Transport(e.to_string()),
        other => other,
    }
}

async fn run_writer(
    mut sink: SplitSink<FramedStream, ClientMessage>,
    mut queue: mpsc::Receiver<ClientMessage>,
    activity: Arc<Activity>,
    close_tx: Arc<watch::Sender<Option<String>>>,
) {
    let mut close_rx = close_tx.subscribe();
    if close_rx.borrow_and_update().is_some() {
        return;
    }

    loop {
        tokio::select! {
            changed = close_rx.changed() => {
                if changed.is_err() || close_rx.borrow().is_some() {
                    break;
                }
            }
            next = queue.recv() => match next {
                Some(message) => {
                    if let Err(e) = sink.send(message).await {
                        activity.alive.store(false, Ordering::Release);
                        signal_close(&close_tx, format!("write failed: {}", e));
                        break;
                    }
                    activity.touch_write();
                }
                None => break,
            }
        }
    }

    let _ = sink.close().await;
}

async fn run_reader(
    mut stream: SplitStream<FramedStream>,
    connection_id: ConnectionId,
    member_uuid: Uuid,
    address: SocketAddr,
    activity: Arc<Activity>,
    close_tx: Arc<watch::Sender<Option<String>>>,
    inbound: mpsc::Sender<InboundEvent>,
) {
    let mut close_rx = close_tx.subscribe();
    let pending_close = close_rx.borrow_and_update().clone();

    let reason = match pending_close {
        Some(reason) => reason,
        None => loop {
            tokio::select! {
                changed = close_rx.changed() => {
                    if changed.is_err() {
                        break "connection dropped".to_string();
                    }
                    if let Some(reason) = close_rx.borrow().clone() {
                        break reason;
                    }
                }
                frame = stream.next() => match frame {
                    Some(Ok(message)) => {
                        activity.touch_read();
                        let event = InboundEvent::Message { connection_id, member_uuid, message };
                        if inbound.send(event).await.is_err() {
                            break "dispatcher stopped".to_string();
                        }
                    }
                    Some(Err(e)) => break format!("read failed: {}", e),
                    None => break "closed by peer".to_string(),
                }
            }
        },
    };

    activity.alive.store(false, Ordering::Release);
    signal_close(&close_tx, reason.clone());
    tracing::debug!(id = %connection_id, address = %address, reason = %reason, "read loop finished");

    let _ = inbound
        .send(InboundEvent::Closed {
            connection_id,
            member_uuid,
            address,
            reason,
        })
        .await;
}
