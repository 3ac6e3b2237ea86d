//! IPC server: accepts UI processes and bridges their frames to the host.
//!
//! # Connection lifecycle
//!
//! ```text
//! accept ──► read Hello (bounded by hello_timeout, abandoned on shutdown)
//!              │ wrong version      ──► HelloAck{rejected, VERSION_MISMATCH}, close
//!              │ id already present ──► HelloAck{rejected, DUPLICATE_SURFACE}, close
//!              ▼
//!            register WindowHandle, HelloAck{accepted}
//!              │
//!              ├── reader loop: Event ──► InboundListeners::deliver
//!              │                Ping  ──► Pong
//!              ├── pinger: Ping every ping_interval
//!              ▼
//!            Disconnect / EOF / protocol error / host shutdown
//!              ──► close handle, remove from registry
//! ```
//!
//! Frames read from one connection are delivered in arrival order by a single
//! task, which preserves per-sender ordering.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use libria_core::protocol::{
    encode_message_now, reject_reason, ChannelMessage, DisconnectReason, HelloAckMessage,
    HelloMessage, PROTOCOL_VERSION,
};
use libria_core::{InboundListeners, SurfaceId};
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, timeout, Instant};
use tracing::{debug, info, warn};

use super::window::{spawn_writer, WindowHandle};
use super::{read_frame, IpcError};
use crate::application::manage_surfaces::SharedRegistry;

/// Runtime settings of the IPC server.
#[derive(Debug, Clone)]
pub struct IpcServerConfig {
    pub bind_addr: SocketAddr,
    /// How long a new connection may take to send its `Hello`.
    pub hello_timeout: Duration,
    /// Interval between keepalive pings on an established connection.
    pub ping_interval: Duration,
}

impl Default for IpcServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            hello_timeout: Duration::from_secs(5),
            ping_interval: Duration::from_secs(10),
        }
    }
}

/// Connection changes reported to the application layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    Connected { id: SurfaceId, label: String },
    Rejected { id: SurfaceId, label: String, reason: u8 },
    Disconnected { id: SurfaceId, label: String },
}

/// State shared by every connection task.
struct Shared {
    config: IpcServerConfig,
    registry: SharedRegistry,
    inbound: InboundListeners,
    events: mpsc::Sender<SurfaceEvent>,
}

/// A bound, not yet running, IPC server.
pub struct IpcServer {
    listener: TcpListener,
    shared: Arc<Shared>,
}

impl IpcServer {
    /// Binds the listening socket.
    ///
    /// Returns the server together with the receiver of [`SurfaceEvent`]s.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::BindFailed`] when the address cannot be bound.
    pub async fn bind(
        config: IpcServerConfig,
        registry: SharedRegistry,
        inbound: InboundListeners,
    ) -> Result<(Self, mpsc::Receiver<SurfaceEvent>), IpcError> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| IpcError::BindFailed {
                addr: config.bind_addr,
                source,
            })?;
        let (tx, rx) = mpsc::channel(64);
        let shared = Arc::new(Shared {
            config,
            registry,
            inbound,
            events: tx,
        });
        Ok((Self { listener, shared }, rx))
    }

    /// The address actually bound (resolves port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, IpcError> {
        Ok(self.listener.local_addr()?)
    }

    /// Starts the accept loop on the runtime.
    pub fn spawn(self) -> Result<ServerHandle, IpcError> {
        let local_addr = self.local_addr()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        info!(%local_addr, "IPC server listening");
        Ok(ServerHandle {
            local_addr,
            shutdown_tx,
            task,
        })
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "connection accepted");
                        connections.spawn(serve_connection(
                            Arc::clone(&self.shared),
                            stream,
                            peer,
                            shutdown.clone(),
                        ));
                    }
                    Err(e) => warn!("accept failed: {e}"),
                },
            }
        }
        // Let every connection tell its surface that the host is going away.
        while connections.join_next().await.is_some() {}
        info!("IPC server stopped");
    }
}

/// Handle to a running server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting, sends `Disconnect{HostShutdown}` on every connection
    /// and waits for the connection tasks to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            warn!("IPC server task failed: {e}");
        }
    }
}

async fn serve_connection(
    shared: Arc<Shared>,
    stream: TcpStream,
    peer: SocketAddr,
    mut shutdown: watch::Receiver<bool>,
) {
    let (mut reader, mut writer) = stream.into_split();

    let first = tokio::select! {
        _ = shutdown.changed() => {
            debug!(%peer, "host shutting down before Hello");
            return;
        }
        first = read_hello(&mut reader, shared.config.hello_timeout) => first,
    };
    let hello = match first {
        Ok(Some(hello)) => hello,
        Ok(None) => {
            debug!(%peer, "connection closed before Hello");
            return;
        }
        Err(e) => {
            warn!(%peer, "handshake failed: {e}");
            return;
        }
    };

    if hello.protocol_version != PROTOCOL_VERSION {
        warn!(
            %peer,
            label = %hello.label,
            version = hello.protocol_version,
            "rejecting surface with foreign protocol version"
        );
        reject(&shared, &mut writer, &hello, reject_reason::VERSION_MISMATCH).await;
        return;
    }

    let (handle, outbound) = WindowHandle::new(hello.surface_id, hello.label.clone());
    let handle = Arc::new(handle);
    let registered = shared
        .registry
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .register(Arc::clone(&handle) as Arc<dyn libria_core::UiSurface>);
    if let Err(e) = registered {
        warn!(%peer, "{e}");
        reject(&shared, &mut writer, &hello, reject_reason::DUPLICATE_SURFACE).await;
        return;
    }

    let _ = handle.enqueue(ChannelMessage::HelloAck(HelloAckMessage {
        accepted: true,
        reject_reason: reject_reason::NONE,
    }));
    let writer_task = spawn_writer(writer, outbound);
    let pinger = spawn_pinger(Arc::clone(&handle), shared.config.ping_interval);
    info!(surface = %hello.surface_id, label = %hello.label, %peer, "surface connected");
    let _ = shared
        .events
        .send(SurfaceEvent::Connected {
            id: hello.surface_id,
            label: hello.label.clone(),
        })
        .await;

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = handle.enqueue(ChannelMessage::Disconnect {
                    reason: DisconnectReason::HostShutdown,
                });
                break;
            }
            frame = read_frame(&mut reader) => match frame {
                Ok(Some(ChannelMessage::Event(event))) => {
                    let invoked = shared.inbound.deliver(&event.name, &event.payload);
                    debug!(label = %hello.label, event = %event.name, invoked, "inbound event");
                }
                Ok(Some(ChannelMessage::Ping(token))) => {
                    let _ = handle.enqueue(ChannelMessage::Pong(token));
                }
                Ok(Some(ChannelMessage::Pong(token))) => {
                    debug!(label = %hello.label, token, "pong");
                }
                Ok(Some(ChannelMessage::Disconnect { reason })) => {
                    info!(label = %hello.label, ?reason, "surface disconnecting");
                    break;
                }
                Ok(Some(other)) => {
                    debug!(label = %hello.label, "ignoring unexpected {:?}", other.message_type());
                }
                Ok(None) => break,
                Err(IpcError::Protocol(e)) => {
                    warn!(label = %hello.label, "protocol error: {e}");
                    let _ = handle.enqueue(ChannelMessage::Disconnect {
                        reason: DisconnectReason::ProtocolError,
                    });
                    break;
                }
                Err(e) => {
                    debug!(label = %hello.label, "read ended: {e}");
                    break;
                }
            },
        }
    }

    handle.close();
    pinger.abort();
    shared
        .registry
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(hello.surface_id);
    let _ = writer_task.await;
    info!(surface = %hello.surface_id, label = %hello.label, "surface disconnected");
    let _ = shared
        .events
        .send(SurfaceEvent::Disconnected {
            id: hello.surface_id,
            label: hello.label,
        })
        .await;
}

/// Waits for the first frame, which must be a `Hello`.
async fn read_hello<R>(reader: &mut R, limit: Duration) -> Result<Option<HelloMessage>, IpcError>
where
    R: AsyncRead + Unpin,
{
    match timeout(limit, read_frame(reader)).await {
        Err(_) => Err(IpcError::HelloTimeout(limit)),
        Ok(Ok(Some(ChannelMessage::Hello(hello)))) => Ok(Some(hello)),
        Ok(Ok(Some(other))) => Err(IpcError::UnexpectedFirstFrame(other.message_type())),
        Ok(Ok(None)) => Ok(None),
        Ok(Err(e)) => Err(e),
    }
}

async fn reject(shared: &Shared, writer: &mut OwnedWriteHalf, hello: &HelloMessage, reason: u8) {
    let ack = ChannelMessage::HelloAck(HelloAckMessage {
        accepted: false,
        reject_reason: reason,
    });
    match encode_message_now(&ack, 0) {
        Ok(bytes) => {
            if let Err(e) = writer.write_all(&bytes).await {
                debug!("failed to send rejection: {e}");
            }
        }
        Err(e) => warn!("failed to encode rejection: {e}"),
    }
    let _ = writer.shutdown().await;
    let _ = shared
        .events
        .send(SurfaceEvent::Rejected {
            id: hello.surface_id,
            label: hello.label.clone(),
            reason,
        })
        .await;
}

fn spawn_pinger(handle: Arc<WindowHandle>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let token = AtomicU64::new(0);
        let mut ticker = interval_at(Instant::now() + period, period);
        loop {
            ticker.tick().await;
            let ping = ChannelMessage::Ping(token.fetch_add(1, Ordering::Relaxed));
            if !handle.enqueue(ping).is_queued() {
                break;
            }
        }
    })
}
