//! Link from a UI process to its privileged host.
//!
//! Architecture:
//! - `HostConnection` keeps one TCP connection to the host's IPC server and
//!   reconnects after `reconnect_interval` when it drops.
//! - Each session starts with `Hello`; only after an accepted `HelloAck` do
//!   sends go out.  Until then, and between sessions, [`HostChannel::send_to_host`]
//!   reports [`Delivery::TargetAbsent`].
//! - Inbound `Event` frames are handed to the UI's [`InboundListeners`] in
//!   arrival order; connection changes and devtools requests are reported as
//!   [`LinkEvent`]s.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use libria_core::protocol::{
    decode_message, encode_message_now, payload_len_from_header, validate_message, ChannelMessage,
    DisconnectReason, HelloMessage, MessageType, ProtocolError, SequenceCounter, HEADER_SIZE,
    PROTOCOL_VERSION,
};
use libria_core::{Delivery, HostChannel, InboundListeners, Payload, SurfaceId};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Errors that end one session with the host.
#[derive(Debug, Error)]
pub enum HostLinkError {
    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    /// The host refused the `Hello`; carries the reject reason.
    #[error("host rejected the handshake (reason {0})")]
    Rejected(u8),
    #[error("expected HelloAck, got {0:?}")]
    UnexpectedReply(MessageType),
    #[error("connection closed by host")]
    Closed,
}

#[derive(Debug, Clone)]
pub struct HostLinkConfig {
    /// Address of the host's IPC server.
    pub host_addr: SocketAddr,
    /// Identity announced in `Hello`.
    pub surface_id: SurfaceId,
    /// Window label announced in `Hello`.
    pub label: String,
    pub reconnect_interval: Duration,
}

impl Default for HostLinkConfig {
    fn default() -> Self {
        Self {
            host_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            surface_id: Uuid::nil(),
            label: "main".to_string(),
            reconnect_interval: Duration::from_secs(5),
        }
    }
}

/// Link state changes reported to the application layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// TCP connection established; handshake pending.
    Connected { host_addr: SocketAddr },
    /// The host accepted the handshake.  Sends now go out.
    Accepted,
    /// The host refused the handshake.
    Rejected { reason: u8 },
    /// The host asked this surface to open its developer tools.
    DevtoolsRequested,
    /// The session ended.
    Disconnected,
}

/// The UI side of the cross-process channel.
pub struct HostConnection {
    config: HostLinkConfig,
    inbound: InboundListeners,
    /// Present only while a session is accepted.
    outbound: Mutex<Option<mpsc::UnboundedSender<ChannelMessage>>>,
    /// `true` from an accepted handshake until the session's writer finished.
    session_live: watch::Sender<bool>,
}

impl HostConnection {
    /// Creates a new (not yet connected) link that delivers inbound events
    /// to `inbound`.
    pub fn new(config: HostLinkConfig, inbound: InboundListeners) -> Self {
        Self {
            config,
            inbound,
            outbound: Mutex::new(None),
            session_live: watch::Sender::new(false),
        }
    }

    pub fn config(&self) -> &HostLinkConfig {
        &self.config
    }

    /// Whether a session is currently accepted.
    pub fn is_connected(&self) -> bool {
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Starts the reconnect loop.
    ///
    /// Returns the receiver of [`LinkEvent`]s.  The loop stops once `running`
    /// is cleared and the current session has ended.
    pub fn start(self: Arc<Self>, running: Arc<AtomicBool>) -> mpsc::Receiver<LinkEvent> {
        let (tx, rx) = mpsc::channel(128);

        tokio::spawn(async move {
            while running.load(Ordering::Relaxed) {
                let addr = self.config.host_addr;
                match TcpStream::connect(addr).await {
                    Ok(stream) => {
                        info!("connected to host at {addr}");
                        let _ = tx.send(LinkEvent::Connected { host_addr: addr }).await;

                        match self.session(stream, &tx).await {
                            Ok(()) => {}
                            Err(HostLinkError::Rejected(reason)) => {
                                warn!(reason, "host rejected this surface");
                                let _ = tx.send(LinkEvent::Rejected { reason }).await;
                            }
                            Err(e) => warn!("session with host ended: {e}"),
                        }

                        self.set_outbound(None);
                        let _ = tx.send(LinkEvent::Disconnected).await;
                        info!(
                            "disconnected from host; reconnecting in {:?}",
                            self.config.reconnect_interval
                        );
                    }
                    Err(e) => {
                        warn!("could not connect to host at {addr}: {e}");
                    }
                }

                if running.load(Ordering::Relaxed) {
                    time::sleep(self.config.reconnect_interval).await;
                }
            }
        });

        rx
    }

    /// Tells the host this surface is closing and ends the current session.
    ///
    /// Only queues the `Disconnect`; see [`HostConnection::close`] to wait
    /// until it has been written.
    pub fn disconnect(&self, reason: DisconnectReason) -> Delivery {
        let delivery = self.enqueue(ChannelMessage::Disconnect { reason });
        self.set_outbound(None);
        delivery
    }

    /// Like [`HostConnection::disconnect`], then waits up to `grace` for the
    /// session to end so the `Disconnect` frame reaches the socket before the
    /// process exits.
    pub async fn close(&self, reason: DisconnectReason, grace: Duration) -> Delivery {
        let mut live = self.session_live.subscribe();
        let delivery = self.disconnect(reason);
        if delivery.is_queued() {
            let ended = time::timeout(grace, live.wait_for(|open| !*open))
                .await
                .is_ok_and(|r| r.is_ok());
            if !ended {
                debug!("session still open after {grace:?}, closing anyway");
            }
        }
        delivery
    }

    async fn session(
        &self,
        stream: TcpStream,
        tx: &mpsc::Sender<LinkEvent>,
    ) -> Result<(), HostLinkError> {
        let (mut reader, mut writer) = stream.into_split();
        let seq = SequenceCounter::new();

        let hello = ChannelMessage::Hello(HelloMessage {
            surface_id: self.config.surface_id,
            protocol_version: PROTOCOL_VERSION,
            label: self.config.label.clone(),
        });
        writer.write_all(&encode_message_now(&hello, seq.next())?).await?;

        match read_frame(&mut reader).await? {
            Some(ChannelMessage::HelloAck(ack)) if ack.accepted => {}
            Some(ChannelMessage::HelloAck(ack)) => {
                return Err(HostLinkError::Rejected(ack.reject_reason))
            }
            Some(other) => return Err(HostLinkError::UnexpectedReply(other.message_type())),
            None => return Err(HostLinkError::Closed),
        }

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let writer_task = tokio::spawn(write_loop(writer, out_rx, seq));
        self.session_live.send_replace(true);
        self.set_outbound(Some(out_tx.clone()));
        info!(surface = %self.config.surface_id, label = %self.config.label, "handshake accepted");
        let _ = tx.send(LinkEvent::Accepted).await;

        let result = loop {
            match read_frame(&mut reader).await {
                Ok(Some(ChannelMessage::Event(event))) => {
                    let invoked = self.inbound.deliver(&event.name, &event.payload);
                    debug!(event = %event.name, invoked, "inbound event");
                }
                Ok(Some(ChannelMessage::Ping(token))) => {
                    let _ = out_tx.send(ChannelMessage::Pong(token));
                }
                Ok(Some(ChannelMessage::Pong(token))) => debug!(token, "pong"),
                Ok(Some(ChannelMessage::OpenDevtools)) => {
                    let _ = tx.send(LinkEvent::DevtoolsRequested).await;
                }
                Ok(Some(ChannelMessage::Disconnect { reason })) => {
                    info!(?reason, "host closed the session");
                    break Ok(());
                }
                Ok(Some(other)) => debug!("ignoring unexpected {:?}", other.message_type()),
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        self.set_outbound(None);
        drop(out_tx);
        let _ = writer_task.await;
        self.session_live.send_replace(false);
        result
    }

    fn set_outbound(&self, tx: Option<mpsc::UnboundedSender<ChannelMessage>>) {
        *self.outbound.lock().unwrap_or_else(PoisonError::into_inner) = tx;
    }

    fn enqueue(&self, msg: ChannelMessage) -> Delivery {
        if let Err(e) = validate_message(&msg) {
            warn!("refusing {:?} for the host: {e}", msg.message_type());
            return Delivery::TargetAbsent;
        }
        let guard = self.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(tx) if tx.send(msg).is_ok() => Delivery::Queued,
            _ => {
                debug!("not connected to host, message dropped");
                Delivery::TargetAbsent
            }
        }
    }
}

impl HostChannel for HostConnection {
    fn send_to_host(&self, name: &str, payload: &Payload) -> Delivery {
        self.enqueue(ChannelMessage::event(name, payload.clone()))
    }
}

impl std::fmt::Debug for HostConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostConnection")
            .field("config", &self.config)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Reads one frame; `Ok(None)` on end of stream before a header.
async fn read_frame<R>(reader: &mut R) -> Result<Option<ChannelMessage>, HostLinkError>
where
    R: AsyncRead + Unpin,
{
    let mut frame = vec![0u8; HEADER_SIZE];
    if let Err(e) = reader.read_exact(&mut frame).await {
        return if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Ok(None)
        } else {
            Err(e.into())
        };
    }
    let payload_len = payload_len_from_header(&frame)?;
    frame.resize(HEADER_SIZE + payload_len, 0);
    reader.read_exact(&mut frame[HEADER_SIZE..]).await?;
    Ok(Some(decode_message(&frame)?.0))
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<ChannelMessage>,
    seq: SequenceCounter,
) {
    while let Some(msg) = rx.recv().await {
        let bytes = match encode_message_now(&msg, seq.next()) {
            Ok(b) => b,
            Err(e) => {
                warn!("dropping unencodable {:?}: {e}", msg.message_type());
                continue;
            }
        };
        if let Err(e) = writer.write_all(&bytes).await {
            debug!("write to host failed: {e}");
            break;
        }
    }
    let _ = writer.shutdown().await;
}

// ── Tests ─────────────────────────────────────────────────────────────────────
