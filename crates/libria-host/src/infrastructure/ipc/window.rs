//! Host-side handle to one connected UI process.

use std::sync::{Mutex, PoisonError};

use libria_core::protocol::{encode_message_now, validate_message, ChannelMessage, SequenceCounter};
use libria_core::{Delivery, Payload, SurfaceId, UiSurface};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// [`UiSurface`] backed by a live IPC connection.
///
/// Outbound messages go through an unbounded queue owned by the connection's
/// writer task, so a send never waits on the socket.  After [`WindowHandle::close`]
/// every send reports [`Delivery::TargetAbsent`], as does a message too large
/// to frame.
pub struct WindowHandle {
    id: SurfaceId,
    label: String,
    tx: Mutex<Option<mpsc::UnboundedSender<ChannelMessage>>>,
}

impl WindowHandle {
    /// Creates a handle together with the receiving end of its queue.
    pub fn new(
        id: SurfaceId,
        label: impl Into<String>,
    ) -> (Self, mpsc::UnboundedReceiver<ChannelMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Self {
            id,
            label: label.into(),
            tx: Mutex::new(Some(tx)),
        };
        (handle, rx)
    }

    /// Queues a raw channel message for the writer task.
    pub fn enqueue(&self, msg: ChannelMessage) -> Delivery {
        if let Err(e) = validate_message(&msg) {
            let kind = msg.message_type();
            warn!(surface = %self.id, label = %self.label, "refusing {kind:?}: {e}");
            return Delivery::TargetAbsent;
        }
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(tx) if tx.send(msg).is_ok() => Delivery::Queued,
            _ => {
                debug!(surface = %self.id, label = %self.label, "surface closed, message dropped");
                Delivery::TargetAbsent
            }
        }
    }

    /// Marks the surface as gone.  The writer drains what is already queued
    /// and then stops.
    pub fn close(&self) {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    pub fn is_open(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }
}

impl UiSurface for WindowHandle {
    fn id(&self) -> SurfaceId {
        self.id
    }

    fn label(&self) -> String {
        self.label.clone()
    }

    fn send_to_surface(&self, name: &str, payload: &Payload) -> Delivery {
        self.enqueue(ChannelMessage::event(name, payload.clone()))
    }

    fn open_devtools(&self) -> Delivery {
        self.enqueue(ChannelMessage::OpenDevtools)
    }
}

impl std::fmt::Debug for WindowHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowHandle")
            .field("id", &self.id)
            .field("label", &self.label)
            .finish()
    }
}

/// Spawns the task that frames queued messages onto `writer`.
///
/// The task ends when the queue is closed and drained, or on the first write
/// error.  Sequence numbers start at zero for every connection.
pub fn spawn_writer<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<ChannelMessage>,
) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let seq = SequenceCounter::new();
        while let Some(msg) = rx.recv().await {
            let bytes = match encode_message_now(&msg, seq.next()) {
                Ok(b) => b,
                Err(e) => {
                    warn!("dropping unencodable {:?}: {e}", msg.message_type());
                    continue;
                }
            };
            if let Err(e) = writer.write_all(&bytes).await {
                debug!("surface write failed: {e}");
                break;
            }
        }
        let _ = writer.shutdown().await;
    })
}
