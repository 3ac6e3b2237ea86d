//! Contracts of the cross-process channel.
//!
//! The channel carries named events between the privileged host and a UI
//! process.  The transport itself (sockets, tasks, framing) lives in the host
//! and UI crates; this module only defines what the resolvers rely on:
//!
//! ```text
//! privileged process                         UI process
//! ──────────────────                         ──────────
//! UiSurface::send_to_surface ──────────────► InboundListeners (UI side)
//! InboundListeners (host side) ◄──────────── HostChannel::send_to_host
//! ```
//!
//! # Best-effort delivery
//!
//! Sends are fire-and-forget: they enqueue and return immediately.  When the
//! addressed counterpart is gone (window closed, process exited, link down)
//! the message is dropped and the send reports [`Delivery::TargetAbsent`].
//! That is an expected condition, never an error.
//!
//! # Ordering
//!
//! Messages from one sender to one receiver arrive in send order.  Nothing is
//! promised across different senders, nor between channel messages and local
//! bus events.

use uuid::Uuid;

use crate::bus::{EventBus, Listener};
use crate::domain::events::Payload;

/// Identity of a UI surface (one window rendered by one UI process).
pub type SurfaceId = Uuid;

/// Outcome of a fire-and-forget send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a send may have been dropped; check for TargetAbsent"]
pub enum Delivery {
    /// Handed to the transport.  Not an acknowledgement of receipt.
    Queued,
    /// The counterpart is not reachable; the message was dropped.
    TargetAbsent,
}

impl Delivery {
    pub fn is_queued(self) -> bool {
        matches!(self, Delivery::Queued)
    }
}

/// Host-side handle to one UI surface.
///
/// Held only by the privileged process.  UI processes never see one.
#[cfg_attr(test, mockall::automock)]
pub trait UiSurface: Send + Sync {
    fn id(&self) -> SurfaceId;

    /// Window label, e.g. `"main"` or `"torrent"`.
    fn label(&self) -> String;

    /// Sends a named event to this surface.
    fn send_to_surface(&self, name: &str, payload: &Payload) -> Delivery;

    /// Asks this surface to open its developer tools.
    fn open_devtools(&self) -> Delivery;
}

/// UI-side endpoint of the channel.  Always addresses the privileged process.
#[cfg_attr(test, mockall::automock)]
pub trait HostChannel: Send + Sync {
    fn send_to_host(&self, name: &str, payload: &Payload) -> Delivery;
}

/// Listener table for messages arriving from the counterpart process.
///
/// The transport's reader task calls [`InboundListeners::deliver`] for each
/// inbound event, in arrival order.  Listener semantics (ordering, snapshot,
/// panic isolation) are those of [`EventBus`].
#[derive(Clone, Debug, Default)]
pub struct InboundListeners {
    table: EventBus,
}

impl InboundListeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for events named `name` sent by the counterpart.
    pub fn receive(&self, name: &str, listener: Listener) {
        self.table.on(name, listener);
    }

    /// Removes one registration of `listener`.  No-op when absent.
    pub fn remove(&self, name: &str, listener: &Listener) -> bool {
        self.table.off(name, listener)
    }

    /// Dispatches an inbound event.  Returns the number of listeners invoked.
    pub fn deliver(&self, name: &str, payload: &Payload) -> usize {
        self.table.emit(name, payload)
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.table.listener_count(name)
    }
}
