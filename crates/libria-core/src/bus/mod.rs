//! Local event bus: synchronous, in-process publish/subscribe keyed by event name.
//!
//! The bus is the transport used whenever an event does not need to leave the
//! current process: always on the plain platform, and inside the shell for
//! observers living in the same process as the emitter.
//!
//! # Semantics
//!
//! - [`EventBus::emit`] invokes every listener registered for the name, in
//!   registration order, on the caller's thread.
//! - The listener list is snapshotted before iteration.  A listener that
//!   registers or removes listeners while being invoked affects the *next*
//!   emission only, and never deadlocks the bus.
//! - Registering the same listener twice yields two invocations per emission.
//! - A panicking listener is contained: the panic is logged and the
//!   remaining listeners still run.  Nothing is re-raised to the emitter.
//!
//! # Identity
//!
//! Listeners are `Arc<dyn Fn>`.  [`EventBus::off`] matches on `Arc` pointer
//! identity, so keep a clone of the `Arc` you registered to remove it later.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use tracing::{error, trace};

use crate::domain::events::Payload;

/// A callback registered against an event name.
pub type Listener = Arc<dyn Fn(&Payload) + Send + Sync>;

/// Wraps a closure as a [`Listener`].
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&Payload) + Send + Sync + 'static,
{
    Arc::new(f)
}

type ListenerTable = HashMap<String, Vec<Listener>>;

/// Cheap-to-clone handle to a listener table.
///
/// Clones share the same table.  A process normally creates one bus at start
/// and hands clones of it to every resolver; [`EventBus::process`] returns the
/// lazily created process-wide instance for code that cannot be handed one.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<RwLock<ListenerTable>>,
}

static PROCESS_BUS: OnceLock<EventBus> = OnceLock::new();

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide bus.  Created on first use and never replaced.
    pub fn process() -> EventBus {
        PROCESS_BUS.get_or_init(EventBus::new).clone()
    }

    /// Registers `listener` for `name`.
    pub fn on(&self, name: &str, listener: Listener) {
        let mut table = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        table.entry(name.to_string()).or_default().push(listener);
    }

    /// Removes the most recent registration of `listener` for `name`.
    ///
    /// Returns `false` (and does nothing) when it was never registered.
    pub fn off(&self, name: &str, listener: &Listener) -> bool {
        let mut table = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let Some(registered) = table.get_mut(name) else {
            return false;
        };
        let Some(pos) = registered.iter().rposition(|l| Arc::ptr_eq(l, listener)) else {
            return false;
        };
        registered.remove(pos);
        if registered.is_empty() {
            table.remove(name);
        }
        true
    }

    /// Invokes every listener currently registered for `name` with `payload`.
    ///
    /// Returns the number of listeners invoked, including ones that panicked.
    pub fn emit(&self, name: &str, payload: &Payload) -> usize {
        let snapshot: Vec<Listener> = {
            let table = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
            match table.get(name) {
                Some(registered) => registered.clone(),
                None => return 0,
            }
        };

        trace!(event = name, listeners = snapshot.len(), "emitting");
        for listener in &snapshot {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| listener(payload))) {
                error!(event = name, "listener panicked: {}", panic_message(&*panic));
            }
        }
        snapshot.len()
    }

    /// Number of registrations for `name`.
    pub fn listener_count(&self, name: &str) -> usize {
        let table = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        table.get(name).map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<_> = table.iter().map(|(k, v)| (k.as_str(), v.len())).collect();
        names.sort_unstable();
        f.debug_struct("EventBus").field("listeners", &names).finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
