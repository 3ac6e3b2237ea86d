//! Registry of the UI surfaces currently connected to the host.
//!
//! The IPC server registers a surface once its handshake is accepted and
//! removes it when the connection ends.  Resolvers never hold a connection
//! directly: they address windows by label through [`NamedSurface`], which
//! looks the surface up at send time.
//!
//! ```text
//! Hello accepted ──► register ──► (by_label "main") ──► NamedSurface sends
//!                                                      │
//! connection ends ──► remove ─────────────────────────► TargetAbsent
//! ```

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use libria_core::{Delivery, Payload, SurfaceId, UiSurface};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Label of the application's main window.
pub const MAIN_LABEL: &str = "main";

/// Label of the torrent window.
pub const TORRENT_LABEL: &str = "torrent";

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("surface {0} is already connected")]
    DuplicateSurface(SurfaceId),
}

/// Snapshot of one registered surface, for logs and status output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceSummary {
    pub id: SurfaceId,
    pub label: String,
}

struct Entry {
    surface: Arc<dyn UiSurface>,
    /// Registration order; the newest surface wins a label lookup.
    order: u64,
}

/// In-memory registry of connected surfaces keyed by id.
#[derive(Default)]
pub struct SurfaceRegistry {
    surfaces: HashMap<SurfaceId, Entry>,
    next_order: u64,
}

/// The registry as shared between the IPC server and the resolvers.
pub type SharedRegistry = Arc<RwLock<SurfaceRegistry>>;

impl SurfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedRegistry {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Adds a connected surface.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateSurface`] when a surface with the same
    /// id is already connected.
    pub fn register(&mut self, surface: Arc<dyn UiSurface>) -> Result<(), RegistryError> {
        let id = surface.id();
        if self.surfaces.contains_key(&id) {
            return Err(RegistryError::DuplicateSurface(id));
        }
        let order = self.next_order;
        self.next_order += 1;
        self.surfaces.insert(id, Entry { surface, order });
        Ok(())
    }

    /// Removes a surface.  Returns `false` when it was not registered.
    pub fn remove(&mut self, id: SurfaceId) -> bool {
        self.surfaces.remove(&id).is_some()
    }

    pub fn contains(&self, id: SurfaceId) -> bool {
        self.surfaces.contains_key(&id)
    }

    pub fn get(&self, id: SurfaceId) -> Option<Arc<dyn UiSurface>> {
        self.surfaces.get(&id).map(|e| Arc::clone(&e.surface))
    }

    /// Returns the most recently registered surface carrying `label`.
    pub fn by_label(&self, label: &str) -> Option<Arc<dyn UiSurface>> {
        self.surfaces
            .values()
            .filter(|e| e.surface.label() == label)
            .max_by_key(|e| e.order)
            .map(|e| Arc::clone(&e.surface))
    }

    /// Returns a snapshot of all surfaces in registration order.
    pub fn all(&self) -> Vec<SurfaceSummary> {
        let mut entries: Vec<&Entry> = self.surfaces.values().collect();
        entries.sort_by_key(|e| e.order);
        entries
            .into_iter()
            .map(|e| SurfaceSummary {
                id: e.surface.id(),
                label: e.surface.label(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }
}

/// A surface addressed by window label, resolved on every send.
///
/// Resolvers can be wired with a `NamedSurface` before the window connects;
/// sends report [`Delivery::TargetAbsent`] until it does.
#[derive(Clone)]
pub struct NamedSurface {
    label: String,
    registry: SharedRegistry,
}

impl NamedSurface {
    pub fn new(label: impl Into<String>, registry: SharedRegistry) -> Self {
        Self {
            label: label.into(),
            registry,
        }
    }

    fn resolve(&self) -> Option<Arc<dyn UiSurface>> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_label(&self.label)
    }
}

impl UiSurface for NamedSurface {
    /// The id of the currently connected window, or nil when none is.
    fn id(&self) -> SurfaceId {
        self.resolve().map_or(Uuid::nil(), |s| s.id())
    }

    fn label(&self) -> String {
        self.label.clone()
    }

    fn send_to_surface(&self, name: &str, payload: &Payload) -> Delivery {
        match self.resolve() {
            Some(surface) => surface.send_to_surface(name, payload),
            None => {
                debug!(label = %self.label, event = name, "no surface with this label");
                Delivery::TargetAbsent
            }
        }
    }

    fn open_devtools(&self) -> Delivery {
        self.resolve()
            .map_or(Delivery::TargetAbsent, |s| s.open_devtools())
    }
}

impl std::fmt::Debug for NamedSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedSurface").field("label", &self.label).finish()
    }
}
