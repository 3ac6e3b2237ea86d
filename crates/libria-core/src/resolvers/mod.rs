//! Domain resolvers.
//!
//! A resolver turns an application intent ("report this error", "show the
//! about panel") into the right transport for the current context.  Every
//! resolver is built from a [`Bridge`], the bundle of process-wide handles the
//! dispatcher needs.

pub mod app;
pub mod error;

use std::sync::Arc;

use crate::bus::EventBus;
use crate::channel::{HostChannel, InboundListeners};
use crate::domain::context::{ContextDescriptor, ContextDetector};

/// Process-wide handles shared by all resolvers.
///
/// Cheap to clone; clones share the same bus, inbound table and host link.
#[derive(Clone)]
pub struct Bridge {
    detector: Arc<dyn ContextDetector>,
    bus: EventBus,
    inbound: InboundListeners,
    host: Option<Arc<dyn HostChannel>>,
}

impl Bridge {
    pub fn new(detector: Arc<dyn ContextDetector>, bus: EventBus) -> Self {
        Self {
            detector,
            bus,
            inbound: InboundListeners::new(),
            host: None,
        }
    }

    /// Uses `inbound` as the table the transport delivers channel messages to.
    pub fn with_inbound(mut self, inbound: InboundListeners) -> Self {
        self.inbound = inbound;
        self
    }

    /// Attaches the UI process's link to its privileged counterpart.
    pub fn with_host(mut self, host: Arc<dyn HostChannel>) -> Self {
        self.host = Some(host);
        self
    }

    /// Detects the current context.  Called once per dispatch.
    pub fn context(&self) -> ContextDescriptor {
        self.detector.detect()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn inbound(&self) -> &InboundListeners {
        &self.inbound
    }

    pub fn host(&self) -> Option<&Arc<dyn HostChannel>> {
        self.host.as_ref()
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("context", &self.context())
            .field("bus", &self.bus)
            .field("inbound", &self.inbound)
            .field("host", &self.host.is_some())
            .finish()
    }
}
