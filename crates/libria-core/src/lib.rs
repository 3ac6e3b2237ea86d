//! # libria-core
//!
//! Shared library for the Libria desktop shell containing the cross-context
//! event bridge: runtime context detection, the local event bus, the
//! cross-process channel contracts, the wire codec used between processes,
//! and the domain resolvers built on top of them.
//!
//! This crate is used by both the host (privileged) process and the UI
//! processes.  It has zero dependencies on sockets, async runtimes, or UI
//! frameworks.
//!
//! # Architecture overview
//!
//! The desktop client runs in one of two topologies:
//!
//! - **plain**: a single browser-like process with no shell APIs.  Every event
//!   stays on the in-process [`EventBus`].
//! - **shell**: one privileged host process that owns the windows, plus one
//!   UI process per window.  Events may cross between them over the
//!   cross-process channel.
//!
//! Application code never branches on the topology itself.  It calls a
//! domain resolver (for example [`ErrorResolver::emit_error`]), which asks the
//! dispatcher to pick the right behavior for the detected context:
//!
//! - **`domain`** – The context descriptor and its detector, plus the event
//!   name constants and the error report payload.
//! - **`bus`** – The synchronous in-process publish/subscribe bus.
//! - **`channel`** – The contracts of the cross-process channel: surface
//!   handles on the host side, the implicit host endpoint on the UI side, and
//!   the inbound listener table.
//! - **`dispatch`** – `run_on_platform` / `run_in_process`.
//! - **`protocol`** – How channel messages travel as bytes: a 24-byte header
//!   followed by a typed payload.
//! - **`resolvers`** – Error reporting and the app commands (about panel,
//!   devtools).

pub mod bus;
pub mod channel;
pub mod dispatch;
pub mod domain;
pub mod protocol;
pub mod resolvers;

pub use bus::{listener, EventBus, Listener};
pub use channel::{Delivery, HostChannel, InboundListeners, SurfaceId, UiSurface};
pub use dispatch::{
    run_in_privileged, run_in_process, run_in_ui, run_on_platform, InProcess, OnPlatform,
};
pub use domain::context::{
    ContextDescriptor, ContextDetector, EnvironmentDetector, FixedContext, Platform, Role,
    ShellCapabilities,
};
pub use domain::events::{self as events, ErrorReport, Payload};
pub use protocol::codec::{decode_message, encode_message, ProtocolError};
pub use protocol::messages::ChannelMessage;
pub use resolvers::{
    app::{AboutPanel, AppCommand, AppResolver, CommandHandler},
    error::{ErrorResolver, ErrorRoute, ErrorSubscription},
    Bridge,
};
