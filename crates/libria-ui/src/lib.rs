//! # libria-ui
//!
//! A UI process of the Libria desktop shell.  It renders one window (its
//! *surface*) and talks to the privileged host over the cross-process
//! channel: it announces itself with `Hello`, receives error reports and
//! devtools requests, and sends app commands upward.
//!
//! Started without a host endpoint, the same binary runs in the plain
//! topology and keeps every event on its local bus.

/// Application layer: error overlay and devtools.
pub mod application;

/// Infrastructure layer: the link to the host.
pub mod infrastructure;
