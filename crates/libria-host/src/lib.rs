//! # libria-host
//!
//! The privileged process of the Libria desktop shell.  It owns the windows:
//! it launches one UI process per surface, accepts their IPC connections, and
//! serves the app commands and error reports that cross the bridge.
//!
//! # Layout
//!
//! - **`application`** – Surface registry, app command wiring, surface launch.
//! - **`infrastructure`** – IPC server, OS process launcher, config file.

pub mod application;
pub mod infrastructure;
