//! Application layer of the host.
//!
//! Use cases here depend on `libria_core` and on traits they define
//! ([`launch_surfaces::SurfaceLauncher`]); sockets and processes live in
//! `infrastructure`.
//!
//! - **`manage_surfaces`** – Registry of connected UI surfaces and
//!   label-addressed handles.
//! - **`shell_commands`** – Installs the app command handlers and routes
//!   host errors to the main window.
//! - **`launch_surfaces`** – Starts the configured UI processes.

pub mod launch_surfaces;
pub mod manage_surfaces;
pub mod shell_commands;
