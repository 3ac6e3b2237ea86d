//! Application layer of the UI process.
//!
//! - **`error_overlay`** – Keeps the error reports caught in this surface
//!   until the user dismisses them.
//! - **`devtools`** – The developer tools panel of this surface and the
//!   request that asks the host to open it.

pub mod devtools;
pub mod error_overlay;
