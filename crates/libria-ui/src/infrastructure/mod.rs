//! Infrastructure layer of the UI process.
//!
//! - **`host_link`** – The reconnecting TCP link to the privileged host;
//!   implements [`libria_core::HostChannel`].

pub mod host_link;
