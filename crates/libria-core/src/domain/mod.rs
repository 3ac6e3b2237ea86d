//! Domain types for the event bridge.
//!
//! This module contains pure values with no infrastructure dependencies:
//!
//! - **`context`** – where the current code executes (platform and role) and
//!   how that is detected from the process's fixed capabilities.
//! - **`events`** – the event name constants shared by every participant and
//!   the payload types owned by the domain resolvers.

pub mod context;
pub mod events;
