//! Storage infrastructure: the host's configuration file.
//!
//! The `config` sub-module reads the TOML file from the platform config
//! directory (or an explicit path), falls back to defaults on first run, and
//! writes it back on request.

pub mod config;
