//! Runtime context detection.
//!
//! Every dispatch decision is made against a [`ContextDescriptor`]: the
//! platform the process runs on (`plain` or `shell`) and, inside the shell,
//! the role of the process (`privileged` host or `ui` surface).
//!
//! # How the shell is recognised
//!
//! A process is in the shell when exactly one of the two shell API surfaces is
//! reachable:
//!
//! - The **window manager** capability belongs to the host binary.  Only the
//!   host can create and address UI surfaces, so it declares the capability
//!   when it builds its detector.
//! - The **host endpoint** is handed to a UI process by the host when it
//!   launches it, through the [`ENDPOINT_ENV`] environment variable.
//!
//! Neither present means a plain, browser-like context.  Both present is an
//! embedding anomaly (a host that was itself launched as a surface); the
//! detector resolves it to `plain`, the simplest transport.
//!
//! # Stability
//!
//! Capabilities are fixed for the lifetime of a process.  [`EnvironmentDetector`]
//! snapshots them once at construction, so [`ContextDetector::detect`] is a
//! pure function returning the same answer on every call.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Environment variable carrying the host's IPC address to a UI process.
pub const ENDPOINT_ENV: &str = "LIBRIA_SHELL_ENDPOINT";

/// Environment variable carrying the window label assigned by the host.
pub const SURFACE_LABEL_ENV: &str = "LIBRIA_SURFACE_LABEL";

/// Environment variable carrying the surface UUID assigned by the host.
pub const SURFACE_ID_ENV: &str = "LIBRIA_SURFACE_ID";

/// Whether the process runs inside the desktop shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// No shell APIs are reachable (browser-like context).
    Plain,
    /// Running inside the two-tier desktop shell.
    Shell,
}

/// Which side of the shell split the process is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The host process that owns window and lifecycle management.
    Privileged,
    /// A process rendering one user-facing surface.
    Ui,
}

/// Where the current code executes.
///
/// The role is only meaningful inside the shell, so it is carried by the
/// `Shell` variant rather than as an independent optional field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContextDescriptor {
    Plain,
    Shell(Role),
}

impl ContextDescriptor {
    /// The privileged host process.
    pub const PRIVILEGED: Self = Self::Shell(Role::Privileged);
    /// A UI process inside the shell.
    pub const UI: Self = Self::Shell(Role::Ui);

    pub fn platform(&self) -> Platform {
        match self {
            Self::Plain => Platform::Plain,
            Self::Shell(_) => Platform::Shell,
        }
    }

    /// Returns the shell role, or `None` on the plain platform.
    pub fn role(&self) -> Option<Role> {
        match self {
            Self::Plain => None,
            Self::Shell(role) => Some(*role),
        }
    }

    pub fn is_shell(&self) -> bool {
        matches!(self, Self::Shell(_))
    }
}

/// The shell API surfaces reachable from the current process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShellCapabilities {
    /// `true` in the host binary, which can create and address windows.
    pub window_manager: bool,
    /// Address of the privileged counterpart, injected into UI processes.
    pub host_endpoint: Option<SocketAddr>,
}

impl ShellCapabilities {
    /// Capabilities of the privileged host process.
    pub fn privileged() -> Self {
        Self {
            window_manager: true,
            host_endpoint: None,
        }
    }

    /// Capabilities of a UI process connected to `host_endpoint`.
    pub fn ui(host_endpoint: SocketAddr) -> Self {
        Self {
            window_manager: false,
            host_endpoint: Some(host_endpoint),
        }
    }

    /// Reads the host endpoint from [`ENDPOINT_ENV`].
    ///
    /// A missing or unparsable value means the endpoint is unreachable.
    pub fn from_env(window_manager: bool) -> Self {
        let host_endpoint = std::env::var(ENDPOINT_ENV)
            .ok()
            .and_then(|raw| raw.trim().parse().ok());
        Self {
            window_manager,
            host_endpoint,
        }
    }
}

/// Resolves a set of capabilities to a context descriptor.
///
/// Total: every combination maps to a descriptor, and the ambiguous one
/// (both surfaces reachable) maps to [`ContextDescriptor::Plain`].
pub fn detect(capabilities: &ShellCapabilities) -> ContextDescriptor {
    match (capabilities.window_manager, capabilities.host_endpoint) {
        (true, None) => ContextDescriptor::PRIVILEGED,
        (false, Some(_)) => ContextDescriptor::UI,
        (false, None) | (true, Some(_)) => ContextDescriptor::Plain,
    }
}

/// Source of the context descriptor consulted by the dispatcher.
pub trait ContextDetector: Send + Sync {
    fn detect(&self) -> ContextDescriptor;
}

/// Detector backed by the capabilities captured when the process started.
#[derive(Debug, Clone)]
pub struct EnvironmentDetector {
    capabilities: ShellCapabilities,
}

impl EnvironmentDetector {
    pub fn new(capabilities: ShellCapabilities) -> Self {
        Self { capabilities }
    }

    /// Snapshots the process environment.  See [`ShellCapabilities::from_env`].
    pub fn from_env(window_manager: bool) -> Self {
        Self::new(ShellCapabilities::from_env(window_manager))
    }

    pub fn capabilities(&self) -> &ShellCapabilities {
        &self.capabilities
    }
}

impl ContextDetector for EnvironmentDetector {
    fn detect(&self) -> ContextDescriptor {
        detect(&self.capabilities)
    }
}

/// Detector that always reports the same descriptor.
#[derive(Debug, Clone, Copy)]
pub struct FixedContext(pub ContextDescriptor);

impl ContextDetector for FixedContext {
    fn detect(&self) -> ContextDescriptor {
        self.0
    }
}
