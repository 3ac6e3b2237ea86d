//! Context-aware dispatch.
//!
//! Callers describe "what to do in each context" and let the dispatcher pick
//! exactly one behavior for the detected [`ContextDescriptor`]:
//!
//! ```rust
//! use libria_core::{run_on_platform, ContextDescriptor, OnPlatform};
//!
//! let transport = run_on_platform(
//!     ContextDescriptor::Plain,
//!     OnPlatform {
//!         plain: || "local bus",
//!         shell: || "channel",
//!     },
//! );
//! assert_eq!(transport, "local bus");
//! ```
//!
//! Behavior pairs are structs with one field per branch, so forgetting a
//! branch is a compile error.  Each call branches once, runs the chosen
//! behavior synchronously and returns its result unchanged; a panic inside a
//! behavior propagates to the caller.  There is no retry and no queuing here.

use crate::domain::context::{ContextDescriptor, Role};

/// Behaviors keyed by platform.
pub struct OnPlatform<P, S> {
    /// Runs when no shell APIs are reachable.
    pub plain: P,
    /// Runs inside the desktop shell, whatever the role.
    pub shell: S,
}

/// Behaviors keyed by shell role.
pub struct InProcess<P, U> {
    /// Runs in the privileged host process.
    pub privileged: P,
    /// Runs in a UI process.
    pub ui: U,
}

/// Runs `behaviors.plain` on the plain platform, otherwise `behaviors.shell`.
pub fn run_on_platform<R, P, S>(ctx: ContextDescriptor, behaviors: OnPlatform<P, S>) -> R
where
    P: FnOnce() -> R,
    S: FnOnce() -> R,
{
    match ctx {
        ContextDescriptor::Plain => (behaviors.plain)(),
        ContextDescriptor::Shell(_) => (behaviors.shell)(),
    }
}

/// Runs the behavior for the shell role of `ctx`.
///
/// # Panics
///
/// Panics when `ctx` is [`ContextDescriptor::Plain`].  Role dispatch is only
/// meaningful inside the shell; resolvers must nest it in the `shell` branch
/// of [`run_on_platform`].
pub fn run_in_process<R, P, U>(ctx: ContextDescriptor, behaviors: InProcess<P, U>) -> R
where
    P: FnOnce() -> R,
    U: FnOnce() -> R,
{
    match ctx {
        ContextDescriptor::Shell(Role::Privileged) => (behaviors.privileged)(),
        ContextDescriptor::Shell(Role::Ui) => (behaviors.ui)(),
        ContextDescriptor::Plain => {
            panic!("run_in_process called outside the desktop shell")
        }
    }
}

/// Runs `f` only in a UI process.  Returns `None` everywhere else.
pub fn run_in_ui<R>(ctx: ContextDescriptor, f: impl FnOnce() -> R) -> Option<R> {
    (ctx == ContextDescriptor::UI).then(f)
}

/// Runs `f` only in the privileged process.  Returns `None` everywhere else.
pub fn run_in_privileged<R>(ctx: ContextDescriptor, f: impl FnOnce() -> R) -> Option<R> {
    (ctx == ContextDescriptor::PRIVILEGED).then(f)
}
