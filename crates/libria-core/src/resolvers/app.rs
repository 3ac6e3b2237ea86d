//! App commands: the about panel and per-window developer tools.
//!
//! In the shell, the privileged process *installs* a handler for each command
//! and UI processes *request* it by sending the event upward.  The same call
//! does either, depending on where it runs:
//!
//! ```rust,no_run
//! # use libria_core::{AppResolver, AboutPanel};
//! # use std::sync::Arc;
//! # fn wire(apps: &AppResolver, panel: Arc<dyn AboutPanel>) {
//! // host: start listening for `app:about`
//! // ui:   ask the host to show it
//! apps.show_about(panel);
//! # }
//! ```
//!
//! On the plain platform there is no host to ask, so the command is emitted on
//! the local bus for an in-process view to pick up.

use std::sync::Arc;

use tracing::{debug, info};

use crate::bus::{listener, Listener};
use crate::channel::{Delivery, UiSurface};
use crate::dispatch::{run_in_process, run_on_platform, InProcess, OnPlatform};
use crate::domain::events::{Payload, APP_ABOUT, APP_DEVTOOLS_MAIN, APP_DEVTOOLS_TORRENT};
use crate::resolvers::Bridge;

/// Renders the application's about panel.  Implemented by the host.
#[cfg_attr(test, mockall::automock)]
pub trait AboutPanel: Send + Sync {
    fn show(&self);
}

/// A command handler installed in the privileged process.
#[derive(Clone)]
pub struct CommandHandler {
    name: &'static str,
    listener: Listener,
}

impl CommandHandler {
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl std::fmt::Debug for CommandHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHandler").field("name", &self.name).finish()
    }
}

/// What an app command did in the current context.
#[derive(Debug, Clone)]
pub enum AppCommand {
    /// Privileged: a handler now listens for requests from UI processes.
    Listening(CommandHandler),
    /// UI: the request was sent to the host.
    Sent(Delivery),
    /// Plain: the command was emitted on the local bus to this many listeners.
    Emitted(usize),
}

/// Resolves the about and devtools commands.
#[derive(Debug, Clone)]
pub struct AppResolver {
    bridge: Bridge,
}

impl AppResolver {
    pub fn new(bridge: Bridge) -> Self {
        Self { bridge }
    }

    /// Shows the about panel.
    pub fn show_about(&self, panel: Arc<dyn AboutPanel>) -> AppCommand {
        self.resolve(APP_ABOUT, move || {
            info!("showing about panel");
            panel.show();
        })
    }

    /// Opens the developer tools of the main window.
    ///
    /// `surface` is only used by the privileged process.
    pub fn show_app_devtools(&self, surface: Option<Arc<dyn UiSurface>>) -> AppCommand {
        self.resolve(APP_DEVTOOLS_MAIN, devtools_opener(surface))
    }

    /// Opens the developer tools of the torrent window.
    ///
    /// `surface` is only used by the privileged process.
    pub fn show_torrent_devtools(&self, surface: Option<Arc<dyn UiSurface>>) -> AppCommand {
        self.resolve(APP_DEVTOOLS_TORRENT, devtools_opener(surface))
    }

    /// Removes a handler installed by one of the commands.
    pub fn cancel(&self, command: &AppCommand) -> bool {
        match command {
            AppCommand::Listening(handler) => {
                self.bridge.inbound().remove(handler.name, &handler.listener)
            }
            AppCommand::Sent(_) | AppCommand::Emitted(_) => false,
        }
    }

    fn resolve<H>(&self, name: &'static str, handler: H) -> AppCommand
    where
        H: Fn() + Send + Sync + 'static,
    {
        let ctx = self.bridge.context();
        run_on_platform(
            ctx,
            OnPlatform {
                plain: || AppCommand::Emitted(self.bridge.bus().emit(name, &Payload::Null)),
                shell: || {
                    run_in_process(
                        ctx,
                        InProcess {
                            privileged: || {
                                let listener = listener(move |_| handler());
                                self.bridge.inbound().receive(name, Arc::clone(&listener));
                                AppCommand::Listening(CommandHandler { name, listener })
                            },
                            ui: || AppCommand::Sent(self.send_upward(name)),
                        },
                    )
                },
            },
        )
    }

    fn send_upward(&self, name: &str) -> Delivery {
        match self.bridge.host() {
            Some(host) => host.send_to_host(name, &Payload::Null),
            None => {
                debug!(event = name, "no host link, dropping command");
                Delivery::TargetAbsent
            }
        }
    }
}

fn devtools_opener(surface: Option<Arc<dyn UiSurface>>) -> impl Fn() + Send + Sync + 'static {
    move || match &surface {
        Some(surface) => {
            if surface.open_devtools() == Delivery::TargetAbsent {
                debug!(surface = %surface.label(), "devtools target gone");
            }
        }
        None => debug!("devtools requested with no surface"),
    }
}
