//! Developer tools of a UI surface.
//!
//! A surface never opens its own devtools on a menu action: it asks the host,
//! which owns the windows, and the host answers with `OpenDevtools`.  On the
//! plain platform the request is a local bus event that this process handles
//! itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use libria_core::events::{APP_DEVTOOLS_MAIN, APP_DEVTOOLS_TORRENT};
use libria_core::{listener, AppCommand, AppResolver, EventBus, Listener};
use tracing::info;

/// The developer tools panel of this surface.
#[cfg_attr(test, mockall::automock)]
pub trait DevtoolsPanel: Send + Sync {
    fn open(&self);
    fn is_open(&self) -> bool;
}

/// Panel for a surface without a rendering engine: records and logs the
/// request.
#[derive(Debug)]
pub struct LoggingDevtools {
    label: String,
    open: AtomicBool,
}

impl LoggingDevtools {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            open: AtomicBool::new(false),
        }
    }
}

impl DevtoolsPanel for LoggingDevtools {
    fn open(&self) {
        if !self.open.swap(true, Ordering::Relaxed) {
            info!(label = %self.label, "developer tools opened");
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }
}

/// The devtools event for the window called `label`.  Any window other than
/// the torrent window uses the main one.
pub fn devtools_event(label: &str) -> &'static str {
    if label == "torrent" {
        APP_DEVTOOLS_TORRENT
    } else {
        APP_DEVTOOLS_MAIN
    }
}

/// Asks for this surface's devtools to be opened.
pub fn request_devtools(apps: &AppResolver, label: &str) -> AppCommand {
    if devtools_event(label) == APP_DEVTOOLS_TORRENT {
        apps.show_torrent_devtools(None)
    } else {
        apps.show_app_devtools(None)
    }
}

/// Opens `panel` when this surface's devtools event is emitted on the local
/// bus.  Only fires on the plain platform, where requests stay local.
pub fn open_on_local_request(
    bus: &EventBus,
    label: &str,
    panel: Arc<dyn DevtoolsPanel>,
) -> Listener {
    let handler = listener(move |_| panel.open());
    bus.on(devtools_event(label), Arc::clone(&handler));
    handler
}
