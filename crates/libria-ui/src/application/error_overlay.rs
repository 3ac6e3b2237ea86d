//! Error overlay state of a UI surface.
//!
//! The overlay subscribes to error reports through the error resolver, so it
//! sees both reports raised in this process and reports the host sends to
//! this window.  It holds them until the user dismisses them.

use std::sync::{Arc, Mutex, PoisonError};

use libria_core::{ErrorReport, ErrorResolver, ErrorSubscription};
use tracing::info;

/// Reports shown in the overlay, oldest first.
#[derive(Debug)]
pub struct ErrorOverlay {
    reports: Arc<Mutex<Vec<ErrorReport>>>,
    subscription: Mutex<Option<ErrorSubscription>>,
}

impl ErrorOverlay {
    /// Subscribes a new overlay to `errors`.
    pub fn install(errors: &ErrorResolver) -> Self {
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reports);
        let subscription = errors.catch_error(move |report| {
            info!(message = %report.message, "error shown");
            sink.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(report.clone());
        });
        Self {
            reports,
            subscription: Mutex::new(Some(subscription)),
        }
    }

    /// Snapshot of the pending reports.
    pub fn reports(&self) -> Vec<ErrorReport> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Clears the overlay.  Returns how many reports were dismissed.
    pub fn dismiss_all(&self) -> usize {
        let mut reports = self.reports.lock().unwrap_or_else(PoisonError::into_inner);
        let dismissed = reports.len();
        reports.clear();
        dismissed
    }

    /// Stops receiving reports.  Returns `false` when already uninstalled.
    pub fn uninstall(&self, errors: &ErrorResolver) -> bool {
        let subscription = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match subscription {
            Some(sub) => errors.unsubscribe_error(&sub),
            None => false,
        }
    }
}
