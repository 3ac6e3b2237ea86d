//! Error reporting across contexts.
//!
//! | context    | `emit_error`                                  | `catch_error` listens on |
//! |------------|-----------------------------------------------|--------------------------|
//! | plain      | local bus                                     | local bus                |
//! | privileged | channel to `target`, local bus when none/gone | local bus                |
//! | ui         | local bus (never sent upward)                 | channel inbound + bus    |

use std::sync::Arc;

use tracing::{debug, warn};

use crate::bus::{listener, Listener};
use crate::channel::{Delivery, SurfaceId, UiSurface};
use crate::dispatch::{run_in_process, run_in_ui, run_on_platform, InProcess, OnPlatform};
use crate::domain::events::{ErrorReport, Payload, ERROR_EMIT};
use crate::resolvers::Bridge;

/// Where an emitted error went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorRoute {
    /// Emitted on the local bus; carries the number of listeners invoked.
    LocalBus(usize),
    /// Queued on the channel to the given surface.
    Channel(SurfaceId),
}

/// Handle returned by [`ErrorResolver::catch_error`].
///
/// Records every registration made so [`ErrorResolver::unsubscribe_error`]
/// can undo all of them.
#[derive(Clone)]
pub struct ErrorSubscription {
    listener: Listener,
    on_inbound: bool,
}

impl ErrorSubscription {
    /// Whether the subscription also listens on the cross-process channel.
    pub fn listens_on_channel(&self) -> bool {
        self.on_inbound
    }
}

impl std::fmt::Debug for ErrorSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorSubscription")
            .field("on_inbound", &self.on_inbound)
            .finish_non_exhaustive()
    }
}

/// Emits and observes [`ERROR_EMIT`] events.
#[derive(Debug, Clone)]
pub struct ErrorResolver {
    bridge: Bridge,
}

impl ErrorResolver {
    pub fn new(bridge: Bridge) -> Self {
        Self { bridge }
    }

    /// Reports `report` to whoever observes errors in this topology.
    ///
    /// `target` is only consulted in the privileged process: it names the UI
    /// surface that should display the error.  When it is `None`, or the
    /// surface is gone, the report falls back to the local bus.
    pub fn emit_error(&self, report: &ErrorReport, target: Option<&dyn UiSurface>) -> ErrorRoute {
        let payload = report.to_payload();
        let ctx = self.bridge.context();
        run_on_platform(
            ctx,
            OnPlatform {
                plain: || self.emit_locally(&payload),
                shell: || {
                    run_in_process(
                        ctx,
                        InProcess {
                            privileged: || self.send_to_target(&payload, target),
                            ui: || self.emit_locally(&payload),
                        },
                    )
                },
            },
        )
    }

    /// Registers `callback` for every error report this process can observe.
    ///
    /// In a UI process the callback is registered on both the channel inbound
    /// table and the local bus, so it runs once per arrival on either path.
    /// Payloads that are not an [`ErrorReport`] are logged and skipped.
    pub fn catch_error<F>(&self, callback: F) -> ErrorSubscription
    where
        F: Fn(&ErrorReport) + Send + Sync + 'static,
    {
        let wrapped = report_listener(callback);
        let on_inbound = run_in_ui(self.bridge.context(), || {
            self.bridge
                .inbound()
                .receive(ERROR_EMIT, Arc::clone(&wrapped));
        })
        .is_some();
        self.bridge.bus().on(ERROR_EMIT, Arc::clone(&wrapped));

        ErrorSubscription {
            listener: wrapped,
            on_inbound,
        }
    }

    /// Removes every registration `subscription` made.
    ///
    /// Returns `false` when nothing was registered any more.
    pub fn unsubscribe_error(&self, subscription: &ErrorSubscription) -> bool {
        let mut removed = self.bridge.bus().off(ERROR_EMIT, &subscription.listener);
        if subscription.on_inbound {
            removed |= self
                .bridge
                .inbound()
                .remove(ERROR_EMIT, &subscription.listener);
        }
        removed
    }

    fn emit_locally(&self, payload: &Payload) -> ErrorRoute {
        ErrorRoute::LocalBus(self.bridge.bus().emit(ERROR_EMIT, payload))
    }

    fn send_to_target(&self, payload: &Payload, target: Option<&dyn UiSurface>) -> ErrorRoute {
        let Some(surface) = target else {
            return self.emit_locally(payload);
        };
        match surface.send_to_surface(ERROR_EMIT, payload) {
            Delivery::Queued => ErrorRoute::Channel(surface.id()),
            Delivery::TargetAbsent => {
                debug!(surface = %surface.label(), "error target gone, using local bus");
                self.emit_locally(payload)
            }
        }
    }
}

fn report_listener<F>(callback: F) -> Listener
where
    F: Fn(&ErrorReport) + Send + Sync + 'static,
{
    listener(move |payload| match ErrorReport::from_payload(payload) {
        Ok(report) => callback(&report),
        Err(e) => warn!(event = ERROR_EMIT, "skipping malformed error report: {e}"),
    })
}
