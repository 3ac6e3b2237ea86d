//! Host-side wiring of the app commands and error reporting.
//!
//! The host installs one handler per app command at start-up; UI processes
//! trigger them by sending the command upward.  Errors raised by the host
//! itself are shown in the main window when it is connected.

use std::sync::Arc;

use libria_core::{
    AboutPanel, AppCommand, AppResolver, ErrorReport, ErrorResolver, ErrorRoute, UiSurface,
};
use tracing::info;

use crate::application::manage_surfaces::{NamedSurface, SharedRegistry, MAIN_LABEL, TORRENT_LABEL};

/// About panel for a host without a native window toolkit: logs the
/// application identity.
#[derive(Debug, Clone)]
pub struct HeadlessAboutPanel {
    pub app_name: String,
    pub version: String,
}

impl AboutPanel for HeadlessAboutPanel {
    fn show(&self) {
        info!(app = %self.app_name, version = %self.version, "about");
    }
}

/// Installs the about and devtools handlers.
///
/// Returns the installed commands so they can be cancelled on shutdown.
pub fn install_app_commands(
    apps: &AppResolver,
    registry: &SharedRegistry,
    panel: Arc<dyn AboutPanel>,
) -> Vec<AppCommand> {
    let main: Arc<dyn UiSurface> = Arc::new(NamedSurface::new(MAIN_LABEL, Arc::clone(registry)));
    let torrent: Arc<dyn UiSurface> =
        Arc::new(NamedSurface::new(TORRENT_LABEL, Arc::clone(registry)));
    vec![
        apps.show_about(panel),
        apps.show_app_devtools(Some(main)),
        apps.show_torrent_devtools(Some(torrent)),
    ]
}

/// Reports a host-side error to the main window, or locally when it is not
/// connected.
pub fn report_to_main(
    errors: &ErrorResolver,
    registry: &SharedRegistry,
    report: &ErrorReport,
) -> ErrorRoute {
    let main = NamedSurface::new(MAIN_LABEL, Arc::clone(registry));
    errors.emit_error(report, Some(&main))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::manage_surfaces::SurfaceRegistry;
    use libria_core::events::{APP_ABOUT, APP_DEVTOOLS_MAIN, APP_DEVTOOLS_TORRENT, ERROR_EMIT};
    use libria_core::{Bridge, ContextDescriptor, EventBus, FixedContext, Payload};

    fn host_bridge() -> Bridge {
        Bridge::new(Arc::new(FixedContext(ContextDescriptor::PRIVILEGED)), EventBus::new())
    }

    #[test]
    fn test_install_registers_one_handler_per_command() {
        // Arrange
        let bridge = host_bridge();
        let apps = AppResolver::new(bridge.clone());
        let registry = SurfaceRegistry::shared();
        let panel = Arc::new(HeadlessAboutPanel {
            app_name: "Libria".to_string(),
            version: "1.0".to_string(),
        });

        // Act
        let commands = install_app_commands(&apps, &registry, panel);

        // Assert
        assert_eq!(commands.len(), 3);
        for name in [APP_ABOUT, APP_DEVTOOLS_MAIN, APP_DEVTOOLS_TORRENT] {
            assert_eq!(bridge.inbound().listener_count(name), 1, "{name}");
        }
    }

    #[test]
    fn test_devtools_request_without_window_is_harmless() {
        let bridge = host_bridge();
        let apps = AppResolver::new(bridge.clone());
        let registry = SurfaceRegistry::shared();
        install_app_commands(
            &apps,
            &registry,
            Arc::new(HeadlessAboutPanel {
                app_name: "Libria".to_string(),
                version: "1.0".to_string(),
            }),
        );

        let invoked = bridge.inbound().deliver(APP_DEVTOOLS_MAIN, &Payload::Null);

        assert_eq!(invoked, 1);
    }

    #[test]
    fn test_report_to_main_without_window_stays_on_host_bus() {
        // Arrange
        let bridge = host_bridge();
        let errors = ErrorResolver::new(bridge.clone());
        let registry = SurfaceRegistry::shared();
        bridge.bus().on(ERROR_EMIT, libria_core::listener(|_| {}));

        // Act
        let route = report_to_main(&errors, &registry, &ErrorReport::new("launch failed"));

        // Assert
        assert_eq!(route, ErrorRoute::LocalBus(1));
    }
}
