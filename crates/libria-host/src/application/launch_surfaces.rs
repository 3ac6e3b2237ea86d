//! Launching the configured UI processes.
//!
//! Each UI process learns where the host listens, which window it renders and
//! which identity to announce from the environment it is launched with (see
//! [`libria_core::domain::context`]).  A launch failure is not fatal for the
//! host: it is reported through the error resolver so that an already
//! connected main window can display it.

use std::net::SocketAddr;
use std::path::PathBuf;

use async_trait::async_trait;
use libria_core::{ErrorReport, ErrorResolver, SurfaceId};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::manage_surfaces::SharedRegistry;
use crate::application::shell_commands::report_to_main;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to spawn {} for surface '{}'", .command.display(), .label)]
    Spawn {
        label: String,
        command: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Everything needed to start one UI process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub label: String,
    pub command: PathBuf,
    pub args: Vec<String>,
    /// Identity the UI process must announce in its `Hello`.
    pub surface_id: SurfaceId,
    /// Where the host's IPC server listens.
    pub endpoint: SocketAddr,
    /// Open developer tools as soon as the window is up.
    pub devtools: bool,
}

impl LaunchSpec {
    pub fn new(
        label: impl Into<String>,
        command: impl Into<PathBuf>,
        endpoint: SocketAddr,
    ) -> Self {
        Self {
            label: label.into(),
            command: command.into(),
            args: Vec::new(),
            surface_id: Uuid::new_v4(),
            endpoint,
            devtools: false,
        }
    }
}

/// A started UI process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchedSurface {
    pub surface_id: SurfaceId,
    pub label: String,
    pub pid: Option<u32>,
}

/// Starts UI processes.  The infrastructure implementation spawns OS
/// processes; tests substitute a mock.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SurfaceLauncher: Send + Sync {
    async fn launch(&self, spec: &LaunchSpec) -> Result<LaunchedSurface, LaunchError>;
}

/// Launches every spec in order, reporting each failure to the main window.
///
/// Returns the surfaces that started.
pub async fn launch_all(
    launcher: &dyn SurfaceLauncher,
    specs: &[LaunchSpec],
    errors: &ErrorResolver,
    registry: &SharedRegistry,
) -> Vec<LaunchedSurface> {
    let mut launched = Vec::with_capacity(specs.len());
    for spec in specs {
        match launcher.launch(spec).await {
            Ok(surface) => {
                info!(label = %surface.label, pid = ?surface.pid, "surface launched");
                launched.push(surface);
            }
            Err(e) => {
                warn!("{e}");
                report_to_main(errors, registry, &ErrorReport::from_error(&e));
            }
        }
    }
    launched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::manage_surfaces::SurfaceRegistry;
    use libria_core::events::ERROR_EMIT;
    use libria_core::{listener, Bridge, ContextDescriptor, EventBus, FixedContext};
    use std::sync::{Arc, Mutex};

    fn endpoint() -> SocketAddr {
        "127.0.0.1:47000".parse().unwrap()
    }

    fn ok_launch(spec: &LaunchSpec) -> Result<LaunchedSurface, LaunchError> {
        Ok(LaunchedSurface {
            surface_id: spec.surface_id,
            label: spec.label.clone(),
            pid: Some(4242),
        })
    }

    #[test]
    fn test_launch_spec_new_assigns_fresh_identity() {
        let a = LaunchSpec::new("main", "/usr/bin/libria-ui", endpoint());
        let b = LaunchSpec::new("main", "/usr/bin/libria-ui", endpoint());
        assert_ne!(a.surface_id, b.surface_id);
        assert!(!a.devtools);
    }

    #[test]
    fn test_launch_all_returns_started_surfaces_in_order() {
        // Arrange
        let mut launcher = MockSurfaceLauncher::new();
        launcher.expect_launch().times(2).returning(ok_launch);
        let errors = ErrorResolver::new(Bridge::new(
            Arc::new(FixedContext(ContextDescriptor::PRIVILEGED)),
            EventBus::new(),
        ));
        let specs = [
            LaunchSpec::new("main", "/usr/bin/libria-ui", endpoint()),
            LaunchSpec::new("torrent", "/usr/bin/libria-ui", endpoint()),
        ];

        // Act
        let launched = tokio_test::block_on(launch_all(
            &launcher,
            &specs,
            &errors,
            &SurfaceRegistry::shared(),
        ));

        // Assert
        let labels: Vec<&str> = launched.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, ["main", "torrent"]);
        assert_eq!(launched[0].surface_id, specs[0].surface_id);
    }

    #[test]
    fn test_failed_launch_is_reported_and_others_continue() {
        // Arrange
        let mut launcher = MockSurfaceLauncher::new();
        launcher
            .expect_launch()
            .withf(|spec| spec.label == "main")
            .returning(|spec| {
                Err(LaunchError::Spawn {
                    label: spec.label.clone(),
                    command: spec.command.clone(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                })
            });
        launcher
            .expect_launch()
            .withf(|spec| spec.label == "torrent")
            .returning(ok_launch);
        let bridge = Bridge::new(
            Arc::new(FixedContext(ContextDescriptor::PRIVILEGED)),
            EventBus::new(),
        );
        let reported = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reported);
        bridge
            .bus()
            .on(ERROR_EMIT, listener(move |p| sink.lock().unwrap().push(p.clone())));
        let errors = ErrorResolver::new(bridge);
        let specs = [
            LaunchSpec::new("main", "/missing/libria-ui", endpoint()),
            LaunchSpec::new("torrent", "/usr/bin/libria-ui", endpoint()),
        ];

        // Act
        let launched = tokio_test::block_on(launch_all(
            &launcher,
            &specs,
            &errors,
            &SurfaceRegistry::shared(),
        ));

        // Assert
        assert_eq!(launched.len(), 1);
        let reported = reported.lock().unwrap();
        assert_eq!(reported.len(), 1);
        let message = reported[0]["message"].as_str().unwrap();
        assert!(message.contains("/missing/libria-ui"), "{message}");
    }
}
