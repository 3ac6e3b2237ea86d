//! [`SurfaceLauncher`] that starts UI processes as OS child processes.

use std::process::Stdio;

use async_trait::async_trait;
use libria_core::domain::context::{ENDPOINT_ENV, SURFACE_ID_ENV, SURFACE_LABEL_ENV};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::application::launch_surfaces::{
    LaunchError, LaunchSpec, LaunchedSurface, SurfaceLauncher,
};

/// Flag passed to UI processes that should open developer tools on start.
pub const DEVTOOLS_FLAG: &str = "--devtools";

/// Spawns each surface as a child process and keeps the children so they can
/// be stopped with the host.
#[derive(Debug, Default)]
pub struct ProcessLauncher {
    children: Mutex<Vec<(String, Child)>>,
}

impl ProcessLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the command line for `spec` without running it.
    pub fn command_for(spec: &LaunchSpec) -> Command {
        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args)
            .env(ENDPOINT_ENV, spec.endpoint.to_string())
            .env(SURFACE_LABEL_ENV, &spec.label)
            .env(SURFACE_ID_ENV, spec.surface_id.to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if spec.devtools {
            cmd.arg(DEVTOOLS_FLAG);
        }
        cmd
    }

    /// Number of children started and not yet reaped.
    pub async fn running(&self) -> usize {
        let mut children = self.children.lock().await;
        children.retain_mut(|(_, child)| matches!(child.try_wait(), Ok(None)));
        children.len()
    }

    /// Kills every child that is still running.
    pub async fn shutdown(&self) {
        let mut children = self.children.lock().await;
        for (label, child) in children.iter_mut() {
            if let Err(e) = child.start_kill() {
                debug!(%label, "kill skipped: {e}");
            }
        }
        for (label, mut child) in children.drain(..) {
            match child.wait().await {
                Ok(status) => debug!(%label, %status, "surface process exited"),
                Err(e) => warn!(%label, "failed to reap surface process: {e}"),
            }
        }
    }
}

#[async_trait]
impl SurfaceLauncher for ProcessLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> Result<LaunchedSurface, LaunchError> {
        let child = Self::command_for(spec)
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                label: spec.label.clone(),
                command: spec.command.clone(),
                source,
            })?;
        let pid = child.id();
        self.children.lock().await.push((spec.label.clone(), child));
        Ok(LaunchedSurface {
            surface_id: spec.surface_id,
            label: spec.label.clone(),
            pid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    fn spec() -> LaunchSpec {
        LaunchSpec::new("main", "libria-ui", "127.0.0.1:47001".parse().unwrap())
    }

    fn env_of<'a>(cmd: &'a Command, key: &str) -> Option<&'a OsStr> {
        cmd.as_std()
            .get_envs()
            .find(|(k, _)| *k == OsStr::new(key))
            .and_then(|(_, v)| v)
    }

    #[test]
    fn test_command_carries_shell_environment() {
        // Arrange
        let spec = spec();

        // Act
        let cmd = ProcessLauncher::command_for(&spec);

        // Assert
        assert_eq!(env_of(&cmd, ENDPOINT_ENV), Some(OsStr::new("127.0.0.1:47001")));
        assert_eq!(env_of(&cmd, SURFACE_LABEL_ENV), Some(OsStr::new("main")));
        let id = spec.surface_id.to_string();
        assert_eq!(env_of(&cmd, SURFACE_ID_ENV), Some(OsStr::new(&id)));
    }

    #[test]
    fn test_devtools_flag_only_when_requested() {
        let mut spec = spec();
        let plain = ProcessLauncher::command_for(&spec);

        spec.devtools = true;
        let with = ProcessLauncher::command_for(&spec);

        assert_eq!(plain.as_std().get_args().count(), 0);
        let args: Vec<&OsStr> = with.as_std().get_args().collect();
        assert_eq!(args, [OsStr::new(DEVTOOLS_FLAG)]);
    }

    #[tokio::test]
    async fn test_launch_missing_binary_is_spawn_error() {
        let launcher = ProcessLauncher::new();
        let spec = LaunchSpec::new(
            "main",
            "/nonexistent/libria-ui-binary",
            "127.0.0.1:47001".parse().unwrap(),
        );

        let err = launcher.launch(&spec).await.unwrap_err();

        assert!(matches!(err, LaunchError::Spawn { ref label, .. } if label == "main"));
        assert_eq!(launcher.running().await, 0);
    }
}
