//! Libria host entry point.
//!
//! ```text
//! main()
//!  ├─ load config (file, then CLI overrides)
//!  ├─ IpcServer::bind + spawn        -- accepts UI processes
//!  ├─ install_app_commands           -- about panel, devtools toggles
//!  ├─ catch_error                    -- host-local error log
//!  ├─ launch_all                     -- configured UI processes
//!  └─ wait for Ctrl-C, then shut everything down
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use libria_core::{
    AppResolver, Bridge, ContextDescriptor, EnvironmentDetector, ErrorResolver, EventBus,
    InboundListeners,
};
use libria_host::application::launch_surfaces::{launch_all, LaunchSpec};
use libria_host::application::manage_surfaces::SurfaceRegistry;
use libria_host::application::shell_commands::{install_app_commands, HeadlessAboutPanel};
use libria_host::infrastructure::ipc::{IpcServer, SurfaceEvent};
use libria_host::infrastructure::launcher::ProcessLauncher;
use libria_host::infrastructure::storage::config::{load_config, load_config_from, HostConfig};

/// Privileged host process of the Libria desktop shell.
#[derive(Debug, Parser)]
#[command(
    name = "libria-host",
    about = "Privileged host process of the Libria desktop shell",
    version
)]
struct Cli {
    /// Configuration file.  Defaults to `config.toml` in the platform config
    /// directory.
    #[arg(long, env = "LIBRIA_CONFIG")]
    config: Option<PathBuf>,

    /// IPC port, overriding `ipc.port`.  `0` picks an ephemeral port.
    #[arg(long)]
    port: Option<u16>,

    /// IPC bind address, overriding `ipc.bind_address`.
    #[arg(long)]
    bind: Option<String>,
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<HostConfig> {
        let mut config = match &self.config {
            Some(path) => load_config_from(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => load_config().context("failed to load config")?,
        };
        if let Some(port) = self.port {
            config.ipc.port = port;
        }
        if let Some(bind) = &self.bind {
            config.ipc.bind_address = bind.clone();
        }
        Ok(config)
    }
}

/// Builds one launch spec per configured surface that has a command.
fn launch_specs(config: &HostConfig, bound: SocketAddr) -> Vec<LaunchSpec> {
    // UI processes run on this machine; a wildcard bind is reached via loopback.
    let endpoint = if bound.ip().is_unspecified() {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), bound.port())
    } else {
        bound
    };
    config
        .surfaces
        .iter()
        .filter_map(|entry| {
            let command = entry.command.as_ref()?;
            let mut spec = LaunchSpec::new(&entry.label, command, endpoint);
            spec.args = entry.args.clone();
            spec.devtools = entry.devtools_on_start;
            Some(spec)
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    // Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.shell.log_level)),
        )
        .init();

    info!("{} host starting", config.shell.app_name);

    // ── Bridge ────────────────────────────────────────────────────────────────
    let inbound = InboundListeners::new();
    let bridge = Bridge::new(Arc::new(EnvironmentDetector::from_env(true)), EventBus::process())
        .with_inbound(inbound.clone());
    if bridge.context() != ContextDescriptor::PRIVILEGED {
        warn!(
            context = ?bridge.context(),
            "host was started with a shell endpoint in its environment; bridge events stay local"
        );
    }

    // ── IPC server ────────────────────────────────────────────────────────────
    let registry = SurfaceRegistry::shared();
    let (server, mut surface_events) = IpcServer::bind(
        config.ipc.server_config()?,
        Arc::clone(&registry),
        inbound,
    )
    .await
    .context("failed to start IPC server")?;
    let server = server.spawn()?;

    tokio::spawn(async move {
        while let Some(event) = surface_events.recv().await {
            match event {
                SurfaceEvent::Connected { id, label } => info!(%id, %label, "window ready"),
                SurfaceEvent::Rejected { id, label, reason } => {
                    warn!(%id, %label, reason, "window refused")
                }
                SurfaceEvent::Disconnected { id, label } => info!(%id, %label, "window gone"),
            }
        }
    });

    // ── Resolvers ─────────────────────────────────────────────────────────────
    let apps = AppResolver::new(bridge.clone());
    let panel = Arc::new(HeadlessAboutPanel {
        app_name: config.shell.app_name.clone(),
        version: config.shell.version.clone(),
    });
    let commands = install_app_commands(&apps, &registry, panel);

    let errors = ErrorResolver::new(bridge.clone());
    let local_errors = errors.catch_error(|report| {
        error!(
            message = %report.message,
            detail = ?report.detail,
            "error with no window to show it"
        );
    });

    // ── UI processes ──────────────────────────────────────────────────────────
    let launcher = ProcessLauncher::new();
    let specs = launch_specs(&config, server.local_addr());
    let launched = launch_all(&launcher, &specs, &errors, &registry).await;
    info!(
        "{} of {} configured surfaces launched; listening on {}",
        launched.len(),
        specs.len(),
        server.local_addr()
    );

    // ── Ctrl-C handler ────────────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => error!("failed to listen for Ctrl-C: {e}"),
        }
    });

    while running.load(Ordering::Relaxed) {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }

    // ── Shutdown ──────────────────────────────────────────────────────────────
    for command in &commands {
        apps.cancel(command);
    }
    errors.unsubscribe_error(&local_errors);
    server.shutdown().await;
    launcher.shutdown().await;

    info!("{} host stopped", config.shell.app_name);
    Ok(())
}
