//! Libria UI process entry point.
//!
//! Launched by the host with `LIBRIA_SHELL_ENDPOINT`, `LIBRIA_SURFACE_LABEL`
//! and `LIBRIA_SURFACE_ID` in its environment.  Started by hand without an
//! endpoint it runs in the plain topology.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use libria_core::domain::context::{ENDPOINT_ENV, SURFACE_ID_ENV, SURFACE_LABEL_ENV};
use libria_core::protocol::DisconnectReason;
use libria_core::{
    AppResolver, Bridge, EnvironmentDetector, ErrorResolver, EventBus, HostChannel,
    InboundListeners, ShellCapabilities,
};
use libria_ui::application::devtools::{
    open_on_local_request, request_devtools, DevtoolsPanel, LoggingDevtools,
};
use libria_ui::application::error_overlay::ErrorOverlay;
use libria_ui::infrastructure::host_link::{HostConnection, HostLinkConfig, LinkEvent};

/// How long shutdown waits for the host to acknowledge the disconnect.
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

/// UI process of the Libria desktop shell.
#[derive(Debug, Parser)]
#[command(name = "libria-ui", about = "UI process of the Libria desktop shell", version)]
struct Cli {
    /// Address of the host's IPC server.  Absent means no shell.
    #[arg(long, env = ENDPOINT_ENV)]
    host: Option<SocketAddr>,

    /// Window label announced to the host.
    #[arg(long, default_value = "main", env = SURFACE_LABEL_ENV)]
    label: String,

    /// Surface identity.  A fresh one is generated when absent.
    #[arg(long, env = SURFACE_ID_ENV)]
    surface_id: Option<Uuid>,

    /// Ask for developer tools as soon as the surface is up.
    #[arg(long)]
    devtools: bool,

    /// Seconds between reconnect attempts.
    #[arg(long, default_value_t = 5)]
    reconnect_secs: u64,
}

impl Cli {
    fn capabilities(&self) -> ShellCapabilities {
        match self.host {
            Some(addr) => ShellCapabilities::ui(addr),
            None => ShellCapabilities::default(),
        }
    }

    fn link_config(&self, host_addr: SocketAddr) -> HostLinkConfig {
        HostLinkConfig {
            host_addr,
            surface_id: self.surface_id.unwrap_or_else(Uuid::new_v4),
            label: self.label.clone(),
            reconnect_interval: Duration::from_secs(self.reconnect_secs.max(1)),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let running = Arc::new(AtomicBool::new(true));

    // ── Bridge ────────────────────────────────────────────────────────────────
    let inbound = InboundListeners::new();
    let detector = Arc::new(EnvironmentDetector::new(cli.capabilities()));
    let mut bridge = Bridge::new(detector, EventBus::process()).with_inbound(inbound.clone());
    info!(label = %cli.label, context = ?bridge.context(), "surface starting");

    let panel: Arc<dyn DevtoolsPanel> = Arc::new(LoggingDevtools::new(&cli.label));
    open_on_local_request(bridge.bus(), &cli.label, Arc::clone(&panel));

    // ── Host link ─────────────────────────────────────────────────────────────
    let link = cli.host.map(|addr| Arc::new(HostConnection::new(cli.link_config(addr), inbound)));
    if let Some(link) = &link {
        bridge = bridge.with_host(Arc::clone(link) as Arc<dyn HostChannel>);
        let mut events = Arc::clone(link).start(Arc::clone(&running));
        let panel = Arc::clone(&panel);
        let apps = AppResolver::new(bridge.clone());
        let label = cli.label.clone();
        let devtools_on_start = cli.devtools;
        tokio::spawn(async move {
            let mut requested = false;
            while let Some(event) = events.recv().await {
                match event {
                    LinkEvent::Connected { host_addr } => info!(%host_addr, "host reachable"),
                    LinkEvent::Accepted => {
                        if devtools_on_start && !requested {
                            requested = true;
                            let _ = request_devtools(&apps, &label);
                        }
                    }
                    LinkEvent::Rejected { reason } => warn!(reason, "host refused this surface"),
                    LinkEvent::DevtoolsRequested => panel.open(),
                    LinkEvent::Disconnected => info!("host link lost"),
                }
            }
        });
    } else if cli.devtools {
        let _ = request_devtools(&AppResolver::new(bridge.clone()), &cli.label);
    }

    // ── Error overlay ─────────────────────────────────────────────────────────
    let errors = ErrorResolver::new(bridge.clone());
    let overlay = ErrorOverlay::install(&errors);

    // ── Ctrl-C handler ────────────────────────────────────────────────────────
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
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    // ── Shutdown ──────────────────────────────────────────────────────────────
    let pending = overlay.reports().len();
    overlay.uninstall(&errors);
    if let Some(link) = &link {
        let _ = link.close(DisconnectReason::SurfaceClosed, DISCONNECT_GRACE).await;
    }
    info!(label = %cli.label, pending, "surface stopped");
    Ok(())
}
