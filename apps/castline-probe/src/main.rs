//! Castline Probe - headless discovery and session probe.
//!
//! Runs discovery on the local network, logs every catalog change, and can
//! optionally open a session with a device once it shows up.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use castline_core::{
    bootstrap_services, CastDevice, DiscoveryEvent, EventEmitter, SessionEvent,
    SessionOrchestrator, UnavailableVendorAdapter,
};
use clap::Parser;
use tokio::signal;

use crate::config::ProbeConfig;

/// Castline Probe - find cast receivers and test control sessions.
#[derive(Parser, Debug)]
#[command(name = "castline-probe")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "CASTLINE_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Connect to the first device whose name or identity matches (case-insensitive).
    #[arg(long, value_name = "NAME")]
    connect: Option<String>,
}

/// Writes core events to the log.
struct ProbeEventEmitter;

impl EventEmitter for ProbeEventEmitter {
    fn emit_session(&self, event: SessionEvent) {
        match event {
            SessionEvent::StateChanged { from, to, device, .. } => match device {
                Some(device) => log::info!("[Probe] Session {:?} -> {:?} ({})", from, to, device),
                None => log::info!("[Probe] Session {:?} -> {:?}", from, to),
            },
            SessionEvent::Failed { device, reason, .. } => {
                log::warn!("[Probe] Session with {} failed: {}", device, reason)
            }
        }
    }

    fn emit_discovery(&self, event: DiscoveryEvent) {
        match event {
            DiscoveryEvent::ScannerFailed {
                scanner, reason, ..
            } => log::warn!("[Probe] {} scanner unavailable: {}", scanner, reason),
            other => log::debug!("[Probe] {:?}", other),
        }
    }
}

fn matches_target(device: &CastDevice, target: &str) -> bool {
    device.display_name().eq_ignore_ascii_case(target)
        || device.identity().to_string().eq_ignore_ascii_case(target)
}

/// Logs catalog changes and connects to `target` the first time it appears.
async fn watch_catalog(orchestrator: Arc<SessionOrchestrator>, target: Option<String>) {
    let mut views = orchestrator.catalog().subscribe();
    let mut pending = target;

    loop {
        let view = views.borrow_and_update().clone();
        log::info!("[Probe] {} device(s) in catalog", view.len());
        for device in view.iter() {
            log::info!(
                "[Probe]   {} [{}] {}:{} ({})",
                device.display_name(),
                device.protocol(),
                device.host(),
                device.port(),
                device.identity()
            );
        }

        if let Some(name) = pending.as_deref() {
            if let Some(device) = view.iter().find(|d| matches_target(d, name)).cloned() {
                pending = None;
                let orchestrator = Arc::clone(&orchestrator);
                tokio::spawn(async move {
                    if let Err(e) = orchestrator.connect(device).await {
                        log::error!("[Probe] Connect failed: {}", e);
                    }
                });
            }
        }

        if views.changed().await.is_err() {
            break;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Castline Probe v{}", env!("CARGO_PKG_VERSION"));

    let config = ProbeConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    log::info!(
        "Configuration: ssdp={}, mdns={}, round_interval={}ms",
        config.discovery_ssdp,
        config.discovery_mdns,
        config.round_interval_ms
    );

    let services = bootstrap_services(
        &config.to_core_config(),
        Arc::new(UnavailableVendorAdapter),
        Arc::new(ProbeEventEmitter),
    )
    .context("Failed to bootstrap services")?;

    services.orchestrator.start_discovery().await;
    log::info!("Discovery started");

    let watcher = tokio::spawn(watch_catalog(
        Arc::clone(&services.orchestrator),
        args.connect,
    ));

    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");
    watcher.abort();
    services.shutdown().await;

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
