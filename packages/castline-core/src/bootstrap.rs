//! Application bootstrap and dependency wiring.
//!
//! The composition root: every service is created here and wired together,
//! so hosts only supply the pieces that differ per platform (the vendor
//! session adapter and the event sink).

use std::sync::Arc;

use reqwest::Client;

use crate::catalog::DeviceCatalog;
use crate::config::Config;
use crate::discovery::{AdvertisementSource, MdnsSource, VendorSessionAdapter};
use crate::error::{CastError, CastResult};
use crate::events::EventEmitter;
use crate::services::{DiscoveryRunner, SessionOrchestrator};
use crate::transport::NetworkConnector;

/// Container for all bootstrapped services.
pub struct BootstrappedServices {
    /// Owns the session and the discovery lifecycle.
    pub orchestrator: Arc<SessionOrchestrator>,
    /// Live view of discovered devices.
    pub catalog: Arc<DeviceCatalog>,
    /// Advertisement daemon, absent when it could not be started.
    mdns: Option<Arc<MdnsSource>>,
}

impl BootstrappedServices {
    /// Whether service-advertisement browsing is available on this host.
    pub fn has_mdns(&self) -> bool {
        self.mdns.is_some()
    }

    /// Disconnects, stops discovery, then shuts the advertisement daemon down.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");
        self.orchestrator.shutdown().await;
        if let Some(mdns) = &self.mdns {
            mdns.shutdown();
        }
        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Creates the shared HTTP client used by control channels.
fn create_http_client(config: &Config) -> CastResult<Client> {
    Client::builder()
        .timeout(config.transport.connect_timeout())
        .build()
        .map_err(|e| CastError::Configuration(format!("failed to create HTTP client: {}", e)))
}

/// Bootstraps all services with their dependencies.
///
/// Wiring order:
///
/// 1. Configuration validation
/// 2. Shared HTTP client and network connector
/// 3. Advertisement daemon (optional; a failure is logged and browsing is skipped)
/// 4. Catalog and discovery runner
/// 5. Session orchestrator
///
/// # Errors
///
/// Returns [`CastError::Configuration`] if the configuration is invalid or the
/// HTTP client cannot be built.
pub fn bootstrap_services(
    config: &Config,
    vendor: Arc<dyn VendorSessionAdapter>,
    emitter: Arc<dyn EventEmitter>,
) -> CastResult<BootstrappedServices> {
    config.validate().map_err(CastError::Configuration)?;

    let http = create_http_client(config)?;
    let connector = Arc::new(NetworkConnector::new(http, config.transport.clone()));

    let mdns = if config.discovery.mdns_enabled {
        match MdnsSource::new() {
            Ok(source) => Some(Arc::new(source)),
            Err(e) => {
                log::warn!("[Bootstrap] mDNS unavailable, AirPlay discovery disabled: {}", e);
                None
            }
        }
    } else {
        None
    };

    let catalog = Arc::new(DeviceCatalog::new());
    let runner = DiscoveryRunner::new(
        config.discovery.clone(),
        Arc::clone(&catalog),
        mdns.clone()
            .map(|source| source as Arc<dyn AdvertisementSource>),
        Arc::clone(&vendor),
        Arc::clone(&emitter),
    );

    let orchestrator = Arc::new(SessionOrchestrator::new(runner, connector, vendor, emitter));

    Ok(BootstrappedServices {
        orchestrator,
        catalog,
        mdns,
    })
}
