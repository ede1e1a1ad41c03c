//! Runs every enabled scanner and feeds the device catalog.
//!
//! Responsibilities:
//! - Repeating SSDP rounds per protocol, with round-end ageing
//! - Continuous service-advertisement browsing
//! - Forwarding vendor-reported devices
//! - Cooperative shutdown that waits for every scanner to release its resources

use std::collections::HashSet;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::catalog::DeviceCatalog;
use crate::config::{DiscoveryConfig, SsdpTarget};
use crate::device::{CastProtocol, DeviceIdentity};
use crate::discovery::{
    AdvertisementSource, DescriptionFetcher, DeviceStream, ScanEvent, ServiceAdvertisementScanner,
    SsdpConfig, SsdpScanner, VendorScanner, VendorSessionAdapter,
};
use crate::events::{DiscoveryEvent, EventEmitter};
use crate::utils::now_millis;

/// Called for every explicit loss report (advertisement or vendor).
pub type LossHook = Arc<dyn Fn(&DeviceIdentity) + Send + Sync>;

/// Everything a scanner task needs to publish its findings.
#[derive(Clone)]
struct Sink {
    catalog: Arc<DeviceCatalog>,
    on_lost: LossHook,
}

impl Sink {
    fn apply(&self, event: ScanEvent) {
        match event {
            ScanEvent::Found(device) => {
                self.catalog.merge(device);
            }
            ScanEvent::Lost(identity) => {
                self.catalog.remove(&identity);
                (self.on_lost)(&identity);
            }
        }
    }
}

/// Builds and launches scanner tasks.
pub struct DiscoveryRunner {
    config: DiscoveryConfig,
    catalog: Arc<DeviceCatalog>,
    advertisements: Option<Arc<dyn AdvertisementSource>>,
    vendor: Arc<dyn VendorSessionAdapter>,
    emitter: Arc<dyn EventEmitter>,
}

impl DiscoveryRunner {
    /// `advertisements` is `None` when no advertisement facility is available;
    /// browsing is then skipped.
    pub fn new(
        config: DiscoveryConfig,
        catalog: Arc<DeviceCatalog>,
        advertisements: Option<Arc<dyn AdvertisementSource>>,
        vendor: Arc<dyn VendorSessionAdapter>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        Self {
            config,
            catalog,
            advertisements,
            vendor,
            emitter,
        }
    }

    pub fn catalog(&self) -> &Arc<DeviceCatalog> {
        &self.catalog
    }

    /// Launches every enabled scanner.
    ///
    /// A scanner that cannot start is reported and skipped; the others still run.
    /// Must be called within a Tokio runtime.
    pub fn start(&self, on_lost: LossHook) -> DiscoveryHandle {
        let cancel = CancellationToken::new();
        let sink = Sink {
            catalog: Arc::clone(&self.catalog),
            on_lost,
        };
        let mut tasks = Vec::new();

        if self.config.ssdp_enabled {
            let describer = self
                .config
                .describe_devices
                .then(|| DescriptionFetcher::new(self.config.description_timeout()));
            for target in &self.config.ssdp_targets {
                let scanner = SsdpScanner::new(
                    target.protocol,
                    SsdpConfig {
                        target: self.config.ssdp_target_addr,
                        bind: self.config.ssdp_bind_addr,
                        mx_value: self.config.ssdp_mx,
                        response_hint: target.response_hint.clone(),
                        describer: describer.clone(),
                    },
                );
                let rounds = SsdpRounds {
                    scanner,
                    target: target.clone(),
                    config: self.config.clone(),
                    sink: sink.clone(),
                    emitter: Arc::clone(&self.emitter),
                };
                tasks.push(tokio::spawn(rounds.run(cancel.clone())));
            }
        }

        if self.config.mdns_enabled {
            match &self.advertisements {
                Some(source) => {
                    let scanner =
                        ServiceAdvertisementScanner::new(CastProtocol::Airplay, Arc::clone(source));
                    match scanner.discover(&self.config.mdns_service_type) {
                        Ok(stream) => {
                            tasks.push(tokio::spawn(drain(stream, sink.clone(), cancel.clone())))
                        }
                        Err(e) => self.scanner_failed("mDNS", &e.to_string()),
                    }
                }
                None => self.scanner_failed("mDNS", "no advertisement daemon"),
            }
        }

        if self.config.vendor_enabled {
            let stream = VendorScanner::new(Arc::clone(&self.vendor)).discover();
            tasks.push(tokio::spawn(drain(stream, sink, cancel.clone())));
        }

        log::info!("[Discovery] Started {} scanner task(s)", tasks.len());
        self.emitter.emit_discovery(DiscoveryEvent::Started {
            timestamp: now_millis(),
        });

        DiscoveryHandle {
            cancel,
            tasks,
            emitter: Arc::clone(&self.emitter),
        }
    }

    fn scanner_failed(&self, scanner: &str, reason: &str) {
        log::warn!("[Discovery] {} scanner not started: {}", scanner, reason);
        self.emitter.emit_discovery(DiscoveryEvent::ScannerFailed {
            scanner: scanner.to_string(),
            reason: reason.to_string(),
            timestamp: now_millis(),
        });
    }
}

/// Running scanners. Dropping the handle cancels them without waiting.
pub struct DiscoveryHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    emitter: Arc<dyn EventEmitter>,
}

impl DiscoveryHandle {
    /// Cancels every scanner and waits until all of them have finished.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                if e.is_panic() {
                    log::warn!("[Discovery] Scanner task panicked: {}", e);
                }
            }
        }
        log::info!("[Discovery] Stopped");
        self.emitter.emit_discovery(DiscoveryEvent::Stopped {
            timestamp: now_millis(),
        });
    }
}

impl Drop for DiscoveryHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Forwards a stream until it ends or discovery is cancelled.
async fn drain(mut stream: DeviceStream, sink: Sink, cancel: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = stream.next_event() => match event {
                Some(event) => sink.apply(event),
                None => break,
            },
        }
    }
    stream.cancel().await;
}

/// Repeating SSDP rounds for one protocol.
struct SsdpRounds {
    scanner: SsdpScanner,
    target: SsdpTarget,
    config: DiscoveryConfig,
    sink: Sink,
    emitter: Arc<dyn EventEmitter>,
}

impl SsdpRounds {
    async fn run(self, cancel: CancellationToken) {
        let protocol = self.target.protocol;
        let label = format!("SSDP {}", protocol);

        loop {
            match self
                .scanner
                .scan(&self.target.search_target, self.config.ssdp_timeout())
                .await
            {
                Ok(mut stream) => {
                    let mut seen = HashSet::new();
                    let completed = loop {
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break false,
                            event = stream.next_event() => match event {
                                Some(ScanEvent::Found(device)) => {
                                    seen.insert(device.identity().clone());
                                    self.sink.apply(ScanEvent::Found(device));
                                }
                                Some(lost) => self.sink.apply(lost),
                                None => break true,
                            },
                        }
                    };
                    if !completed {
                        stream.cancel().await;
                        return;
                    }
                    self.sink.catalog.retain_seen(protocol, &seen);
                }
                Err(e) => {
                    // The query never went out, so absence from this round says nothing.
                    log::warn!("[Discovery] {} round failed to start: {}", label, e);
                    self.emitter.emit_discovery(DiscoveryEvent::ScannerFailed {
                        scanner: label.clone(),
                        reason: e.to_string(),
                        timestamp: now_millis(),
                    });
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.config.ssdp_round_interval()) => {}
            }
        }
    }
}
