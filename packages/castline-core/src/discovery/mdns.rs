//! Service-advertisement (mDNS/DNS-SD) discovery.
//!
//! Unlike SSDP rounds, browsing is continuous: the scanner stays registered for its
//! service type until cancelled and reports every resolution and loss it hears about.
//!
//! # Key Design Points
//!
//! - The platform facility sits behind [`AdvertisementSource`]; [`MdnsSource`] wraps
//!   the `mdns-sd` daemon
//! - Uses resolved record data (IPv4 from SRV/A answers), never name parsing, for the address
//! - A resolution without an IPv4 address or port is a failure: logged, never retried
//! - `stop_browse()` runs exactly once when the scanner task ends

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use futures::stream::{self, BoxStream};
use futures::StreamExt;
use mdns_sd::{ResolvedService, ServiceDaemon, ServiceEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::types::{DeviceStream, DiscoveryError, DiscoveryResult, ScanEvent};
use crate::device::{CastDevice, CastProtocol, DeviceIdentity, DeviceType};

/// A service instance after address resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAdvertisement {
    /// Fully qualified instance name, e.g. `Den._airplay._tcp.local.`.
    pub fullname: String,
    pub addresses: Vec<IpAddr>,
    pub port: u16,
    /// Value of the TXT `model` key, when advertised.
    pub model: Option<String>,
}

impl ResolvedAdvertisement {
    fn ipv4(&self) -> Option<Ipv4Addr> {
        self.addresses.iter().find_map(|addr| match addr {
            IpAddr::V4(v4) => Some(*v4),
            IpAddr::V6(_) => None,
        })
    }
}

/// Notifications produced by an [`AdvertisementSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvertisementEvent {
    /// A service instance appeared; resolution is pending.
    Appeared { fullname: String },
    /// Resolution finished.
    Resolved(ResolvedAdvertisement),
    /// The platform gave up resolving an instance.
    ResolveFailed { fullname: String, reason: String },
    /// A previously announced instance went away.
    Lost { fullname: String },
}

/// Platform service-advertisement facility.
pub trait AdvertisementSource: Send + Sync + 'static {
    /// Registers for `service_type` and returns its notifications.
    fn browse(&self, service_type: &str)
        -> DiscoveryResult<BoxStream<'static, AdvertisementEvent>>;

    /// Unregisters the listener for `service_type`.
    fn stop_browse(&self, service_type: &str);
}

/// [`AdvertisementSource`] backed by a shared `mdns-sd` daemon.
#[derive(Clone)]
pub struct MdnsSource {
    daemon: Arc<ServiceDaemon>,
}

impl MdnsSource {
    /// Creates a new mDNS service daemon.
    ///
    /// The daemon spawns a background thread; create it once and share it.
    pub fn new() -> DiscoveryResult<Self> {
        let daemon = ServiceDaemon::new().map_err(|e| DiscoveryError::MdnsDaemon(e.to_string()))?;
        Ok(Self {
            daemon: Arc::new(daemon),
        })
    }

    /// Shuts the daemon down. Browses still running end their streams.
    pub fn shutdown(&self) {
        if let Err(e) = self.daemon.shutdown() {
            log::debug!("[mDNS] Daemon shutdown: {:?}", e);
        }
    }
}

impl AdvertisementSource for MdnsSource {
    fn browse(
        &self,
        service_type: &str,
    ) -> DiscoveryResult<BoxStream<'static, AdvertisementEvent>> {
        let receiver = self
            .daemon
            .browse(service_type)
            .map_err(|e| DiscoveryError::MdnsDaemon(e.to_string()))?;

        Ok(stream::unfold(receiver, |rx| async move {
            loop {
                match rx.recv_async().await {
                    Ok(event) => {
                        if let Some(mapped) = map_service_event(event) {
                            return Some((mapped, rx));
                        }
                    }
                    Err(e) => {
                        log::debug!("[mDNS] Receiver channel closed: {:?}", e);
                        return None;
                    }
                }
            }
        })
        .boxed())
    }

    fn stop_browse(&self, service_type: &str) {
        if let Err(e) = self.daemon.stop_browse(service_type) {
            log::warn!("[mDNS] Failed to stop browse for {}: {:?}", service_type, e);
        }
    }
}

fn map_service_event(event: ServiceEvent) -> Option<AdvertisementEvent> {
    match event {
        ServiceEvent::ServiceFound(_, fullname) => Some(AdvertisementEvent::Appeared { fullname }),
        ServiceEvent::ServiceResolved(info) => Some(AdvertisementEvent::Resolved(
            resolved_from_service(&info),
        )),
        ServiceEvent::ServiceRemoved(_, fullname) => Some(AdvertisementEvent::Lost { fullname }),
        _ => None,
    }
}

fn resolved_from_service(info: &ResolvedService) -> ResolvedAdvertisement {
    let addresses = info.addresses.iter().map(|addr| addr.to_ip_addr()).collect();
    ResolvedAdvertisement {
        fullname: info.fullname.clone(),
        addresses,
        port: info.port,
        model: info
            .txt_properties
            .get_property_val_str("model")
            .map(str::to_string),
    }
}

/// Strips the `.<service type>` suffix from a fully qualified instance name.
fn instance_name<'a>(fullname: &'a str, service_type: &str) -> &'a str {
    let service_type = service_type.trim_end_matches('.');
    fullname
        .trim_end_matches('.')
        .strip_suffix(service_type)
        .map(|rest| rest.trim_end_matches('.'))
        .filter(|rest| !rest.is_empty())
        .unwrap_or(fullname)
}

/// Builds the device record for a successful resolution.
fn device_from_advertisement(
    protocol: CastProtocol,
    service_type: &str,
    resolved: &ResolvedAdvertisement,
) -> Result<CastDevice, DiscoveryError> {
    let failure = |reason: &str| DiscoveryError::Resolution {
        name: resolved.fullname.clone(),
        reason: reason.to_string(),
    };
    let ip = resolved.ipv4().ok_or_else(|| failure("no IPv4 address"))?;
    if resolved.port == 0 {
        return Err(failure("no port"));
    }

    Ok(CastDevice::new(
        DeviceIdentity::new(protocol, resolved.fullname.as_str()),
        instance_name(&resolved.fullname, service_type),
        ip.to_string(),
        resolved.port,
        DeviceType::classify(protocol, resolved.model.as_deref()),
    ))
}

/// Continuous scanner over an [`AdvertisementSource`].
#[derive(Clone)]
pub struct ServiceAdvertisementScanner {
    protocol: CastProtocol,
    source: Arc<dyn AdvertisementSource>,
}

impl ServiceAdvertisementScanner {
    pub fn new(protocol: CastProtocol, source: Arc<dyn AdvertisementSource>) -> Self {
        Self { protocol, source }
    }

    pub fn protocol(&self) -> CastProtocol {
        self.protocol
    }

    /// Starts browsing for `service_type`.
    ///
    /// Registration happens before this returns, so a daemon failure surfaces here.
    /// The stream stays open until cancelled or the source ends.
    pub fn discover(&self, service_type: &str) -> DiscoveryResult<DeviceStream> {
        let events = self.source.browse(service_type)?;
        log::debug!("[mDNS] {} browsing {}", self.protocol, service_type);

        let browse = Browse {
            protocol: self.protocol,
            service_type: service_type.to_string(),
            source: Arc::clone(&self.source),
        };
        Ok(DeviceStream::spawn("mDNS", move |tx, cancel| {
            browse.run(events, tx, cancel)
        }))
    }
}

struct Browse {
    protocol: CastProtocol,
    service_type: String,
    source: Arc<dyn AdvertisementSource>,
}

impl Browse {
    async fn run(
        self,
        mut events: BoxStream<'static, AdvertisementEvent>,
        tx: mpsc::Sender<ScanEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = events.next() => match event {
                    Some(event) => event,
                    None => {
                        log::debug!("[mDNS] {} source ended", self.service_type);
                        break;
                    }
                },
            };

            let Some(out) = self.handle(event) else {
                continue;
            };
            if tx.send(out).await.is_err() {
                break;
            }
        }

        drop(events);
        self.source.stop_browse(&self.service_type);
        log::debug!("[mDNS] {} browse stopped", self.service_type);
    }

    fn handle(&self, event: AdvertisementEvent) -> Option<ScanEvent> {
        match event {
            AdvertisementEvent::Appeared { fullname } => {
                log::trace!("[mDNS] Service appeared: {}", fullname);
                None
            }
            AdvertisementEvent::Resolved(resolved) => {
                match device_from_advertisement(self.protocol, &self.service_type, &resolved) {
                    Ok(device) => {
                        log::debug!(
                            "[mDNS] Discovered {} at {}:{}",
                            device.display_name(),
                            device.host(),
                            device.port()
                        );
                        Some(ScanEvent::Found(device))
                    }
                    Err(e) => {
                        log::info!("[mDNS] {}", e);
                        None
                    }
                }
            }
            AdvertisementEvent::ResolveFailed { fullname, reason } => {
                log::info!(
                    "[mDNS] {}",
                    DiscoveryError::Resolution {
                        name: fullname,
                        reason
                    }
                );
                None
            }
            AdvertisementEvent::Lost { fullname } => {
                log::info!("[mDNS] Service lost: {}", fullname);
                Some(ScanEvent::Lost(DeviceIdentity::new(self.protocol, fullname)))
            }
        }
    }
}
