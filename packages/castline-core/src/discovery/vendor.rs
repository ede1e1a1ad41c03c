//! Boundary to the vendor session SDK (Chromecast).
//!
//! The SDK owns both discovery and the session for its devices. This module only
//! maps what it reports into [`CastDevice`] records and forwards connect and
//! disconnect intents to it.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::types::{DeviceStream, ScanEvent};
use crate::device::{CastDevice, CastProtocol, DeviceIdentity, DeviceType};

/// Errors reported by a vendor session adapter.
#[derive(Debug, Error)]
pub enum VendorError {
    #[error("vendor session SDK is not available on this host")]
    Unavailable,

    #[error("vendor device not found: {0}")]
    UnknownDevice(String),

    #[error("vendor session failed: {0}")]
    Session(String),
}

/// A device as the vendor SDK describes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorDevice {
    /// SDK-assigned stable device id.
    pub id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub model: Option<String>,
}

impl VendorDevice {
    pub fn to_cast_device(&self) -> CastDevice {
        let protocol = CastProtocol::Chromecast;
        CastDevice::new(
            DeviceIdentity::new(protocol, self.id.as_str()),
            self.name.as_str(),
            self.host.as_str(),
            self.port,
            DeviceType::classify(protocol, self.model.as_deref()),
        )
    }
}

/// Device notifications from the vendor SDK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VendorEvent {
    Discovered(VendorDevice),
    /// The device with this id is no longer reachable.
    Lost(String),
}

/// Adapter over the vendor session SDK.
///
/// Implementations are expected to be cheap to call from any task.
#[async_trait]
pub trait VendorSessionAdapter: Send + Sync + 'static {
    /// Subscribes to the SDK's device route updates.
    fn discovered_devices(&self) -> BoxStream<'static, VendorEvent>;

    /// Asks the SDK to start a session with `device_id`.
    async fn connect(&self, device_id: &str) -> Result<(), VendorError>;

    /// Ends the current vendor session, if any.
    async fn disconnect(&self) -> Result<(), VendorError>;

    /// Whether the SDK currently holds a session.
    fn is_active(&self) -> bool;
}

/// Adapter for hosts without the vendor SDK: reports no devices and refuses sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableVendorAdapter;

#[async_trait]
impl VendorSessionAdapter for UnavailableVendorAdapter {
    fn discovered_devices(&self) -> BoxStream<'static, VendorEvent> {
        stream::empty().boxed()
    }

    async fn connect(&self, _device_id: &str) -> Result<(), VendorError> {
        Err(VendorError::Unavailable)
    }

    async fn disconnect(&self) -> Result<(), VendorError> {
        Ok(())
    }

    fn is_active(&self) -> bool {
        false
    }
}

/// Turns the adapter's route updates into a [`DeviceStream`].
#[derive(Clone)]
pub struct VendorScanner {
    adapter: Arc<dyn VendorSessionAdapter>,
}

impl VendorScanner {
    pub fn new(adapter: Arc<dyn VendorSessionAdapter>) -> Self {
        Self { adapter }
    }

    /// Must be called within a Tokio runtime.
    pub fn discover(&self) -> DeviceStream {
        let events = self.adapter.discovered_devices();
        DeviceStream::spawn("Vendor", move |tx, cancel| forward(events, tx, cancel))
    }
}

async fn forward(
    mut events: BoxStream<'static, VendorEvent>,
    tx: mpsc::Sender<ScanEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = events.next() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let out = match event {
            VendorEvent::Discovered(device) => {
                log::debug!("[Vendor] Discovered {} ({})", device.name, device.id);
                ScanEvent::Found(device.to_cast_device())
            }
            VendorEvent::Lost(id) => {
                log::info!("[Vendor] Device lost: {}", id);
                ScanEvent::Lost(DeviceIdentity::new(CastProtocol::Chromecast, id))
            }
        };
        if tx.send(out).await.is_err() {
            break;
        }
    }
}
