//! Hand-written doubles for the core's trait seams.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Semaphore};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::device::{CastDevice, CastProtocol, DeviceIdentity, DeviceType};
use crate::discovery::{
    AdvertisementEvent, AdvertisementSource, DiscoveryError, DiscoveryResult, VendorError,
    VendorEvent, VendorSessionAdapter,
};
use crate::transport::{ChannelConnector, ControlChannel, TransportError, TransportResult};

pub(crate) fn device(protocol: CastProtocol, key: &str) -> CastDevice {
    CastDevice::new(
        DeviceIdentity::new(protocol, key),
        key,
        "10.0.0.10",
        8060,
        DeviceType::Unknown,
    )
}

/// Ordered record of side effects, shared by the doubles of one test.
#[derive(Clone, Default)]
pub(crate) struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub(crate) fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub(crate) fn count(&self, prefix: &str) -> usize {
        self.0.lock().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

/// Holds calls until the test releases them, one permit per call.
#[derive(Clone)]
pub(crate) struct Gate(Option<Arc<Semaphore>>);

impl Gate {
    pub(crate) fn open() -> Self {
        Self(None)
    }

    pub(crate) fn closed() -> Self {
        Self(Some(Arc::new(Semaphore::new(0))))
    }

    pub(crate) fn release(&self) {
        if let Some(semaphore) = &self.0 {
            semaphore.add_permits(1);
        }
    }

    async fn pass(&self) {
        if let Some(semaphore) = &self.0 {
            if let Ok(permit) = semaphore.acquire().await {
                permit.forget();
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Advertisement source
// ─────────────────────────────────────────────────────────────────────────────

/// Source fed by the test through an unbounded channel.
pub(crate) struct ChannelSource {
    rx: Mutex<Option<mpsc::UnboundedReceiver<AdvertisementEvent>>>,
    stops: AtomicUsize,
}

impl ChannelSource {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedSender<AdvertisementEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let source = Arc::new(Self {
            rx: Mutex::new(Some(rx)),
            stops: AtomicUsize::new(0),
        });
        (source, tx)
    }

    pub(crate) fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl AdvertisementSource for ChannelSource {
    fn browse(
        &self,
        _service_type: &str,
    ) -> DiscoveryResult<BoxStream<'static, AdvertisementEvent>> {
        let rx = self
            .rx
            .lock()
            .take()
            .ok_or_else(|| DiscoveryError::MdnsDaemon("already browsing".into()))?;
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    fn stop_browse(&self, _service_type: &str) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Vendor adapter
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) struct MockVendor {
    events: Mutex<Option<mpsc::UnboundedReceiver<VendorEvent>>>,
    log: CallLog,
    gate: Gate,
    active: AtomicBool,
    pub(crate) fail_connect: AtomicBool,
    pub(crate) fail_disconnect: AtomicBool,
}

impl MockVendor {
    pub(crate) fn new(log: CallLog, gate: Gate) -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(None),
            log,
            gate,
            active: AtomicBool::new(false),
            fail_connect: AtomicBool::new(false),
            fail_disconnect: AtomicBool::new(false),
        })
    }

    pub(crate) fn with_events(
        log: CallLog,
    ) -> (Arc<Self>, mpsc::UnboundedSender<VendorEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let vendor = Self::new(log, Gate::open());
        *vendor.events.lock() = Some(rx);
        (vendor, tx)
    }
}

#[async_trait]
impl VendorSessionAdapter for MockVendor {
    fn discovered_devices(&self) -> BoxStream<'static, VendorEvent> {
        match self.events.lock().take() {
            Some(rx) => UnboundedReceiverStream::new(rx).boxed(),
            None => stream::empty().boxed(),
        }
    }

    async fn connect(&self, device_id: &str) -> Result<(), VendorError> {
        self.log.push(format!("vendor_connect:{}", device_id));
        self.gate.pass().await;
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(VendorError::Session("route refused".into()));
        }
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), VendorError> {
        self.log.push("vendor_disconnect");
        self.active.store(false, Ordering::SeqCst);
        if self.fail_disconnect.load(Ordering::SeqCst) {
            return Err(VendorError::Session("teardown failed".into()));
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Channel connector
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) struct MockConnector {
    log: CallLog,
    gate: Gate,
    failing: Mutex<HashSet<String>>,
}

impl MockConnector {
    pub(crate) fn new(log: CallLog, gate: Gate) -> Arc<Self> {
        Arc::new(Self {
            log,
            gate,
            failing: Mutex::new(HashSet::new()),
        })
    }

    /// Makes every open for `key` fail.
    pub(crate) fn fail(&self, key: &str) {
        self.failing.lock().insert(key.to_string());
    }
}

#[async_trait]
impl ChannelConnector for MockConnector {
    async fn open(&self, device: &CastDevice) -> TransportResult<Box<dyn ControlChannel>> {
        let key = device.identity().key.clone();
        self.log.push(format!("open:{}", key));
        self.gate.pass().await;
        if self.failing.lock().contains(&key) {
            return Err(TransportError::Rejected(format!("{} refused", key)));
        }
        Ok(Box::new(MockChannel {
            device: device.clone(),
            log: self.log.clone(),
        }))
    }
}

struct MockChannel {
    device: CastDevice,
    log: CallLog,
}

#[async_trait]
impl ControlChannel for MockChannel {
    fn device(&self) -> &CastDevice {
        &self.device
    }

    async fn close(self: Box<Self>) -> TransportResult<()> {
        self.log.push(format!("close:{}", self.device.identity().key));
        Ok(())
    }
}
