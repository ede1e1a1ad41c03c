//! Unified device catalog.
//!
//! Every scanner writes here. Writes are serialized behind a mutex and each change
//! publishes a freshly sorted, immutable view through a `watch` channel, so readers
//! never see a half-applied update and never block writers.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::device::{CastDevice, CastProtocol, DeviceIdentity};

/// Published read-only view, ordered for display.
pub type CatalogView = Arc<Vec<CastDevice>>;

/// Display order: protocol priority, then case-insensitive name, then key.
fn display_order(a: &CastDevice, b: &CastDevice) -> Ordering {
    a.protocol()
        .display_priority()
        .cmp(&b.protocol().display_priority())
        .then_with(|| {
            a.display_name()
                .to_lowercase()
                .cmp(&b.display_name().to_lowercase())
        })
        .then_with(|| a.identity().key.cmp(&b.identity().key))
}

/// Thread-safe device catalog keyed by [`DeviceIdentity`].
pub struct DeviceCatalog {
    entries: Mutex<HashMap<DeviceIdentity, CastDevice>>,
    view: watch::Sender<CatalogView>,
}

impl Default for DeviceCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceCatalog {
    pub fn new() -> Self {
        let (view, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            entries: Mutex::new(HashMap::new()),
            view,
        }
    }

    /// Inserts or replaces the record for the device's identity (last write wins).
    ///
    /// Returns `false` without republishing when the stored record is identical.
    pub fn merge(&self, device: CastDevice) -> bool {
        let mut entries = self.entries.lock();
        if entries.get(device.identity()) == Some(&device) {
            return false;
        }
        log::debug!(
            "[Catalog] Merged {} ({})",
            device.identity(),
            device.display_name()
        );
        entries.insert(device.identity().clone(), device);
        self.publish(&entries);
        true
    }

    /// Removes one entry. Returns whether it was present.
    pub fn remove(&self, identity: &DeviceIdentity) -> bool {
        let mut entries = self.entries.lock();
        if entries.remove(identity).is_none() {
            return false;
        }
        log::debug!("[Catalog] Removed {}", identity);
        self.publish(&entries);
        true
    }

    /// Removes every entry of `protocol` whose identity is not in `seen`.
    ///
    /// Returns the number of entries dropped.
    pub fn retain_seen(&self, protocol: CastProtocol, seen: &HashSet<DeviceIdentity>) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|identity, _| identity.protocol != protocol || seen.contains(identity));
        let dropped = before - entries.len();
        if dropped > 0 {
            log::debug!("[Catalog] Aged out {} {} device(s)", dropped, protocol);
            self.publish(&entries);
        }
        dropped
    }

    /// Empties the catalog.
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        if entries.is_empty() {
            return;
        }
        entries.clear();
        log::debug!("[Catalog] Cleared");
        self.publish(&entries);
    }

    pub fn get(&self, identity: &DeviceIdentity) -> Option<CastDevice> {
        self.entries.lock().get(identity).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Current ordered view.
    pub fn snapshot(&self) -> CatalogView {
        self.view.borrow().clone()
    }

    /// Receiver that observes every published view.
    pub fn subscribe(&self) -> watch::Receiver<CatalogView> {
        self.view.subscribe()
    }

    /// Stream of views, starting with the current one.
    pub fn watch(&self) -> WatchStream<CatalogView> {
        WatchStream::new(self.view.subscribe())
    }

    /// Called with the entries lock held so views are published in write order.
    fn publish(&self, entries: &HashMap<DeviceIdentity, CastDevice>) {
        let mut devices: Vec<CastDevice> = entries.values().cloned().collect();
        devices.sort_by(display_order);
        self.view.send_replace(Arc::new(devices));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceType;
    use futures::StreamExt;

    fn device(protocol: CastProtocol, key: &str, name: &str) -> CastDevice {
        CastDevice::new(
            DeviceIdentity::new(protocol, key),
            name,
            "10.0.0.1",
            80,
            DeviceType::Unknown,
        )
    }

    fn names(view: &CatalogView) -> Vec<&str> {
        view.iter().map(|d| d.display_name()).collect()
    }

    #[test]
    fn view_is_grouped_by_protocol_priority() {
        let catalog = DeviceCatalog::new();
        catalog.merge(device(CastProtocol::Airplay, "a", "Apple TV"));
        catalog.merge(device(CastProtocol::Kodi, "k", "Kodi"));
        catalog.merge(device(CastProtocol::Roku, "r2", "bedroom"));
        catalog.merge(device(CastProtocol::Roku, "r1", "Attic"));
        catalog.merge(device(CastProtocol::Chromecast, "c", "Zed"));

        assert_eq!(
            names(&catalog.snapshot()),
            vec!["Zed", "Attic", "bedroom", "Kodi", "Apple TV"]
        );
    }

    #[test]
    fn merge_replaces_same_identity() {
        let catalog = DeviceCatalog::new();
        assert!(catalog.merge(device(CastProtocol::Roku, "uuid:1", "Roku (10.0.0.1)")));
        assert!(catalog.merge(device(CastProtocol::Roku, "uuid:1", "Bedroom")));
        assert_eq!(catalog.len(), 1);
        assert_eq!(names(&catalog.snapshot()), vec!["Bedroom"]);
    }

    #[test]
    fn same_key_different_protocol_are_distinct() {
        let catalog = DeviceCatalog::new();
        catalog.merge(device(CastProtocol::Roku, "uuid:1", "A"));
        catalog.merge(device(CastProtocol::Kodi, "uuid:1", "B"));
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn identical_merge_does_not_republish() {
        let catalog = DeviceCatalog::new();
        let mut rx = catalog.subscribe();
        assert!(catalog.merge(device(CastProtocol::Roku, "uuid:1", "A")));
        assert!(rx.has_changed().unwrap());
        let _ = rx.borrow_and_update();

        assert!(!catalog.merge(device(CastProtocol::Roku, "uuid:1", "A")));
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn remove_and_clear() {
        let catalog = DeviceCatalog::new();
        catalog.merge(device(CastProtocol::Airplay, "a", "A"));
        catalog.merge(device(CastProtocol::Roku, "r", "R"));

        assert!(catalog.remove(&DeviceIdentity::new(CastProtocol::Airplay, "a")));
        assert!(!catalog.remove(&DeviceIdentity::new(CastProtocol::Airplay, "a")));
        assert_eq!(catalog.len(), 1);

        catalog.clear();
        assert!(catalog.is_empty());
        assert!(catalog.snapshot().is_empty());
    }

    #[test]
    fn retain_seen_only_touches_one_protocol() {
        let catalog = DeviceCatalog::new();
        catalog.merge(device(CastProtocol::Roku, "r1", "R1"));
        catalog.merge(device(CastProtocol::Roku, "r2", "R2"));
        catalog.merge(device(CastProtocol::Kodi, "k1", "K1"));

        let seen = HashSet::from([DeviceIdentity::new(CastProtocol::Roku, "r2")]);
        assert_eq!(catalog.retain_seen(CastProtocol::Roku, &seen), 1);
        assert_eq!(names(&catalog.snapshot()), vec!["R2", "K1"]);
    }

    #[test]
    fn snapshots_are_immutable() {
        let catalog = DeviceCatalog::new();
        catalog.merge(device(CastProtocol::Roku, "r1", "R1"));
        let before = catalog.snapshot();
        catalog.merge(device(CastProtocol::Roku, "r2", "R2"));
        assert_eq!(before.len(), 1);
        assert_eq!(catalog.snapshot().len(), 2);
    }

    #[test]
    fn concurrent_merges_never_duplicate() {
        let catalog = Arc::new(DeviceCatalog::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let catalog = Arc::clone(&catalog);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let name = format!("Device {} from {}", i, t);
                        catalog.merge(device(CastProtocol::Roku, &format!("uuid:{}", i), &name));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let view = catalog.snapshot();
        assert_eq!(view.len(), 50);
        let unique: HashSet<_> = view.iter().map(|d| d.identity().clone()).collect();
        assert_eq!(unique.len(), 50);
    }

    #[tokio::test]
    async fn watch_stream_starts_with_current_view() {
        let catalog = DeviceCatalog::new();
        catalog.merge(device(CastProtocol::Kodi, "k", "Kodi"));

        let mut views = catalog.watch();
        let first = views.next().await.unwrap();
        assert_eq!(names(&first), vec!["Kodi"]);

        catalog.remove(&DeviceIdentity::new(CastProtocol::Kodi, "k"));
        let second = views.next().await.unwrap();
        assert!(second.is_empty());
    }
}
