//! The single cast session and the discovery it runs alongside.
//!
//! State lives behind a `parking_lot` mutex that is never held across an await.
//! Events raised by a transition are queued under the lock and emitted once it is
//! released, so emitters may read the session back.
//! Each connect or disconnect bumps an epoch; an in-flight connect that finds the
//! epoch moved on was superseded and releases whatever link it opened.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::catalog::DeviceCatalog;
use crate::device::{CastDevice, CastProtocol, DeviceIdentity};
use crate::discovery::VendorSessionAdapter;
use crate::events::{EventEmitter, SessionEvent};
use crate::session::{ErrorKind, LinkError, Session, SessionError, SessionResult, SessionState};
use crate::transport::{ChannelConnector, ControlChannel};
use crate::utils::now_millis;

use super::discovery_runner::{DiscoveryHandle, DiscoveryRunner};

/// Whatever keeps a connected session alive.
enum ActiveLink {
    /// The vendor SDK holds the session.
    Vendor,
    Channel(Box<dyn ControlChannel>),
}

struct SessionInner {
    state: SessionState,
    device: Option<CastDevice>,
    last_error: Option<ErrorKind>,
    link: Option<ActiveLink>,
    epoch: u64,
    discovering: bool,
    /// Events waiting for the lock to be released.
    outbox: Vec<SessionEvent>,
}

impl SessionInner {
    /// State to fall back to when no session is attached.
    fn resting(&self) -> SessionState {
        if self.discovering {
            SessionState::Scanning
        } else {
            SessionState::Idle
        }
    }

    fn snapshot(&self) -> Session {
        Session::new(self.state, self.device.clone(), self.last_error)
    }

    fn report_failure(&mut self, device: &DeviceIdentity, reason: &str) {
        self.outbox.push(SessionEvent::Failed {
            device: device.clone(),
            kind: ErrorKind::ConnectionFailed,
            reason: reason.to_string(),
            timestamp: now_millis(),
        });
    }
}

/// Session state shared with discovery's loss hook.
struct SessionCore {
    inner: Mutex<SessionInner>,
    state_tx: watch::Sender<Session>,
    emitter: Arc<dyn EventEmitter>,
}

impl SessionCore {
    /// Runs `f` under the session lock, then emits the events it queued.
    fn update<R>(&self, f: impl FnOnce(&mut SessionInner) -> R) -> R {
        let (result, events) = {
            let mut inner = self.inner.lock();
            let result = f(&mut inner);
            (result, std::mem::take(&mut inner.outbox))
        };
        for event in events {
            self.emitter.emit_session(event);
        }
        result
    }

    fn publish(&self, inner: &SessionInner) {
        self.state_tx.send_replace(inner.snapshot());
    }

    /// Moves to `to`, publishes, and queues the change event.
    fn transition(&self, inner: &mut SessionInner, to: SessionState) {
        let from = inner.state;
        inner.state = to;
        if from != to {
            let device = inner.device.as_ref().map(|d| d.identity().clone());
            tracing::debug!(?from, ?to, ?device, "session transition");
            inner.outbox.push(SessionEvent::StateChanged {
                from,
                to,
                device,
                timestamp: now_millis(),
            });
        }
        self.publish(inner);
    }

    /// Completes a connect that was not superseded.
    fn finish_connect(
        &self,
        inner: &mut SessionInner,
        device: &CastDevice,
        outcome: Result<ActiveLink, LinkError>,
    ) -> SessionResult<()> {
        match outcome {
            Ok(link) => {
                inner.link = Some(link);
                inner.last_error = None;
                self.transition(inner, SessionState::Connected);
                log::info!("[Session] Connected to {}", device.display_name());
                Ok(())
            }
            Err(source) => {
                log::warn!(
                    "[Session] Connect to {} failed: {}",
                    device.display_name(),
                    source
                );
                inner.report_failure(device.identity(), &source.to_string());
                inner.device = None;
                inner.last_error = Some(ErrorKind::ConnectionFailed);
                let resting = inner.resting();
                self.transition(inner, resting);
                Err(SessionError::ConnectionFailed {
                    device: device.identity().clone(),
                    source,
                })
            }
        }
    }

    /// Drops the session when its device is reported gone.
    fn connection_lost(&self, identity: &DeviceIdentity) {
        let dropped = self.update(|inner| {
            let attached = inner.state == SessionState::Connected
                && inner.device.as_ref().map(CastDevice::identity) == Some(identity);
            if !attached {
                return None;
            }
            log::warn!("[Session] Connected device {} was lost", identity);
            inner.epoch += 1;
            inner.device = None;
            inner.last_error = Some(ErrorKind::ConnectionFailed);
            inner.report_failure(identity, "device lost");
            let resting = inner.resting();
            self.transition(inner, resting);
            inner.link.take()
        });
        // The peer is gone; dropping the link releases its socket without a goodbye.
        drop(dropped);
    }
}

enum Completion {
    Done(SessionResult<()>),
    Superseded(Option<ActiveLink>),
}

/// How a connect begins once the session accepted it.
enum ConnectStart {
    Fresh,
    /// A different device is connected and must be released first.
    Replace(Option<ActiveLink>),
}

/// Owns the session state machine and the discovery lifecycle.
pub struct SessionOrchestrator {
    core: Arc<SessionCore>,
    runner: DiscoveryRunner,
    discovery: tokio::sync::Mutex<Option<DiscoveryHandle>>,
    connector: Arc<dyn ChannelConnector>,
    vendor: Arc<dyn VendorSessionAdapter>,
}

impl SessionOrchestrator {
    pub fn new(
        runner: DiscoveryRunner,
        connector: Arc<dyn ChannelConnector>,
        vendor: Arc<dyn VendorSessionAdapter>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        let (state_tx, _) = watch::channel(Session::default());
        Self {
            core: Arc::new(SessionCore {
                inner: Mutex::new(SessionInner {
                    state: SessionState::Idle,
                    device: None,
                    last_error: None,
                    link: None,
                    epoch: 0,
                    discovering: false,
                    outbox: Vec::new(),
                }),
                state_tx,
                emitter,
            }),
            runner,
            discovery: tokio::sync::Mutex::new(None),
            connector,
            vendor,
        }
    }

    /// Current session snapshot.
    pub fn session(&self) -> Session {
        self.core.inner.lock().snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.core.state_tx.subscribe()
    }

    /// Stream of session snapshots, starting with the current one.
    pub fn watch(&self) -> WatchStream<Session> {
        WatchStream::new(self.core.state_tx.subscribe())
    }

    pub fn catalog(&self) -> &Arc<DeviceCatalog> {
        self.runner.catalog()
    }

    pub fn is_discovering(&self) -> bool {
        self.core.inner.lock().discovering
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Discovery
    // ─────────────────────────────────────────────────────────────────────────

    /// Launches every scanner. No-op while discovery is already running.
    ///
    /// A session in progress keeps its state; only an idle session shows `Scanning`.
    pub async fn start_discovery(&self) {
        let mut slot = self.discovery.lock().await;
        if slot.is_some() {
            log::debug!("[Session] Discovery already running");
            return;
        }

        let core = Arc::clone(&self.core);
        *slot = Some(
            self.runner
                .start(Arc::new(move |identity: &DeviceIdentity| core.connection_lost(identity))),
        );

        self.core.update(|inner| {
            inner.discovering = true;
            if inner.state == SessionState::Idle {
                self.core.transition(inner, SessionState::Scanning);
            } else {
                self.core.publish(inner);
            }
        });
    }

    /// Cancels every scanner, waits for them, then clears the catalog.
    ///
    /// No-op when discovery is not running. Never touches the session itself.
    pub async fn stop_discovery(&self) {
        let mut slot = self.discovery.lock().await;
        let Some(handle) = slot.take() else {
            return;
        };
        handle.stop().await;
        self.catalog().clear();

        self.core.update(|inner| {
            inner.discovering = false;
            if inner.state == SessionState::Scanning {
                self.core.transition(inner, SessionState::Idle);
            } else {
                self.core.publish(inner);
            }
        });
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Session
    // ─────────────────────────────────────────────────────────────────────────

    /// Connects to `device`, replacing any other connected device first.
    ///
    /// # Errors
    ///
    /// - [`SessionError::SessionBusy`] while another connect or disconnect is in flight
    /// - [`SessionError::ConnectionFailed`] when the device's control protocol fails
    /// - [`SessionError::Cancelled`] when a disconnect arrived before completion
    pub async fn connect(&self, device: CastDevice) -> SessionResult<()> {
        let accepted = self.core.update(|inner| {
            match inner.state {
                SessionState::Connecting | SessionState::Disconnecting => {
                    log::info!(
                        "[Session] Rejected connect to {}: transition in progress",
                        device.identity()
                    );
                    inner.last_error = Some(ErrorKind::SessionBusy);
                    self.core.publish(inner);
                    return Err(SessionError::SessionBusy);
                }
                SessionState::Connected
                    if inner.device.as_ref().map(CastDevice::identity)
                        == Some(device.identity()) =>
                {
                    return Ok(None);
                }
                SessionState::Idle | SessionState::Scanning | SessionState::Connected => {}
            }

            inner.epoch += 1;
            if inner.state == SessionState::Connected {
                let link = inner.link.take();
                self.core.transition(inner, SessionState::Disconnecting);
                Ok(Some((inner.epoch, ConnectStart::Replace(link))))
            } else {
                inner.device = Some(device.clone());
                inner.last_error = None;
                self.core.transition(inner, SessionState::Connecting);
                Ok(Some((inner.epoch, ConnectStart::Fresh)))
            }
        })?;
        let Some((epoch, start)) = accepted else {
            return Ok(());
        };

        if let ConnectStart::Replace(link) = start {
            if let Some(link) = link {
                self.release(link).await;
            }
            let replaced = self.core.update(|inner| {
                if inner.epoch != epoch {
                    inner.device = None;
                    let resting = inner.resting();
                    self.core.transition(inner, resting);
                    return false;
                }
                inner.device = Some(device.clone());
                inner.last_error = None;
                self.core.transition(inner, SessionState::Connecting);
                true
            });
            if !replaced {
                return Err(SessionError::Cancelled);
            }
        }

        log::info!(
            "[Session] Connecting to {} ({})",
            device.display_name(),
            device.protocol()
        );
        let outcome = self.open_link(&device).await;

        let completion = self.core.update(|inner| {
            if inner.epoch == epoch {
                Completion::Done(self.core.finish_connect(inner, &device, outcome))
            } else {
                Completion::Superseded(outcome.ok())
            }
        });

        match completion {
            Completion::Done(result) => result,
            Completion::Superseded(link) => {
                log::info!("[Session] Connect to {} was superseded", device.identity());
                if let Some(link) = link {
                    self.release_superseded(link).await;
                }
                Err(SessionError::Cancelled)
            }
        }
    }

    /// Ends the session. No-op without one.
    ///
    /// Teardown failures are logged; the session always ends up without a device.
    pub async fn disconnect(&self) {
        let link = self.core.update(|inner| match inner.state {
            SessionState::Idle | SessionState::Scanning => None,
            SessionState::Disconnecting => {
                // Whoever started the teardown finishes it; a pending replace is cancelled.
                inner.epoch += 1;
                None
            }
            SessionState::Connecting => {
                inner.epoch += 1;
                self.core.transition(inner, SessionState::Disconnecting);
                inner.device = None;
                let resting = inner.resting();
                self.core.transition(inner, resting);
                None
            }
            SessionState::Connected => {
                inner.epoch += 1;
                let link = inner.link.take();
                self.core.transition(inner, SessionState::Disconnecting);
                Some(link)
            }
        });

        let Some(link) = link else {
            return;
        };
        if let Some(link) = link {
            self.release(link).await;
        }

        self.core.update(|inner| {
            if inner.state == SessionState::Disconnecting {
                inner.device = None;
                let resting = inner.resting();
                self.core.transition(inner, resting);
            }
        });
    }

    /// Disconnects and stops discovery.
    pub async fn shutdown(&self) {
        self.disconnect().await;
        self.stop_discovery().await;
    }

    async fn open_link(&self, device: &CastDevice) -> Result<ActiveLink, LinkError> {
        match device.protocol() {
            CastProtocol::Chromecast => {
                self.vendor.connect(&device.identity().key).await?;
                Ok(ActiveLink::Vendor)
            }
            CastProtocol::Roku | CastProtocol::Kodi | CastProtocol::Airplay => {
                Ok(ActiveLink::Channel(self.connector.open(device).await?))
            }
        }
    }

    async fn release(&self, link: ActiveLink) {
        let result = match link {
            ActiveLink::Vendor => self.vendor.disconnect().await.map_err(LinkError::from),
            ActiveLink::Channel(channel) => channel.close().await.map_err(LinkError::from),
        };
        if let Err(e) = result {
            log::warn!("[Session] Teardown failed: {}", e);
        }
    }

    /// Releases a link opened by a superseded connect.
    ///
    /// The vendor SDK holds one session at a time; when a newer vendor connect owns
    /// it, disconnecting here would end the newer session.
    async fn release_superseded(&self, link: ActiveLink) {
        if matches!(link, ActiveLink::Vendor) {
            let vendor_in_use = {
                let inner = self.core.inner.lock();
                inner.state.has_device()
                    && inner
                        .device
                        .as_ref()
                        .is_some_and(|d| d.protocol().is_vendor_managed())
            };
            if vendor_in_use {
                log::debug!("[Session] Vendor session now belongs to a newer connect");
                return;
            }
        }
        self.release(link).await;
    }
}
