//! Shared types for device discovery.
//!
//! Every scanner, whatever platform mechanism backs it, hands its results to
//! consumers through the same [`DeviceStream`]: a lazily filled, cancellable
//! sequence of [`ScanEvent`]s produced by a background task.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::device::{CastDevice, DeviceIdentity};
use crate::protocol_constants::SCAN_EVENT_CHANNEL_CAPACITY;

/// Errors that can occur during discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Failed to create or bind the scanner socket.
    #[error("failed to bind UDP socket: {0}")]
    SocketBind(#[source] std::io::Error),

    /// Failed to send the SSDP search.
    #[error("failed to send SSDP search: {0}")]
    SendSearch(#[source] std::io::Error),

    /// mDNS daemon error.
    #[error("mDNS daemon error: {0}")]
    MdnsDaemon(String),

    /// An advertisement could not be resolved to an address and port.
    #[error("could not resolve {name}: {reason}")]
    Resolution { name: String, reason: String },
}

/// Convenient Result alias for discovery operations.
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// A single item produced by a scanner.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    /// A device was sighted (first time or again). Replaces any earlier record.
    Found(CastDevice),
    /// The platform reported that a previously found device went away.
    Lost(DeviceIdentity),
}

/// Cancellable stream of scanner events.
///
/// The producing task owns every socket or platform listener. [`DeviceStream::cancel`]
/// signals it and waits for it to finish, so resources are released by the time the
/// call returns. Dropping the stream signals the task without waiting.
pub struct DeviceStream {
    label: &'static str,
    rx: mpsc::Receiver<ScanEvent>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl DeviceStream {
    /// Spawns `producer` on the current Tokio runtime and returns the consuming end.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    pub(crate) fn spawn<F, Fut>(label: &'static str, producer: F) -> Self
    where
        F: FnOnce(mpsc::Sender<ScanEvent>, CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(SCAN_EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(producer(tx, cancel.clone()));
        Self {
            label,
            rx,
            cancel,
            task: Some(task),
        }
    }

    /// Receives the next event, or `None` once the scanner finished or was cancelled.
    pub async fn next_event(&mut self) -> Option<ScanEvent> {
        self.rx.recv().await
    }

    /// Cancels the scanner and waits until its task released all resources.
    ///
    /// Calling this more than once is a no-op.
    pub async fn cancel(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        self.cancel.cancel();
        // Unblocks a producer parked on a full channel.
        self.rx.close();
        if let Err(e) = task.await {
            if e.is_panic() {
                log::warn!("[Discovery] {} scanner task panicked: {}", self.label, e);
            }
        }
        log::debug!("[Discovery] {} scanner cancelled", self.label);
    }

    /// Returns true once [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Stream for DeviceStream {
    type Item = ScanEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for DeviceStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for DeviceStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceStream")
            .field("label", &self.label)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
