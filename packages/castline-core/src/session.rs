//! Session state observed by hosts.

use serde::Serialize;
use thiserror::Error;

use crate::device::{CastDevice, CastProtocol, DeviceIdentity};
use crate::discovery::VendorError;
use crate::transport::TransportError;

/// Lifecycle of the single cast session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// No session and no discovery.
    #[default]
    Idle,
    /// No session; discovery is running.
    Scanning,
    Connecting,
    Connected,
    Disconnecting,
}

impl SessionState {
    /// Whether a device is attached (being connected or connected).
    pub fn has_device(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected | Self::Disconnecting)
    }
}

/// Error classification surfaced on the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    ConnectionFailed,
    SessionBusy,
}

/// Immutable snapshot of the session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    state: SessionState,
    device: Option<CastDevice>,
    last_error: Option<ErrorKind>,
}

impl Session {
    pub(crate) fn new(
        state: SessionState,
        device: Option<CastDevice>,
        last_error: Option<ErrorKind>,
    ) -> Self {
        Self {
            state,
            device,
            last_error,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Device the session is attached to. Always `None` when idle or scanning.
    pub fn device(&self) -> Option<&CastDevice> {
        self.device.as_ref()
    }

    pub fn protocol(&self) -> Option<CastProtocol> {
        self.device.as_ref().map(CastDevice::protocol)
    }

    /// Most recent failure, cleared by the next successful connect.
    pub fn last_error(&self) -> Option<ErrorKind> {
        self.last_error
    }
}

/// Why a protocol link could not be established.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Vendor(#[from] VendorError),
}

/// Errors returned by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Another connect or disconnect is in flight.
    #[error("a session transition is already in progress")]
    SessionBusy,

    /// The device could not be reached on its control protocol.
    #[error("connection to {device} failed: {source}")]
    ConnectionFailed {
        device: DeviceIdentity,
        #[source]
        source: LinkError,
    },

    /// A disconnect arrived while this connect was in flight.
    #[error("connect was cancelled by a disconnect")]
    Cancelled,
}

impl SessionError {
    /// Kind recorded on the session, if this error is surfaced there.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::SessionBusy => Some(ErrorKind::SessionBusy),
            Self::ConnectionFailed { .. } => Some(ErrorKind::ConnectionFailed),
            Self::Cancelled => None,
        }
    }
}

/// Convenient Result alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
