//! Centralized error types for the Castline core library.
//!
//! Each subsystem defines its own `thiserror` enum; this module gives them
//! stable machine-readable codes and folds them into [`CastError`] for hosts.

use serde::Serialize;
use thiserror::Error;

use crate::discovery::{DiscoveryError, VendorError};
use crate::session::{LinkError, SessionError};
use crate::transport::TransportError;

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    /// Returns a machine-readable error code.
    fn code(&self) -> &'static str;
}

impl ErrorCode for DiscoveryError {
    fn code(&self) -> &'static str {
        match self {
            Self::SocketBind(_) => "socket_bind_failed",
            Self::SendSearch(_) => "ssdp_send_failed",
            Self::MdnsDaemon(_) => "mdns_daemon_failed",
            Self::Resolution { .. } => "resolution_failed",
        }
    }
}

impl ErrorCode for TransportError {
    fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "http_request_failed",
            Self::HttpStatus(_, _) => "http_error_status",
            Self::Io(_) => "io_error",
            Self::Timeout(_) => "connect_timeout",
            Self::Rejected(_) => "control_rejected",
            Self::Unsupported(_) => "unsupported_protocol",
        }
    }
}

impl ErrorCode for VendorError {
    fn code(&self) -> &'static str {
        match self {
            Self::Unavailable => "vendor_unavailable",
            Self::UnknownDevice(_) => "vendor_unknown_device",
            Self::Session(_) => "vendor_session_failed",
        }
    }
}

impl ErrorCode for LinkError {
    fn code(&self) -> &'static str {
        match self {
            Self::Transport(e) => e.code(),
            Self::Vendor(e) => e.code(),
        }
    }
}

impl ErrorCode for SessionError {
    fn code(&self) -> &'static str {
        match self {
            Self::SessionBusy => "session_busy",
            Self::ConnectionFailed { .. } => "connection_failed",
            Self::Cancelled => "connect_cancelled",
        }
    }
}

/// Application-wide error type for hosts embedding the core.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum CastError {
    /// A scanner could not start or run.
    #[error("Discovery failed: {0}")]
    Discovery(String),

    /// A session operation failed.
    #[error("Session error: {0}")]
    Session(String),

    /// A control channel could not be opened.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Configuration was rejected at startup.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CastError {
    /// Returns a machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Discovery(_) => "discovery_failed",
            Self::Session(_) => "session_error",
            Self::Transport(_) => "transport_error",
            Self::Configuration(_) => "configuration_error",
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type CastResult<T> = Result<T, CastError>;

impl From<DiscoveryError> for CastError {
    fn from(err: DiscoveryError) -> Self {
        Self::Discovery(err.to_string())
    }
}

impl From<TransportError> for CastError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<SessionError> for CastError {
    fn from(err: SessionError) -> Self {
        Self::Session(err.to_string())
    }
}
