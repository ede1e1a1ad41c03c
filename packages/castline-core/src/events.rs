//! Domain events emitted by the core.
//!
//! Services depend on the [`EventEmitter`] trait rather than a concrete channel,
//! so hosts decide how events reach their UI (log lines, a frontend bridge, ...).

use serde::Serialize;

use crate::device::DeviceIdentity;
use crate::session::{ErrorKind, SessionState};

/// Session lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    /// The session moved between states.
    #[serde(rename_all = "camelCase")]
    StateChanged {
        from: SessionState,
        to: SessionState,
        device: Option<DeviceIdentity>,
        timestamp: u64,
    },
    /// A connect or an established session failed.
    #[serde(rename_all = "camelCase")]
    Failed {
        device: DeviceIdentity,
        kind: ErrorKind,
        reason: String,
        timestamp: u64,
    },
}

/// Discovery lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DiscoveryEvent {
    Started { timestamp: u64 },
    Stopped { timestamp: u64 },
    /// A scanner could not start (socket bind, daemon failure).
    #[serde(rename_all = "camelCase")]
    ScannerFailed {
        scanner: String,
        reason: String,
        timestamp: u64,
    },
}

/// Trait for emitting domain events without knowledge of transport.
///
/// Session events are emitted after the session lock is released, so an emitter
/// may call back into the orchestrator.
pub trait EventEmitter: Send + Sync {
    /// Emits a session lifecycle event.
    fn emit_session(&self, event: SessionEvent);

    /// Emits a discovery lifecycle event.
    fn emit_discovery(&self, event: DiscoveryEvent);
}

/// No-op emitter for hosts that only watch state channels, and for tests.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_session(&self, _event: SessionEvent) {}

    fn emit_discovery(&self, _event: DiscoveryEvent) {}
}

/// Logs all events as structured `tracing` debug events.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_session(&self, event: SessionEvent) {
        tracing::debug!(?event, "session_event");
    }

    fn emit_discovery(&self, event: DiscoveryEvent) {
        tracing::debug!(?event, "discovery_event");
    }
}
