//! Castline Core - multi-protocol cast device discovery and session control.
//!
//! Finds cast receivers on the local network and manages one control session
//! with a chosen device at a time.
//!
//! # Architecture
//!
//! - [`discovery`]: SSDP, service-advertisement and vendor scanners
//! - [`catalog`]: Deduplicated, observable set of discovered devices
//! - [`transport`]: Per-protocol control channels (Roku, Kodi, AirPlay)
//! - [`services`]: Discovery runner and session orchestrator
//! - [`session`]: Session state snapshots and errors
//! - [`events`]: Event system for hosts
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! The crate decouples core logic from platform-specific pieces:
//!
//! - [`VendorSessionAdapter`](discovery::VendorSessionAdapter): Vendor SDK sessions (Chromecast)
//! - [`AdvertisementSource`](discovery::AdvertisementSource): Service-advertisement browsing
//! - [`ChannelConnector`](transport::ChannelConnector): Opening control channels
//! - [`EventEmitter`](events::EventEmitter): Emitting domain events

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod bootstrap;
pub mod catalog;
pub mod config;
pub mod device;
pub mod discovery;
pub mod error;
pub mod events;
pub mod protocol_constants;
pub mod services;
pub mod session;
pub mod transport;
pub mod utils;

#[cfg(test)]
mod test_support;

// Re-export commonly used types at the crate root
pub use bootstrap::{bootstrap_services, BootstrappedServices};
pub use catalog::{CatalogView, DeviceCatalog};
pub use config::{Config, DiscoveryConfig, SsdpTarget, TransportConfig};
pub use device::{CastDevice, CastProtocol, DeviceIdentity, DeviceType};
pub use error::{CastError, CastResult, ErrorCode};
pub use events::{
    DiscoveryEvent, EventEmitter, LoggingEventEmitter, NoopEventEmitter, SessionEvent,
};
pub use session::{ErrorKind, Session, SessionError, SessionResult, SessionState};
pub use utils::now_millis;

// Re-export discovery types
pub use discovery::{
    DeviceStream, DiscoveryError, ScanEvent, UnavailableVendorAdapter, VendorDevice, VendorEvent,
    VendorSessionAdapter,
};

// Re-export service types
pub use services::{DiscoveryRunner, SessionOrchestrator};
