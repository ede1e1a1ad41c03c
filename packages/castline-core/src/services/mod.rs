//! Services that tie scanners, catalog and transports together.

pub mod discovery_runner;
pub mod session_orchestrator;

pub use discovery_runner::{DiscoveryHandle, DiscoveryRunner, LossHook};
pub use session_orchestrator::SessionOrchestrator;
