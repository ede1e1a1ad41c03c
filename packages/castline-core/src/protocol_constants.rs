//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by external specifications (SSDP/UPnP, Roku ECP,
//! mDNS service naming) and changing them would break protocol compliance.

// ─────────────────────────────────────────────────────────────────────────────
// SSDP
// ─────────────────────────────────────────────────────────────────────────────

/// Standard SSDP multicast group and port.
pub const SSDP_MULTICAST_ADDR: &str = "239.255.255.250:1900";

/// Multicast TTL recommended by UPnP 1.0 for SSDP.
pub const SSDP_MULTICAST_TTL: u32 = 4;

/// Receive buffer for a single SSDP reply datagram.
pub const SSDP_RECV_BUFFER: usize = 2048;

/// Port applied when a LOCATION URL carries neither a port nor a known scheme.
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Search target answered by Roku players (External Control Protocol).
pub const ROKU_SEARCH_TARGET: &str = "roku:ecp";

/// Search target used to find Kodi's UPnP renderer.
pub const KODI_SEARCH_TARGET: &str = "urn:schemas-upnp-org:device:MediaRenderer:1";

// ─────────────────────────────────────────────────────────────────────────────
// Service advertisement
// ─────────────────────────────────────────────────────────────────────────────

/// AirPlay service type (note: trailing dot is required by mdns-sd).
pub const AIRPLAY_SERVICE_TYPE: &str = "_airplay._tcp.local.";

// ─────────────────────────────────────────────────────────────────────────────
// Control channels
// ─────────────────────────────────────────────────────────────────────────────

/// Default Kodi JSON-RPC over HTTP port.
pub const KODI_DEFAULT_RPC_PORT: u16 = 8080;

/// Capacity of each scanner's event channel.
pub const SCAN_EVENT_CHANNEL_CAPACITY: usize = 64;
