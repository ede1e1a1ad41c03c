//! Core configuration.
//!
//! All fields have sensible defaults; hosts deserialize a partial document and
//! call [`Config::validate`] before bootstrapping.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::device::CastProtocol;
use crate::protocol_constants::{
    AIRPLAY_SERVICE_TYPE, KODI_DEFAULT_RPC_PORT, KODI_SEARCH_TARGET, ROKU_SEARCH_TARGET,
};

/// One SSDP search run every round.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SsdpTarget {
    pub protocol: CastProtocol,
    /// Value of the `ST` header.
    pub search_target: String,
    /// Case-insensitive text a reply must contain to count for this protocol.
    #[serde(default)]
    pub response_hint: Option<String>,
}

impl SsdpTarget {
    pub fn roku() -> Self {
        Self {
            protocol: CastProtocol::Roku,
            search_target: ROKU_SEARCH_TARGET.to_string(),
            response_hint: None,
        }
    }

    pub fn kodi() -> Self {
        Self {
            protocol: CastProtocol::Kodi,
            search_target: KODI_SEARCH_TARGET.to_string(),
            response_hint: Some("kodi".to_string()),
        }
    }
}

/// Scanner settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct DiscoveryConfig {
    /// Enable SSDP rounds (Roku, Kodi).
    pub ssdp_enabled: bool,

    /// Enable service-advertisement browsing (AirPlay).
    pub mdns_enabled: bool,

    /// Forward devices reported by the vendor session adapter (Chromecast).
    pub vendor_enabled: bool,

    /// Searches issued each SSDP round.
    pub ssdp_targets: Vec<SsdpTarget>,

    /// How long each SSDP round listens for replies (milliseconds).
    pub ssdp_timeout_ms: u64,

    /// Pause between the end of one SSDP round and the start of the next (milliseconds).
    pub ssdp_round_interval_ms: u64,

    /// MX header value (max response delay in seconds).
    pub ssdp_mx: u64,

    /// Destination of M-SEARCH datagrams.
    pub ssdp_target_addr: SocketAddr,

    /// Local address SSDP sockets bind to.
    pub ssdp_bind_addr: SocketAddr,

    /// Service type browsed for AirPlay receivers.
    pub mdns_service_type: String,

    /// Fetch UPnP device descriptions to name SSDP devices.
    pub describe_devices: bool,

    /// Timeout for each description fetch (milliseconds).
    pub description_timeout_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            ssdp_enabled: true,
            mdns_enabled: true,
            vendor_enabled: true,
            ssdp_targets: vec![SsdpTarget::roku(), SsdpTarget::kodi()],
            ssdp_timeout_ms: 3000,
            ssdp_round_interval_ms: 10_000,
            ssdp_mx: 1,
            ssdp_target_addr: SocketAddr::V4(SocketAddrV4::new(
                Ipv4Addr::new(239, 255, 255, 250),
                1900,
            )),
            ssdp_bind_addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)),
            mdns_service_type: AIRPLAY_SERVICE_TYPE.to_string(),
            describe_devices: true,
            description_timeout_ms: 2000,
        }
    }
}

impl DiscoveryConfig {
    pub fn ssdp_timeout(&self) -> Duration {
        Duration::from_millis(self.ssdp_timeout_ms)
    }

    pub fn ssdp_round_interval(&self) -> Duration {
        Duration::from_millis(self.ssdp_round_interval_ms)
    }

    pub fn description_timeout(&self) -> Duration {
        Duration::from_millis(self.description_timeout_ms)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.ssdp_timeout_ms == 0 {
            return Err("ssdpTimeoutMs must be >= 1".to_string());
        }
        if !(1..=5).contains(&self.ssdp_mx) {
            return Err("ssdpMx must be between 1 and 5".to_string());
        }
        if self.describe_devices && self.description_timeout_ms == 0 {
            return Err("descriptionTimeoutMs must be >= 1".to_string());
        }
        let mut protocols = std::collections::HashSet::new();
        for target in &self.ssdp_targets {
            // Round-end ageing is per protocol, so each protocol gets one search.
            if !protocols.insert(target.protocol) {
                return Err(format!("{} has more than one SSDP target", target.protocol));
            }
            match target.protocol {
                CastProtocol::Roku | CastProtocol::Kodi => {}
                CastProtocol::Chromecast | CastProtocol::Airplay => {
                    return Err(format!("{} is not discovered over SSDP", target.protocol));
                }
            }
            if target.search_target.trim().is_empty() {
                return Err(format!("{} search target must not be empty", target.protocol));
            }
        }
        if !self.mdns_service_type.ends_with(".local.") {
            return Err("mdnsServiceType must end with \".local.\"".to_string());
        }
        Ok(())
    }
}

/// Control channel settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct TransportConfig {
    /// Upper bound on opening a control channel (milliseconds).
    pub connect_timeout_ms: u64,

    /// Kodi JSON-RPC over HTTP port.
    pub kodi_rpc_port: u16,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
            kodi_rpc_port: KODI_DEFAULT_RPC_PORT,
        }
    }
}

impl TransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.connect_timeout_ms == 0 {
            return Err("connectTimeoutMs must be >= 1".to_string());
        }
        if self.kodi_rpc_port == 0 {
            return Err("kodiRpcPort must not be 0".to_string());
        }
        Ok(())
    }
}

/// Configuration for the cast core.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub discovery: DiscoveryConfig,
    pub transport: TransportConfig,
}

impl Config {
    /// Validates every section.
    pub fn validate(&self) -> Result<(), String> {
        self.discovery.validate()?;
        self.transport.validate()
    }
}
