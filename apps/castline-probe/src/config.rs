//! Probe configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Probe configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Enable SSDP discovery (Roku, Kodi).
    pub discovery_ssdp: bool,

    /// Enable mDNS/Bonjour discovery (AirPlay).
    pub discovery_mdns: bool,

    /// Listen window of each SSDP round, in milliseconds.
    /// Override: `CASTLINE_SSDP_TIMEOUT_MS`
    pub ssdp_timeout_ms: u64,

    /// Pause between SSDP rounds, in milliseconds.
    /// Override: `CASTLINE_ROUND_INTERVAL_MS`
    pub round_interval_ms: u64,

    /// Fetch UPnP descriptions to name SSDP devices.
    pub describe_devices: bool,

    /// Upper bound on opening a control channel, in milliseconds.
    /// Override: `CASTLINE_CONNECT_TIMEOUT_MS`
    pub connect_timeout_ms: u64,

    /// Kodi JSON-RPC port.
    /// Override: `CASTLINE_KODI_RPC_PORT`
    pub kodi_rpc_port: u16,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        let core = castline_core::Config::default();
        Self {
            discovery_ssdp: core.discovery.ssdp_enabled,
            discovery_mdns: core.discovery.mdns_enabled,
            ssdp_timeout_ms: core.discovery.ssdp_timeout_ms,
            round_interval_ms: core.discovery.ssdp_round_interval_ms,
            describe_devices: core.discovery.describe_devices,
            connect_timeout_ms: core.transport.connect_timeout_ms,
            kodi_rpc_port: core.transport.kodi_rpc_port,
        }
    }
}

impl ProbeConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies overrides from `lookup`; unparsable values are ignored.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(ms) = lookup("CASTLINE_SSDP_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.ssdp_timeout_ms = ms;
        }

        if let Some(ms) = lookup("CASTLINE_ROUND_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.round_interval_ms = ms;
        }

        if let Some(ms) = lookup("CASTLINE_CONNECT_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.connect_timeout_ms = ms;
        }

        if let Some(port) = lookup("CASTLINE_KODI_RPC_PORT").and_then(|v| v.parse().ok()) {
            self.kodi_rpc_port = port;
        }
    }

    /// Converts to castline-core's Config type.
    pub fn to_core_config(&self) -> castline_core::Config {
        let mut config = castline_core::Config::default();
        config.discovery.ssdp_enabled = self.discovery_ssdp;
        config.discovery.mdns_enabled = self.discovery_mdns;
        config.discovery.ssdp_timeout_ms = self.ssdp_timeout_ms;
        config.discovery.ssdp_round_interval_ms = self.round_interval_ms;
        config.discovery.describe_devices = self.describe_devices;
        config.transport.connect_timeout_ms = self.connect_timeout_ms;
        config.transport.kodi_rpc_port = self.kodi_rpc_port;
        config
    }
}
