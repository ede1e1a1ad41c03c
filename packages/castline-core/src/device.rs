//! Device model shared by every scanner, the catalog and the session orchestrator.
//!
//! A [`CastDevice`] is an immutable record. Scanners build a fresh record on every
//! sighting and the catalog swaps whole records, so nothing here offers mutation.

use serde::{Deserialize, Serialize};

/// Cast protocols understood by the core.
///
/// The declaration order is the display priority used when the catalog groups
/// devices: the vendor SDK protocol first, then the two SSDP-discovered protocols,
/// then the service-advertisement protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CastProtocol {
    /// Google Cast, driven through the vendor session SDK.
    Chromecast,
    /// Roku External Control Protocol, discovered over SSDP.
    Roku,
    /// Kodi JSON-RPC, discovered over SSDP.
    Kodi,
    /// AirPlay, discovered through service advertisement.
    Airplay,
}

impl CastProtocol {
    /// All protocols in display priority order.
    pub const ALL: [CastProtocol; 4] = [
        CastProtocol::Chromecast,
        CastProtocol::Roku,
        CastProtocol::Kodi,
        CastProtocol::Airplay,
    ];

    /// Position of this protocol in the user-facing grouping (lower sorts first).
    pub fn display_priority(self) -> u8 {
        match self {
            Self::Chromecast => 0,
            Self::Roku => 1,
            Self::Kodi => 2,
            Self::Airplay => 3,
        }
    }

    /// Whether sessions for this protocol are owned by the vendor SDK.
    pub fn is_vendor_managed(self) -> bool {
        match self {
            Self::Chromecast => true,
            Self::Roku | Self::Kodi | Self::Airplay => false,
        }
    }

    /// Human-readable protocol label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Chromecast => "Chromecast",
            Self::Roku => "Roku",
            Self::Kodi => "Kodi",
            Self::Airplay => "AirPlay",
        }
    }
}

impl std::fmt::Display for CastProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Coarse device classification for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceType {
    Tv,
    Speaker,
    #[default]
    Unknown,
}

const SPEAKER_MARKERS: &[&str] = &["speaker", "soundbar", "streambar", "audio", "home mini"];

impl DeviceType {
    /// Classifies a device from the model hint its protocol metadata exposes.
    ///
    /// Returns [`DeviceType::Unknown`] whenever the protocol carries no usable hint.
    pub fn classify(protocol: CastProtocol, model: Option<&str>) -> Self {
        let Some(model) = model.map(str::trim).filter(|m| !m.is_empty()) else {
            return Self::Unknown;
        };
        let model = model.to_ascii_lowercase();
        let is_speaker = SPEAKER_MARKERS.iter().any(|m| model.contains(m));

        match protocol {
            CastProtocol::Chromecast => {
                if is_speaker || model.contains("google home") || model.contains("nest") {
                    Self::Speaker
                } else if model.contains("chromecast") || model.contains("tv") {
                    Self::Tv
                } else {
                    Self::Unknown
                }
            }
            // Every Roku player drives a screen unless it is one of the audio products.
            CastProtocol::Roku => {
                if is_speaker {
                    Self::Speaker
                } else {
                    Self::Tv
                }
            }
            CastProtocol::Kodi => Self::Unknown,
            CastProtocol::Airplay => {
                if model.starts_with("appletv") || model.contains("tv") {
                    Self::Tv
                } else if is_speaker
                    || model.starts_with("audioaccessory")
                    || model.starts_with("airport")
                    || model.contains("homepod")
                {
                    Self::Speaker
                } else {
                    Self::Unknown
                }
            }
        }
    }
}

/// Catalog key: protocol tag plus the protocol-native unique key.
///
/// Keys from different protocols never collide even when the raw strings match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub protocol: CastProtocol,
    /// USN for SSDP, fully resolved service name for advertisements, device id for the vendor SDK.
    pub key: String,
}

impl DeviceIdentity {
    pub fn new(protocol: CastProtocol, key: impl Into<String>) -> Self {
        Self {
            protocol,
            key: key.into(),
        }
    }
}

impl std::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.protocol, self.key)
    }
}

/// A discovered playback device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastDevice {
    identity: DeviceIdentity,
    display_name: String,
    host: String,
    port: u16,
    device_type: DeviceType,
}

impl CastDevice {
    /// Builds a device record. The protocol is taken from `identity`.
    pub fn new(
        identity: DeviceIdentity,
        display_name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        device_type: DeviceType,
    ) -> Self {
        Self {
            identity,
            display_name: display_name.into(),
            host: host.into(),
            port,
            device_type,
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn protocol(&self) -> CastProtocol {
        self.identity.protocol
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    /// Returns a new record carrying a resolved name and classification.
    ///
    /// Used when a later lookup learns more about a device than its first sighting did.
    #[must_use]
    pub fn with_description(&self, display_name: impl Into<String>, device_type: DeviceType) -> Self {
        Self {
            identity: self.identity.clone(),
            display_name: display_name.into(),
            host: self.host.clone(),
            port: self.port,
            device_type,
        }
    }
}
