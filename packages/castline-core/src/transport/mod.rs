//! Control channels for locally discovered protocols.
//!
//! Opening a channel is the "connect" step of a session: it proves the device
//! answers on its control protocol. The vendor protocol never goes through here;
//! its sessions belong to the vendor adapter.

mod airplay;
mod kodi;
mod roku;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

use crate::config::TransportConfig;
use crate::device::{CastDevice, CastProtocol};

pub use airplay::{parse_rtsp_status, AirplayChannel};
pub use kodi::{check_ping_response, KodiChannel};
pub use roku::{parse_device_info, RokuChannel, RokuDeviceInfo};

// ─────────────────────────────────────────────────────────────────────────────
// Error Types
// ─────────────────────────────────────────────────────────────────────────────

/// Errors raised while opening or closing a control channel.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request to the device failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Device returned a non-success HTTP status.
    #[error("HTTP error {0}: {1}")]
    HttpStatus(u16, String),

    /// TCP connection or I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The device did not answer within the connect timeout.
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The device answered, but not the way its protocol requires.
    #[error("device rejected control request: {0}")]
    Rejected(String),

    /// No local control channel exists for this protocol.
    #[error("{0} has no local control channel")]
    Unsupported(CastProtocol),
}

/// Convenient Result alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

// ─────────────────────────────────────────────────────────────────────────────
// Traits
// ─────────────────────────────────────────────────────────────────────────────

/// An open control channel to one device.
#[async_trait]
pub trait ControlChannel: Send + Sync {
    /// Device this channel talks to.
    fn device(&self) -> &CastDevice;

    /// Releases the channel.
    async fn close(self: Box<Self>) -> TransportResult<()>;
}

/// Opens control channels. The session orchestrator's only path to the network.
#[async_trait]
pub trait ChannelConnector: Send + Sync + 'static {
    async fn open(&self, device: &CastDevice) -> TransportResult<Box<dyn ControlChannel>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Network Connector
// ─────────────────────────────────────────────────────────────────────────────

/// Production connector speaking each protocol's real control surface.
#[derive(Debug, Clone)]
pub struct NetworkConnector {
    http: Client,
    config: TransportConfig,
}

impl NetworkConnector {
    pub fn new(http: Client, config: TransportConfig) -> Self {
        Self { http, config }
    }
}

#[async_trait]
impl ChannelConnector for NetworkConnector {
    async fn open(&self, device: &CastDevice) -> TransportResult<Box<dyn ControlChannel>> {
        let limit = self.config.connect_timeout();
        let attempt = async {
            let channel: Box<dyn ControlChannel> = match device.protocol() {
                CastProtocol::Chromecast => {
                    return Err(TransportError::Unsupported(CastProtocol::Chromecast))
                }
                CastProtocol::Roku => Box::new(RokuChannel::open(&self.http, device).await?),
                CastProtocol::Kodi => Box::new(
                    KodiChannel::open(&self.http, device, self.config.kodi_rpc_port).await?,
                ),
                CastProtocol::Airplay => Box::new(AirplayChannel::open(device).await?),
            };
            Ok(channel)
        };

        match tokio::time::timeout(limit, attempt).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(limit)),
        }
    }
}
