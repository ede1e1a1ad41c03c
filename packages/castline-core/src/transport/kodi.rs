//! Kodi JSON-RPC channel.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{ControlChannel, TransportError, TransportResult};
use crate::device::CastDevice;

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Checks a `JSONRPC.Ping` response body.
pub fn check_ping_response(body: &str) -> TransportResult<()> {
    let response: RpcResponse = serde_json::from_str(body)
        .map_err(|e| TransportError::Rejected(format!("invalid JSON-RPC response: {}", e)))?;

    if let Some(error) = response.error {
        return Err(TransportError::Rejected(format!(
            "JSON-RPC error {}: {}",
            error.code, error.message
        )));
    }
    match response.result.as_ref().and_then(|r| r.as_str()) {
        Some("pong") => Ok(()),
        other => Err(TransportError::Rejected(format!(
            "unexpected ping result: {:?}",
            other
        ))),
    }
}

/// A JSON-RPC endpoint that answered a ping.
pub struct KodiChannel {
    device: CastDevice,
    endpoint: String,
}

impl KodiChannel {
    /// Pings `http://<host>:<rpc_port>/jsonrpc`.
    ///
    /// The RPC port is separate from the UPnP port the device was discovered on.
    pub async fn open(client: &Client, device: &CastDevice, rpc_port: u16) -> TransportResult<Self> {
        let endpoint = format!("http://{}:{}/jsonrpc", device.host(), rpc_port);
        log::debug!("[Kodi] JSONRPC.Ping -> {}", endpoint);

        let response = client
            .post(&endpoint)
            .json(&json!({ "jsonrpc": "2.0", "method": "JSONRPC.Ping", "id": 1 }))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TransportError::HttpStatus(status.as_u16(), body));
        }
        check_ping_response(&body)?;

        log::info!("[Kodi] Connected to {}", device.display_name());
        Ok(Self {
            device: device.clone(),
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ControlChannel for KodiChannel {
    fn device(&self) -> &CastDevice {
        &self.device
    }

    async fn close(self: Box<Self>) -> TransportResult<()> {
        log::debug!("[Kodi] Closed channel to {}", self.endpoint);
        Ok(())
    }
}
