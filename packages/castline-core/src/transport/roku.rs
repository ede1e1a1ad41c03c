//! Roku External Control Protocol (ECP) channel.

use async_trait::async_trait;
use reqwest::Client;

use super::{ControlChannel, TransportError, TransportResult};
use crate::device::CastDevice;
use crate::utils::extract_xml_text;

/// Fields of `/query/device-info` the session cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RokuDeviceInfo {
    pub name: Option<String>,
    pub model: Option<String>,
    pub power_mode: Option<String>,
}

/// Parses the ECP device-info document.
///
/// Returns `None` when the body is not a device-info document.
pub fn parse_device_info(xml: &str) -> Option<RokuDeviceInfo> {
    if !xml.contains("<device-info") {
        return None;
    }
    Some(RokuDeviceInfo {
        name: extract_xml_text(xml, "user-device-name")
            .or_else(|| extract_xml_text(xml, "friendly-device-name")),
        model: extract_xml_text(xml, "model-name"),
        power_mode: extract_xml_text(xml, "power-mode"),
    })
}

/// ECP is stateless HTTP; the channel records what the device reported on open.
pub struct RokuChannel {
    device: CastDevice,
    info: RokuDeviceInfo,
}

impl RokuChannel {
    pub async fn open(client: &Client, device: &CastDevice) -> TransportResult<Self> {
        let url = format!("http://{}:{}/query/device-info", device.host(), device.port());
        log::debug!("[Roku] GET {}", url);

        let response = client.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TransportError::HttpStatus(status.as_u16(), body));
        }

        let info = parse_device_info(&body)
            .ok_or_else(|| TransportError::Rejected("missing device-info document".into()))?;
        log::info!(
            "[Roku] Connected to {} ({})",
            info.name.as_deref().unwrap_or(device.display_name()),
            info.model.as_deref().unwrap_or("unknown model")
        );
        Ok(Self {
            device: device.clone(),
            info,
        })
    }

    pub fn info(&self) -> &RokuDeviceInfo {
        &self.info
    }
}

#[async_trait]
impl ControlChannel for RokuChannel {
    fn device(&self) -> &CastDevice {
        &self.device
    }

    async fn close(self: Box<Self>) -> TransportResult<()> {
        log::debug!("[Roku] Closed channel to {}", self.device.host());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{CastProtocol, DeviceIdentity, DeviceType};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_parse_device_info() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8" ?>
<device-info>
	<udn>29600009-5406-1005-8080-1234567890ab</udn>
	<serial-number>X004000AAAAA</serial-number>
	<model-name>Roku Ultra</model-name>
	<friendly-device-name>Roku Ultra - X004000AAAAA</friendly-device-name>
	<user-device-name>Bedroom</user-device-name>
	<power-mode>PowerOn</power-mode>
</device-info>"#;
        let info = parse_device_info(xml).unwrap();
        assert_eq!(info.name.as_deref(), Some("Bedroom"));
        assert_eq!(info.model.as_deref(), Some("Roku Ultra"));
        assert_eq!(info.power_mode.as_deref(), Some("PowerOn"));
    }

    #[test]
    fn test_parse_device_info_falls_back_to_friendly_name() {
        let xml = "<device-info><friendly-device-name>Roku Express</friendly-device-name></device-info>";
        let info = parse_device_info(xml).unwrap();
        assert_eq!(info.name.as_deref(), Some("Roku Express"));
        assert_eq!(info.model, None);
    }

    #[test]
    fn test_parse_device_info_rejects_other_documents() {
        assert!(parse_device_info("<html><body>hi</body></html>").is_none());
    }

    /// Serves one canned ECP response on loopback and returns the request it saw.
    async fn one_shot_ecp(body: &'static str) -> (u16, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !String::from_utf8_lossy(&request).contains("\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&request).to_string()
        });
        (port, handle)
    }

    fn loopback_roku(port: u16) -> CastDevice {
        CastDevice::new(
            DeviceIdentity::new(CastProtocol::Roku, "uuid:roku:ecp:LOOP"),
            "Roku (127.0.0.1)",
            "127.0.0.1",
            port,
            DeviceType::Unknown,
        )
    }

    #[tokio::test]
    async fn open_queries_device_info() {
        let (port, server) = one_shot_ecp(
            "<device-info><model-name>Roku Express</model-name>\
             <user-device-name>Den</user-device-name><power-mode>PowerOn</power-mode></device-info>",
        )
        .await;
        let device = loopback_roku(port);

        let channel = RokuChannel::open(&Client::new(), &device).await.unwrap();
        assert_eq!(channel.info().name.as_deref(), Some("Den"));
        assert_eq!(channel.info().model.as_deref(), Some("Roku Express"));
        assert_eq!(channel.device().identity(), device.identity());

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /query/device-info HTTP/1.1"));
    }

    #[tokio::test]
    async fn open_rejects_non_ecp_responder() {
        let (port, _server) = one_shot_ecp("<html><body>router login</body></html>").await;
        let result = RokuChannel::open(&Client::new(), &loopback_roku(port)).await;
        assert!(matches!(result, Err(TransportError::Rejected(_))));
    }
}
