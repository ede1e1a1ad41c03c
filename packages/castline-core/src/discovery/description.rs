//! UPnP device-description lookup for SSDP sightings.
//!
//! An SSDP reply only carries headers, so the record it yields is named after its
//! address. When a [`DescriptionFetcher`] is configured the scanner follows the
//! reply's LOCATION and takes the friendly name and model from the description XML.

use std::time::Duration;

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use reqwest::Client;

use super::ssdp::SsdpReply;
use crate::device::{CastDevice, DeviceType};
use crate::utils::clean_xml_text;

/// Fields read from a device description document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescription {
    pub friendly_name: String,
    pub model_name: Option<String>,
}

/// Parses device description XML.
///
/// `friendlyName` is required; `modelName` is optional.
pub fn parse_device_description(xml: &str) -> Option<DeviceDescription> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    let mut friendly_name = None;
    let mut model_name = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let local_name = e.local_name();
                match local_name.as_ref() {
                    b"friendlyName" if friendly_name.is_none() => {
                        friendly_name = reader.read_text(e.name()).ok().and_then(clean_xml_text);
                    }
                    b"modelName" if model_name.is_none() => {
                        model_name = reader.read_text(e.name()).ok().and_then(clean_xml_text);
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                log::trace!("[SSDP] Error parsing device description: {:?}", e);
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    friendly_name.map(|friendly_name| DeviceDescription {
        friendly_name,
        model_name,
    })
}

/// Fetches device descriptions over HTTP.
#[derive(Debug, Clone)]
pub struct DescriptionFetcher {
    client: Client,
}

impl DescriptionFetcher {
    /// Builds a fetcher whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                log::warn!("[SSDP] Failed to build description client ({}), using defaults", e);
                Client::new()
            });
        Self { client }
    }

    /// Fetches and parses the description at `url`.
    pub async fn fetch(&self, url: &str) -> Option<DeviceDescription> {
        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                log::debug!("[SSDP] Description request to {} failed: {}", url, e);
                return None;
            }
        };
        if !response.status().is_success() {
            log::debug!("[SSDP] Description at {} returned {}", url, response.status());
            return None;
        }
        let body = response.text().await.ok()?;
        parse_device_description(&body)
    }

    /// Returns the reply's device enriched with its description.
    ///
    /// Falls back to the header-derived record when the lookup fails.
    pub async fn describe(&self, reply: &SsdpReply) -> CastDevice {
        let device = &reply.device;
        match self.fetch(&reply.location).await {
            Some(desc) => {
                let device_type =
                    DeviceType::classify(device.protocol(), desc.model_name.as_deref());
                device.with_description(desc.friendly_name, device_type)
            }
            None => device.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROKU_DESCRIPTION: &str = r#"<?xml version="1.0" encoding="UTF-8" ?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <device>
    <deviceType>urn:roku-com:device:player:1-0</deviceType>
    <friendlyName>Bedroom Roku</friendlyName>
    <manufacturer>Roku</manufacturer>
    <modelName>Roku Ultra</modelName>
    <modelNumber>4800X</modelNumber>
    <UDN>uuid:29600009-5406-1005-8080-1234567890ab</UDN>
  </device>
</root>"#;

    #[test]
    fn test_parse_device_description() {
        let desc = parse_device_description(ROKU_DESCRIPTION).unwrap();
        assert_eq!(desc.friendly_name, "Bedroom Roku");
        assert_eq!(desc.model_name.as_deref(), Some("Roku Ultra"));
    }

    #[test]
    fn test_parse_device_description_requires_friendly_name() {
        let xml = "<root><device><modelName>Kodi</modelName></device></root>";
        assert!(parse_device_description(xml).is_none());
    }

    #[test]
    fn test_parse_device_description_first_device_wins() {
        // Embedded devices repeat the fields; the root device is listed first.
        let xml = "<root><device><friendlyName>Kodi (den)</friendlyName>\
                   <deviceList><device><friendlyName>Inner</friendlyName></device></deviceList>\
                   </device></root>";
        let desc = parse_device_description(xml).unwrap();
        assert_eq!(desc.friendly_name, "Kodi (den)");
        assert_eq!(desc.model_name, None);
    }

    #[test]
    fn test_parse_device_description_garbage() {
        assert!(parse_device_description("not xml at all").is_none());
        assert!(parse_device_description("").is_none());
    }
}
