//! SSDP-based device discovery.
//!
//! Each [`SsdpScanner::scan`] call is one round: a single M-SEARCH to the SSDP
//! multicast group, then a time-boxed listen on the same socket since devices reply
//! unicast back to the sending socket/port.

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use reqwest::Url;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use super::description::DescriptionFetcher;
use super::types::{DeviceStream, DiscoveryError, DiscoveryResult, ScanEvent};
use crate::device::{CastDevice, CastProtocol, DeviceIdentity, DeviceType};
use crate::protocol_constants::{
    DEFAULT_HTTP_PORT, SSDP_MULTICAST_ADDR, SSDP_MULTICAST_TTL, SSDP_RECV_BUFFER,
};

// ─────────────────────────────────────────────────────────────────────────────
// ASCII Case-Insensitive Helpers
// ─────────────────────────────────────────────────────────────────────────────
//
// These avoid allocations from to_lowercase() during SSDP response parsing.
// HTTP headers are ASCII, so byte-level comparison is safe and efficient.

/// Checks if `haystack` contains `needle` (ASCII case-insensitive, no allocation).
#[inline]
fn contains_ignore_ascii_case(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    if needle.len() > haystack.len() {
        return false;
    }
    haystack
        .as_bytes()
        .windows(needle.len())
        .any(|window| window.eq_ignore_ascii_case(needle.as_bytes()))
}

/// Returns the trimmed value of the first `name:` header line (case-insensitive name).
fn header_value<'a>(response: &'a str, name: &str) -> Option<&'a str> {
    response.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim())
            .filter(|v| !v.is_empty())
    })
}

// ─────────────────────────────────────────────────────────────────────────────

/// Build the M-SEARCH message.
///
/// The HOST header always names the standard multicast group, even when the
/// datagram is aimed elsewhere (loopback responders in tests).
fn build_msearch_message(search_target: &str, mx: u64) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: {}\r\n\
         ST: {}\r\n\r\n",
        SSDP_MULTICAST_ADDR, mx, search_target
    )
}

/// A parsed SSDP reply.
#[derive(Debug, Clone, PartialEq)]
pub struct SsdpReply {
    /// Device record built from the reply headers.
    pub device: CastDevice,
    /// LOCATION URL, kept for an optional device-description lookup.
    pub location: String,
}

/// Parses an SSDP reply into a device record.
///
/// Returns `None` when the reply has no usable LOCATION, or when `hint` is set and
/// the reply does not mention it.
pub fn parse_ssdp_response(
    response: &str,
    protocol: CastProtocol,
    hint: Option<&str>,
) -> Option<SsdpReply> {
    if let Some(hint) = hint {
        if !contains_ignore_ascii_case(response, hint) {
            return None;
        }
    }

    let location = header_value(response, "location")?;
    let url = match Url::parse(location) {
        Ok(url) => url,
        Err(e) => {
            log::debug!("[SSDP] Ignoring reply with bad LOCATION {:?}: {}", location, e);
            return None;
        }
    };
    let host = url.host_str().filter(|h| !h.is_empty())?.to_string();
    let port = url.port_or_known_default().unwrap_or(DEFAULT_HTTP_PORT);

    let usn = header_value(response, "usn").unwrap_or(location);
    let display_name = format!("{} ({})", protocol.label(), host);

    Some(SsdpReply {
        device: CastDevice::new(
            DeviceIdentity::new(protocol, usn),
            display_name,
            host,
            port,
            DeviceType::Unknown,
        ),
        location: location.to_string(),
    })
}

/// Socket configuration for SSDP discovery.
#[derive(Debug, Clone)]
pub struct SsdpConfig {
    /// Where the M-SEARCH is sent.
    pub target: SocketAddr,
    /// Local address the query socket binds to.
    pub bind: SocketAddr,
    /// MX value (max response delay in seconds).
    pub mx_value: u64,
    /// Case-insensitive marker a reply must contain to be accepted.
    pub response_hint: Option<String>,
    /// When set, each new sighting is enriched from its device description.
    pub describer: Option<DescriptionFetcher>,
}

impl Default for SsdpConfig {
    fn default() -> Self {
        Self {
            target: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(239, 255, 255, 250), 1900)),
            bind: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)),
            mx_value: 1,
            response_hint: None,
            describer: None,
        }
    }
}

/// Creates the UDP socket used for one scan round.
///
/// Sets up socket options for SSDP discovery:
/// - SO_REUSEADDR for rapid restarts
/// - SO_REUSEPORT on Unix
/// - Multicast TTL of 4 per UPnP spec
fn create_socket(bind_addr: SocketAddr) -> DiscoveryResult<UdpSocket> {
    let domain = if bind_addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket =
        Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)).map_err(DiscoveryError::SocketBind)?;

    if let Err(e) = socket.set_reuse_address(true) {
        log::warn!("[SSDP] Failed to set SO_REUSEADDR on {}: {}", bind_addr, e);
    }

    #[cfg(unix)]
    if let Err(e) = socket.set_reuse_port(true) {
        log::warn!("[SSDP] Failed to set SO_REUSEPORT on {}: {}", bind_addr, e);
    }

    if bind_addr.is_ipv4() {
        if let Err(e) = socket.set_multicast_ttl_v4(SSDP_MULTICAST_TTL) {
            log::warn!("[SSDP] Failed to set multicast TTL on {}: {}", bind_addr, e);
        }
    }

    // Set non-blocking before converting to tokio socket
    socket
        .set_nonblocking(true)
        .map_err(DiscoveryError::SocketBind)?;
    socket
        .bind(&bind_addr.into())
        .map_err(DiscoveryError::SocketBind)?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket).map_err(DiscoveryError::SocketBind)
}

/// Time-boxed SSDP scanner for one protocol.
#[derive(Debug, Clone)]
pub struct SsdpScanner {
    protocol: CastProtocol,
    config: SsdpConfig,
}

impl SsdpScanner {
    pub fn new(protocol: CastProtocol, config: SsdpConfig) -> Self {
        Self { protocol, config }
    }

    pub fn protocol(&self) -> CastProtocol {
        self.protocol
    }

    /// Runs one discovery round.
    ///
    /// Binds the socket and sends the M-SEARCH before returning, so a bind or send
    /// failure surfaces here and the round never starts. Receiving happens on a
    /// background task feeding the returned stream, which ends when `timeout`
    /// elapses. A USN seen twice in the round is dropped.
    ///
    /// Must be called within a Tokio runtime.
    pub async fn scan(
        &self,
        search_target: &str,
        timeout: Duration,
    ) -> DiscoveryResult<DeviceStream> {
        let deadline = Instant::now() + timeout;
        let socket = create_socket(self.config.bind)?;
        let message = build_msearch_message(search_target, self.config.mx_value);
        socket
            .send_to(message.as_bytes(), self.config.target)
            .await
            .map_err(DiscoveryError::SendSearch)?;

        log::debug!(
            "[SSDP] {} sent M-SEARCH to {}: ST={}, timeout={}ms",
            self.protocol,
            self.config.target,
            search_target,
            timeout.as_millis()
        );

        let round = ScanRound {
            protocol: self.protocol,
            hint: self.config.response_hint.clone(),
            describer: self.config.describer.clone(),
            deadline,
        };
        Ok(DeviceStream::spawn("SSDP", move |tx, cancel| {
            round.run(socket, tx, cancel)
        }))
    }
}

struct ScanRound {
    protocol: CastProtocol,
    hint: Option<String>,
    describer: Option<DescriptionFetcher>,
    deadline: Instant,
}

impl ScanRound {
    /// Socket is dropped (closed) when this returns, on every exit path.
    async fn run(self, socket: UdpSocket, tx: mpsc::Sender<ScanEvent>, cancel: CancellationToken) {
        let protocol = self.protocol;

        let mut seen: HashSet<String> = HashSet::new();
        let mut buf = [0u8; SSDP_RECV_BUFFER];

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log::debug!("[SSDP] {} round cancelled", protocol);
                    break;
                }
                _ = sleep_until(self.deadline) => {
                    log::debug!("[SSDP] {} round complete: {} unique device(s)", protocol, seen.len());
                    break;
                }
                received = socket.recv_from(&mut buf) => {
                    let (amt, src) = match received {
                        Ok(r) => r,
                        Err(e) => {
                            log::warn!("[SSDP] {} socket recv error: {}", protocol, e);
                            continue;
                        }
                    };
                    let response = String::from_utf8_lossy(&buf[..amt]);
                    let Some(reply) = parse_ssdp_response(&response, protocol, self.hint.as_deref()) else {
                        log::trace!("[SSDP] {} skipped unusable reply from {}", protocol, src);
                        continue;
                    };
                    if !seen.insert(reply.device.identity().key.clone()) {
                        log::trace!("[SSDP] {} duplicate USN {} dropped", protocol, reply.device.identity().key);
                        continue;
                    }
                    log::debug!(
                        "[SSDP] {} discovered {} at {}:{}",
                        protocol,
                        reply.device.identity().key,
                        reply.device.host(),
                        reply.device.port()
                    );
                    let device = match &self.describer {
                        Some(describer) => tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break,
                            _ = sleep_until(self.deadline) => reply.device.clone(),
                            device = describer.describe(&reply) => device,
                        },
                        None => reply.device,
                    };
                    if tx.send(ScanEvent::Found(device)).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    const ROKU_REPLY: &str = "HTTP/1.1 200 OK\r\n\
Cache-Control: max-age=3600\r\n\
ST: roku:ecp\r\n\
Location: http://192.168.1.134:8060/\r\n\
USN: uuid:roku:ecp:P0A070000007\r\n\
\r\n";

    #[test]
    fn test_build_msearch_message() {
        let msg = build_msearch_message("roku:ecp", 1);
        assert!(msg.starts_with("M-SEARCH * HTTP/1.1\r\n"));
        assert!(msg.contains("HOST: 239.255.255.250:1900\r\n"));
        assert!(msg.contains("MAN: \"ssdp:discover\"\r\n"));
        assert!(msg.contains("MX: 1\r\n"));
        assert!(msg.ends_with("ST: roku:ecp\r\n\r\n"));
    }

    #[test]
    fn test_parse_ssdp_response_valid() {
        let reply = parse_ssdp_response(ROKU_REPLY, CastProtocol::Roku, None).unwrap();
        assert_eq!(reply.device.identity().key, "uuid:roku:ecp:P0A070000007");
        assert_eq!(reply.device.protocol(), CastProtocol::Roku);
        assert_eq!(reply.device.host(), "192.168.1.134");
        assert_eq!(reply.device.port(), 8060);
        assert_eq!(reply.device.device_type(), DeviceType::Unknown);
        assert_eq!(reply.location, "http://192.168.1.134:8060/");
    }

    #[test]
    fn test_parse_ssdp_response_missing_location() {
        let response = "HTTP/1.1 200 OK\r\nST: roku:ecp\r\nUSN: uuid:abc\r\n\r\n";
        assert!(parse_ssdp_response(response, CastProtocol::Roku, None).is_none());
    }

    #[test]
    fn test_parse_ssdp_response_case_insensitive() {
        let response = "HTTP/1.1 200 OK\r\nlocation: http://10.0.0.9:1780/desc.xml\r\nusn: uuid:kodi-1\r\n\r\n";
        let reply = parse_ssdp_response(response, CastProtocol::Kodi, None).unwrap();
        assert_eq!(reply.device.identity().key, "uuid:kodi-1");
        assert_eq!(reply.device.port(), 1780);
    }

    #[test]
    fn test_parse_ssdp_response_default_port() {
        let response = "HTTP/1.1 200 OK\nLOCATION: http://10.0.0.7/description.xml\nUSN: uuid:x\n\n";
        let reply = parse_ssdp_response(response, CastProtocol::Kodi, None).unwrap();
        assert_eq!(reply.device.port(), 80);
    }

    #[test]
    fn test_parse_ssdp_response_location_as_key_without_usn() {
        let response = "HTTP/1.1 200 OK\r\nLOCATION: http://10.0.0.7:8060/\r\n\r\n";
        let reply = parse_ssdp_response(response, CastProtocol::Roku, None).unwrap();
        assert_eq!(reply.device.identity().key, "http://10.0.0.7:8060/");
    }

    #[test]
    fn test_parse_ssdp_response_rejects_bad_location() {
        let response = "HTTP/1.1 200 OK\r\nLOCATION: not a url\r\nUSN: uuid:x\r\n\r\n";
        assert!(parse_ssdp_response(response, CastProtocol::Roku, None).is_none());
    }

    #[test]
    fn test_parse_ssdp_response_hint() {
        let kodi = "HTTP/1.1 200 OK\r\nSERVER: Linux UPnP/1.0 Kodi/20.2\r\nLOCATION: http://10.0.0.3:1780/\r\nUSN: uuid:k\r\n\r\n";
        let other = "HTTP/1.1 200 OK\r\nSERVER: Linux UPnP/1.0 Sonos/63\r\nLOCATION: http://10.0.0.4:1400/\r\nUSN: uuid:s\r\n\r\n";
        assert!(parse_ssdp_response(kodi, CastProtocol::Kodi, Some("kodi")).is_some());
        assert!(parse_ssdp_response(other, CastProtocol::Kodi, Some("kodi")).is_none());
    }

    #[test]
    fn test_contains_ignore_ascii_case() {
        assert!(contains_ignore_ascii_case("Hello World", "world"));
        assert!(contains_ignore_ascii_case("KODI renderer", "kodi"));
        assert!(!contains_ignore_ascii_case("Hello", "xyz"));
        assert!(contains_ignore_ascii_case("test", ""));
        assert!(!contains_ignore_ascii_case("ab", "abc"));
    }

    #[test]
    fn test_header_value() {
        assert_eq!(header_value(ROKU_REPLY, "LOCATION"), Some("http://192.168.1.134:8060/"));
        assert_eq!(header_value(ROKU_REPLY, "st"), Some("roku:ecp"));
        assert_eq!(header_value("HTTP/1.1 200 OK\r\nEXT:\r\n\r\n", "ext"), None);
    }

    /// Binds a loopback "device" and returns it with a scanner aimed at it.
    async fn loopback_scanner() -> (UdpSocket, SsdpScanner) {
        let responder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = SsdpConfig {
            target: responder.local_addr().unwrap(),
            bind: "127.0.0.1:0".parse().unwrap(),
            ..SsdpConfig::default()
        };
        (responder, SsdpScanner::new(CastProtocol::Roku, config))
    }

    #[tokio::test]
    async fn duplicate_usn_within_round_emits_once() {
        let (responder, scanner) = loopback_scanner().await;
        let mut stream = scanner.scan("roku:ecp", Duration::from_millis(3000)).await.unwrap();

        let mut buf = [0u8; 1024];
        let (amt, scanner_addr) = responder.recv_from(&mut buf).await.unwrap();
        let query = String::from_utf8_lossy(&buf[..amt]).to_string();
        assert!(query.contains("ST: roku:ecp"));

        let first = "HTTP/1.1 200 OK\r\nST: roku:ecp\r\nUSN: uuid:abc\r\nLOCATION: http://192.168.1.20:8060/\r\n\r\n";
        let second = "HTTP/1.1 200 OK\r\nST: roku:ecp\r\nUSN: uuid:abc\r\nLOCATION: http://192.168.1.21:8060/\r\n\r\n";
        responder.send_to(first.as_bytes(), scanner_addr).await.unwrap();
        responder.send_to(second.as_bytes(), scanner_addr).await.unwrap();

        let found = stream.next().await.expect("first reply should be emitted");
        let ScanEvent::Found(device) = found else {
            panic!("expected a found event");
        };
        assert_eq!(device.identity().key, "uuid:abc");
        assert_eq!(device.host(), "192.168.1.20");

        // Nothing else arrives before we cancel the round.
        let extra = tokio::time::timeout(Duration::from_millis(200), stream.next()).await;
        assert!(extra.is_err(), "duplicate USN must not be emitted");
        stream.cancel().await;
    }

    #[tokio::test]
    async fn unusable_replies_do_not_end_the_round() {
        let (responder, scanner) = loopback_scanner().await;
        let mut stream = scanner.scan("roku:ecp", Duration::from_millis(500)).await.unwrap();

        let mut buf = [0u8; 1024];
        let (_, scanner_addr) = responder.recv_from(&mut buf).await.unwrap();
        responder.send_to(&[0xff, 0xfe, 0x00, 0x13], scanner_addr).await.unwrap();
        responder
            .send_to(b"HTTP/1.1 200 OK\r\nUSN: uuid:nolocation\r\n\r\n", scanner_addr)
            .await
            .unwrap();
        responder.send_to(ROKU_REPLY.as_bytes(), scanner_addr).await.unwrap();

        let events: Vec<_> = (&mut stream).collect().await;
        assert_eq!(events.len(), 1);
        let ScanEvent::Found(device) = &events[0] else {
            panic!("expected a found event");
        };
        assert_eq!(device.identity().key, "uuid:roku:ecp:P0A070000007");
    }

    #[tokio::test]
    async fn send_failure_is_returned_from_scan() {
        let config = SsdpConfig {
            target: "[::1]:1900".parse().unwrap(),
            bind: "127.0.0.1:0".parse().unwrap(),
            ..SsdpConfig::default()
        };
        let scanner = SsdpScanner::new(CastProtocol::Roku, config);

        let result = scanner.scan("roku:ecp", Duration::from_millis(100)).await;
        assert!(matches!(result, Err(DiscoveryError::SendSearch(_))));
    }

    /// Serves one description document over HTTP on loopback.
    async fn serve_description(xml: &'static str) -> u16 {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
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
                xml.len(),
                xml
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        port
    }

    #[tokio::test]
    async fn describer_names_sighting_from_location() {
        let port = serve_description(
            "<root><device><friendlyName>Living Room Roku</friendlyName>\
             <modelName>Roku Ultra</modelName></device></root>",
        )
        .await;
        let responder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = SsdpConfig {
            target: responder.local_addr().unwrap(),
            bind: "127.0.0.1:0".parse().unwrap(),
            describer: Some(DescriptionFetcher::new(Duration::from_secs(2))),
            ..SsdpConfig::default()
        };
        let scanner = SsdpScanner::new(CastProtocol::Roku, config);
        let mut stream = scanner.scan("roku:ecp", Duration::from_secs(3)).await.unwrap();

        let mut buf = [0u8; 1024];
        let (_, scanner_addr) = responder.recv_from(&mut buf).await.unwrap();
        let reply = format!(
            "HTTP/1.1 200 OK\r\nST: roku:ecp\r\nUSN: uuid:roku:ecp:LR1\r\nLOCATION: http://127.0.0.1:{}/\r\n\r\n",
            port
        );
        responder.send_to(reply.as_bytes(), scanner_addr).await.unwrap();

        let Some(ScanEvent::Found(device)) = stream.next().await else {
            panic!("expected a found event");
        };
        assert_eq!(device.identity().key, "uuid:roku:ecp:LR1");
        assert_eq!(device.display_name(), "Living Room Roku");
        assert_eq!(device.device_type(), DeviceType::Tv);
        assert_eq!(device.port(), port);
        stream.cancel().await;
    }

    #[tokio::test]
    async fn round_completes_on_timeout() {
        let (_responder, scanner) = loopback_scanner().await;
        let mut stream = scanner.scan("roku:ecp", Duration::from_millis(100)).await.unwrap();

        let next = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("round should end on its own");
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn cancel_stops_round_before_timeout() {
        let (_responder, scanner) = loopback_scanner().await;
        let mut stream = scanner.scan("roku:ecp", Duration::from_secs(30)).await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), stream.cancel())
            .await
            .expect("cancel should return promptly");
        assert!(stream.next().await.is_none());
    }
}
