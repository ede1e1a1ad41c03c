//! AirPlay control connection.
//!
//! AirPlay receivers speak RTSP on their advertised port. An `OPTIONS` request
//! answered with `200` is taken as proof the receiver accepts control traffic;
//! the TCP connection is then held for the lifetime of the session.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use super::{ControlChannel, TransportError, TransportResult};
use crate::device::CastDevice;

const OPTIONS_REQUEST: &str = "OPTIONS * RTSP/1.0\r\nCSeq: 1\r\nUser-Agent: castline\r\n\r\n";

/// Extracts the status code from an RTSP status line, e.g. `RTSP/1.0 200 OK`.
pub fn parse_rtsp_status(line: &str) -> Option<u16> {
    let mut parts = line.split_whitespace();
    let version = parts.next()?;
    if !version.starts_with("RTSP/") {
        return None;
    }
    parts.next()?.parse().ok()
}

pub struct AirplayChannel {
    device: CastDevice,
    stream: BufReader<TcpStream>,
}

impl AirplayChannel {
    pub async fn open(device: &CastDevice) -> TransportResult<Self> {
        let stream = TcpStream::connect((device.host(), device.port())).await?;
        let mut stream = BufReader::new(stream);
        log::debug!("[AirPlay] OPTIONS -> {}:{}", device.host(), device.port());

        stream.get_mut().write_all(OPTIONS_REQUEST.as_bytes()).await?;

        let mut status_line = String::new();
        if stream.read_line(&mut status_line).await? == 0 {
            return Err(TransportError::Rejected("connection closed before reply".into()));
        }
        match parse_rtsp_status(&status_line) {
            Some(200) => {}
            Some(code) => {
                return Err(TransportError::Rejected(format!("OPTIONS answered {}", code)))
            }
            None => {
                return Err(TransportError::Rejected(format!(
                    "not an RTSP reply: {:?}",
                    status_line.trim_end()
                )))
            }
        }

        // Drain the remaining headers so the connection is positioned for the next request.
        loop {
            let mut line = String::new();
            if stream.read_line(&mut line).await? == 0 || line.trim_end().is_empty() {
                break;
            }
        }

        log::info!("[AirPlay] Connected to {}", device.display_name());
        Ok(Self {
            device: device.clone(),
            stream,
        })
    }
}

#[async_trait]
impl ControlChannel for AirplayChannel {
    fn device(&self) -> &CastDevice {
        &self.device
    }

    async fn close(mut self: Box<Self>) -> TransportResult<()> {
        self.stream.get_mut().shutdown().await?;
        log::debug!("[AirPlay] Closed connection to {}", self.device.host());
        Ok(())
    }
}
