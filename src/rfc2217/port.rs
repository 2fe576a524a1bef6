//! Ports tunneled through an RFC 2217 access server.

use super::commands::{
    BaudrateControlCmd, ControlCmd, DataSizeControlCmd, ParityControlCmd, SignatureControlCmd,
    StopSizeControlCmd,
};
use super::encoder::encode;
use crate::error::{Result, SerialError};
use crate::settings::SerialPortSettings;
use std::net::SocketAddr;

/// A serial port reached through the access server at `host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rfc2217Port {
    host: String,
    port: u16,
}

impl Rfc2217Port {
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self> {
        let host = host.into();
        if host.trim().is_empty() {
            return Err(SerialError::configuration(
                "Parameter >host< must not be empty",
            ));
        }
        Ok(Self { host, port })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `RFC2217@<host>:<port>`, e.g. `RFC2217@192.168.0.15:5588`.
    pub fn port_name(&self) -> String {
        format!("RFC2217@{}:{}", self.host, self.port)
    }

    /// Frames announcing `signature` and requesting `settings` from the
    /// access server, in the order a client sends them.
    pub fn negotiation_frames(
        &self,
        signature: &str,
        settings: &SerialPortSettings,
    ) -> Result<Vec<Vec<u8>>> {
        let data_size = DataSizeControlCmd::new(settings.data_bits())?;
        let commands: [&dyn ControlCmd; 5] = [
            &SignatureControlCmd::new(signature),
            &BaudrateControlCmd::new(settings.bauds()),
            &data_size,
            &ParityControlCmd::new(settings.parity()),
            &StopSizeControlCmd::new(settings.stop_bits()),
        ];
        commands.into_iter().map(|cmd| encode(Some(cmd))).collect()
    }
}

impl From<SocketAddr> for Rfc2217Port {
    fn from(addr: SocketAddr) -> Self {
        Self {
            host: addr.ip().to_string(),
            port: addr.port(),
        }
    }
}
