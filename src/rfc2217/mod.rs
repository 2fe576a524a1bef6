//! RFC 2217 (Telnet COM-PORT-OPTION) command framing.
//!
//! Control commands are framed as `[44, code, payload...]` inside a Telnet
//! subnegotiation. Only the framing is provided here; the Telnet session
//! itself is out of scope.

pub mod commands;
mod encoder;
mod port;

pub use commands::{
    BaudrateControlCmd, CommandCode, ControlCmd, DataSizeControlCmd, ParityControlCmd,
    SignatureControlCmd, StopSizeControlCmd,
};
pub use encoder::{decode, encode, DecodedCommand};
pub use port::Rfc2217Port;

/// Telnet option code of COM-PORT-OPTION.
pub const COM_PORT_OPTION: u8 = 44;
