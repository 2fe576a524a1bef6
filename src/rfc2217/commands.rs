//! COM-PORT-OPTION control commands.
//!
//! Each command carries its RFC 2217 code: client requests use `[0..12]`,
//! server responses the same code plus 100.

use crate::error::{Result, SerialError};
use crate::settings::{DataBits, Parity, StopBits};

pub const SIGNATURE_REQ: u8 = 0;
pub const SET_BAUDRATE_REQ: u8 = 1;
pub const SET_DATASIZE_REQ: u8 = 2;
pub const SET_PARITY_REQ: u8 = 3;
pub const SET_STOPSIZE_REQ: u8 = 4;

/// Offset between a request code and its response code.
pub const RESPONSE_OFFSET: u8 = 100;

pub const SIGNATURE_RESP: u8 = SIGNATURE_REQ + RESPONSE_OFFSET;
pub const SET_BAUDRATE_RESP: u8 = SET_BAUDRATE_REQ + RESPONSE_OFFSET;
pub const SET_DATASIZE_RESP: u8 = SET_DATASIZE_REQ + RESPONSE_OFFSET;
pub const SET_PARITY_RESP: u8 = SET_PARITY_REQ + RESPONSE_OFFSET;
pub const SET_STOPSIZE_RESP: u8 = SET_STOPSIZE_REQ + RESPONSE_OFFSET;

/// A control command that can be framed by [`encode`](super::encode).
#[cfg_attr(test, mockall::automock)]
pub trait ControlCmd {
    /// The RFC 2217 code of this command.
    fn command_code(&self) -> u8;

    /// Append the command payload to `out`.
    fn write_payload(&self, out: &mut Vec<u8>);
}

/// A validated RFC 2217 command code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandCode(u8);

impl CommandCode {
    /// Accepts `[0..12]` and `[100..112]`.
    pub fn new(code: u8) -> Result<Self> {
        match code {
            0..=12 | 100..=112 => Ok(Self(code)),
            _ => Err(SerialError::configuration(format!(
                "The command code must be in the range [0..12] or [100..112]! Got: {}",
                code
            ))),
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn is_response(self) -> bool {
        self.0 >= RESPONSE_OFFSET
    }

    /// The request code this code belongs to.
    pub fn request(self) -> u8 {
        if self.is_response() {
            self.0 - RESPONSE_OFFSET
        } else {
            self.0
        }
    }
}

/// Exchanges product signatures between client and access server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureControlCmd {
    code: CommandCode,
    signature: String,
}

impl SignatureControlCmd {
    pub fn new(signature: impl Into<String>) -> Self {
        Self {
            code: CommandCode(SIGNATURE_REQ),
            signature: signature.into(),
        }
    }

    pub(crate) fn decode(payload: &[u8]) -> Result<Self> {
        let signature = String::from_utf8(payload.to_vec())
            .map_err(|_| SerialError::configuration("Signature is not valid UTF-8"))?;
        Ok(Self {
            code: CommandCode(SIGNATURE_RESP),
            signature,
        })
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }
}

impl ControlCmd for SignatureControlCmd {
    fn command_code(&self) -> u8 {
        self.code.value()
    }

    fn write_payload(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.signature.as_bytes());
    }
}

/// Sets the line speed; zero asks the server for its current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaudrateControlCmd {
    code: CommandCode,
    baudrate: u32,
}

impl BaudrateControlCmd {
    pub fn new(baudrate: u32) -> Self {
        Self {
            code: CommandCode(SET_BAUDRATE_REQ),
            baudrate,
        }
    }

    pub(crate) fn decode(payload: &[u8]) -> Result<Self> {
        let bytes: [u8; 4] = payload.try_into().map_err(|_| {
            SerialError::configuration(format!(
                "SET-BAUDRATE payload must be 4 bytes, got {}",
                payload.len()
            ))
        })?;
        Ok(Self {
            code: CommandCode(SET_BAUDRATE_RESP),
            baudrate: u32::from_be_bytes(bytes),
        })
    }

    pub fn baudrate(&self) -> u32 {
        self.baudrate
    }
}

impl ControlCmd for BaudrateControlCmd {
    fn command_code(&self) -> u8 {
        self.code.value()
    }

    fn write_payload(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.baudrate.to_be_bytes());
    }
}

fn single_byte(name: &str, payload: &[u8]) -> Result<u8> {
    match payload {
        [value] => Ok(*value),
        _ => Err(SerialError::configuration(format!(
            "{} payload must be 1 byte, got {}",
            name,
            payload.len()
        ))),
    }
}

/// Sets the number of data bits. RFC 2217 only knows 5 to 8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataSizeControlCmd {
    code: CommandCode,
    data_bits: DataBits,
}

impl DataSizeControlCmd {
    pub fn new(data_bits: DataBits) -> Result<Self> {
        if data_bits == DataBits::Nine {
            return Err(SerialError::configuration(
                "RFC 2217 does not support 9 data bits",
            ));
        }
        Ok(Self {
            code: CommandCode(SET_DATASIZE_REQ),
            data_bits,
        })
    }

    pub(crate) fn decode(payload: &[u8]) -> Result<Self> {
        let data_bits = match single_byte("SET-DATASIZE", payload)? {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            8 => DataBits::Eight,
            other => {
                return Err(SerialError::configuration(format!(
                    "Unknown data size {}",
                    other
                )))
            }
        };
        Ok(Self {
            code: CommandCode(SET_DATASIZE_RESP),
            data_bits,
        })
    }

    pub fn data_bits(&self) -> DataBits {
        self.data_bits
    }
}

impl ControlCmd for DataSizeControlCmd {
    fn command_code(&self) -> u8 {
        self.code.value()
    }

    fn write_payload(&self, out: &mut Vec<u8>) {
        out.push(self.data_bits.bits());
    }
}

/// Sets the parity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParityControlCmd {
    code: CommandCode,
    parity: Parity,
}

impl ParityControlCmd {
    pub fn new(parity: Parity) -> Self {
        Self {
            code: CommandCode(SET_PARITY_REQ),
            parity,
        }
    }

    pub(crate) fn decode(payload: &[u8]) -> Result<Self> {
        let parity = match single_byte("SET-PARITY", payload)? {
            1 => Parity::None,
            2 => Parity::Odd,
            3 => Parity::Even,
            4 => Parity::Mark,
            5 => Parity::Space,
            other => {
                return Err(SerialError::configuration(format!(
                    "Unknown parity {}",
                    other
                )))
            }
        };
        Ok(Self {
            code: CommandCode(SET_PARITY_RESP),
            parity,
        })
    }

    pub fn parity(&self) -> Parity {
        self.parity
    }
}

impl ControlCmd for ParityControlCmd {
    fn command_code(&self) -> u8 {
        self.code.value()
    }

    fn write_payload(&self, out: &mut Vec<u8>) {
        out.push(match self.parity {
            Parity::None => 1,
            Parity::Odd => 2,
            Parity::Even => 3,
            Parity::Mark => 4,
            Parity::Space => 5,
        });
    }
}

/// Sets the number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopSizeControlCmd {
    code: CommandCode,
    stop_bits: StopBits,
}

impl StopSizeControlCmd {
    pub fn new(stop_bits: StopBits) -> Self {
        Self {
            code: CommandCode(SET_STOPSIZE_REQ),
            stop_bits,
        }
    }

    pub(crate) fn decode(payload: &[u8]) -> Result<Self> {
        let stop_bits = match single_byte("SET-STOPSIZE", payload)? {
            1 => StopBits::One,
            2 => StopBits::Two,
            3 => StopBits::OnePointFive,
            other => {
                return Err(SerialError::configuration(format!(
                    "Unknown stop size {}",
                    other
                )))
            }
        };
        Ok(Self {
            code: CommandCode(SET_STOPSIZE_RESP),
            stop_bits,
        })
    }

    pub fn stop_bits(&self) -> StopBits {
        self.stop_bits
    }
}

impl ControlCmd for StopSizeControlCmd {
    fn command_code(&self) -> u8 {
        self.code.value()
    }

    fn write_payload(&self, out: &mut Vec<u8>) {
        out.push(match self.stop_bits {
            StopBits::One => 1,
            StopBits::Two => 2,
            StopBits::OnePointFive => 3,
        });
    }
}
