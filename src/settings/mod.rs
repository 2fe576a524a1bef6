//! Serial line settings.
//!
//! `SerialPortSettings` is the value object a port is opened with. It is
//! built through [`SerialPortSettingsBuilder`] and maps onto a device control
//! block through [`DcbConfigurer`].

mod dcb;

pub use dcb::{Dcb, DcbConfigurer};

use crate::error::{Result, SerialError};
use serde::{Deserialize, Serialize};

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
    Nine,
}

impl DataBits {
    pub fn bits(self) -> u8 {
        match self {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
            DataBits::Nine => 9,
        }
    }
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopBits {
    One,
    OnePointFive,
    Two,
}

/// Parity checking modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    None,
    Odd,
    Even,
    Mark,
    Space,
}

/// Flow control modes.
///
/// `In` controls the receiving side, `Out` the sending side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowControl {
    None,
    RtsCtsIn,
    RtsCtsOut,
    RtsCtsInOut,
    XonXoffIn,
    XonXoffOut,
    XonXoffInOut,
}

/// Configuration of a serial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSettings")]
pub struct SerialPortSettings {
    bauds: u32,
    data_bits: DataBits,
    stop_bits: StopBits,
    parity: Parity,
    flow_control: FlowControl,
}

impl Default for SerialPortSettings {
    /// 9600 baud, 8N1, no flow control.
    fn default() -> Self {
        Self {
            bauds: 9600,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::None,
        }
    }
}

impl SerialPortSettings {
    /// Start building settings for `bauds`, with 8N1 and no flow control.
    pub fn builder(bauds: u32) -> SerialPortSettingsBuilder {
        SerialPortSettingsBuilder {
            settings: Self {
                bauds,
                ..Self::default()
            },
        }
    }

    /// A builder starting from these settings.
    pub fn to_builder(self) -> SerialPortSettingsBuilder {
        SerialPortSettingsBuilder { settings: self }
    }

    pub fn bauds(&self) -> u32 {
        self.bauds
    }

    pub fn data_bits(&self) -> DataBits {
        self.data_bits
    }

    pub fn stop_bits(&self) -> StopBits {
        self.stop_bits
    }

    pub fn parity(&self) -> Parity {
        self.parity
    }

    pub fn flow_control(&self) -> FlowControl {
        self.flow_control
    }
}

/// Builder for [`SerialPortSettings`].
#[derive(Debug, Clone)]
pub struct SerialPortSettingsBuilder {
    settings: SerialPortSettings,
}

impl SerialPortSettingsBuilder {
    pub fn data_bits(mut self, data_bits: DataBits) -> Self {
        self.settings.data_bits = data_bits;
        self
    }

    pub fn stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.settings.stop_bits = stop_bits;
        self
    }

    pub fn parity(mut self, parity: Parity) -> Self {
        self.settings.parity = parity;
        self
    }

    pub fn flow_control(mut self, flow_control: FlowControl) -> Self {
        self.settings.flow_control = flow_control;
        self
    }

    pub fn bauds(mut self, bauds: u32) -> Self {
        self.settings.bauds = bauds;
        self
    }

    /// Validate and finish. A zero baud rate is a configuration error.
    pub fn build(self) -> Result<SerialPortSettings> {
        if self.settings.bauds == 0 {
            return Err(SerialError::configuration(
                "Argument >bauds< must be greater than 0",
            ));
        }
        Ok(self.settings)
    }
}

/// Unvalidated on-disk form; deserialization goes through the builder.
#[derive(Deserialize)]
#[serde(default)]
struct RawSettings {
    bauds: u32,
    data_bits: DataBits,
    stop_bits: StopBits,
    parity: Parity,
    flow_control: FlowControl,
}

impl Default for RawSettings {
    fn default() -> Self {
        let defaults = SerialPortSettings::default();
        Self {
            bauds: defaults.bauds,
            data_bits: defaults.data_bits,
            stop_bits: defaults.stop_bits,
            parity: defaults.parity,
            flow_control: defaults.flow_control,
        }
    }
}

impl TryFrom<RawSettings> for SerialPortSettings {
    type Error = SerialError;

    fn try_from(raw: RawSettings) -> Result<Self> {
        SerialPortSettings::builder(raw.bauds)
            .data_bits(raw.data_bits)
            .stop_bits(raw.stop_bits)
            .parity(raw.parity)
            .flow_control(raw.flow_control)
            .build()
    }
}
