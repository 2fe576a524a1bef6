//! Device control block mapping.

use super::{FlowControl, Parity, SerialPortSettings, StopBits};
use serde::Serialize;

pub const NOPARITY: u8 = 0;
pub const ODDPARITY: u8 = 1;
pub const EVENPARITY: u8 = 2;
pub const MARKPARITY: u8 = 3;
pub const SPACEPARITY: u8 = 4;

pub const ONESTOPBIT: u8 = 0;
pub const ONE5STOPBITS: u8 = 1;
pub const TWOSTOPBITS: u8 = 2;

pub const RTS_CONTROL_ENABLE: u8 = 1;
pub const RTS_CONTROL_HANDSHAKE: u8 = 2;

/// Platform-neutral image of the Win32 `DCB` fields the engine controls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Dcb {
    pub baud_rate: u32,
    pub byte_size: u8,
    pub parity: u8,
    pub stop_bits: u8,
    pub rts_control: u8,
    pub outx_cts_flow: bool,
    pub outx_dsr_flow: bool,
    pub dsr_sensitivity: bool,
    pub tx_continue_on_xoff: bool,
    pub out_x: bool,
    pub in_x: bool,
    pub error_char: bool,
    pub null: bool,
    pub abort_on_error: bool,
    pub xon_lim: u16,
    pub xoff_lim: u16,
    pub xon_char: u8,
    pub xoff_char: u8,
}

impl Dcb {
    /// Map `settings` onto a zeroed control block.
    pub fn from_settings(settings: &SerialPortSettings) -> Self {
        let mut dcb = Self::default();
        DcbConfigurer.configure(&mut dcb, settings);
        dcb
    }
}

/// Writes serial settings into a [`Dcb`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DcbConfigurer;

impl DcbConfigurer {
    pub fn configure(&self, dcb: &mut Dcb, settings: &SerialPortSettings) {
        dcb.baud_rate = settings.bauds();
        dcb.byte_size = settings.data_bits().bits();
        dcb.stop_bits = match settings.stop_bits() {
            StopBits::One => ONESTOPBIT,
            StopBits::OnePointFive => ONE5STOPBITS,
            StopBits::Two => TWOSTOPBITS,
        };
        dcb.parity = match settings.parity() {
            Parity::None => NOPARITY,
            Parity::Odd => ODDPARITY,
            Parity::Even => EVENPARITY,
            Parity::Mark => MARKPARITY,
            Parity::Space => SPACEPARITY,
        };
        configure_flow_control(dcb, settings.flow_control());
        configure_fixed_values(dcb);
    }
}

fn configure_flow_control(dcb: &mut Dcb, flow_control: FlowControl) {
    dcb.rts_control = RTS_CONTROL_ENABLE;
    dcb.outx_cts_flow = false;
    dcb.out_x = false;
    dcb.in_x = false;

    match flow_control {
        FlowControl::None => {}
        FlowControl::RtsCtsIn => dcb.rts_control = RTS_CONTROL_HANDSHAKE,
        FlowControl::RtsCtsOut => dcb.outx_cts_flow = true,
        FlowControl::RtsCtsInOut => {
            dcb.rts_control = RTS_CONTROL_HANDSHAKE;
            dcb.outx_cts_flow = true;
        }
        FlowControl::XonXoffIn => dcb.in_x = true,
        FlowControl::XonXoffOut => dcb.out_x = true,
        FlowControl::XonXoffInOut => {
            dcb.in_x = true;
            dcb.out_x = true;
        }
    }
}

/// Leaves `rts_control`, `outx_cts_flow`, `out_x` and `in_x` alone; those
/// belong to the flow-control mapping above.
fn configure_fixed_values(dcb: &mut Dcb) {
    dcb.outx_dsr_flow = false;
    dcb.dsr_sensitivity = false;
    dcb.tx_continue_on_xoff = true;
    dcb.error_char = false;
    dcb.null = false;
    dcb.abort_on_error = false;
    dcb.xon_lim = 2048;
    dcb.xoff_lim = 512;
    // DC1 / DC3
    dcb.xon_char = 17;
    dcb.xoff_char = 19;
}
