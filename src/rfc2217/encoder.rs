//! COM-PORT-OPTION subnegotiation framing.

use super::commands::{
    BaudrateControlCmd, CommandCode, ControlCmd, DataSizeControlCmd, ParityControlCmd,
    SignatureControlCmd, StopSizeControlCmd, SET_BAUDRATE_RESP, SET_DATASIZE_RESP,
    SET_PARITY_RESP, SET_STOPSIZE_RESP, SIGNATURE_RESP,
};
use super::COM_PORT_OPTION;
use crate::error::{Result, SerialError};
use tracing::debug;

/// Frame `cmd` as `[COM_PORT_OPTION, code, payload...]`.
///
/// The command code is written as reported; validation is the command's
/// business.
pub fn encode(cmd: Option<&dyn ControlCmd>) -> Result<Vec<u8>> {
    let cmd = cmd.ok_or_else(|| SerialError::configuration("Parameter >cmd< must not be null"))?;

    let mut frame = vec![COM_PORT_OPTION, cmd.command_code()];
    cmd.write_payload(&mut frame);
    Ok(frame)
}

/// A server response decoded by [`decode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedCommand {
    Signature(SignatureControlCmd),
    Baudrate(BaudrateControlCmd),
    DataSize(DataSizeControlCmd),
    Parity(ParityControlCmd),
    StopSize(StopSizeControlCmd),
}

impl DecodedCommand {
    pub fn as_control_cmd(&self) -> &dyn ControlCmd {
        match self {
            Self::Signature(cmd) => cmd,
            Self::Baudrate(cmd) => cmd,
            Self::DataSize(cmd) => cmd,
            Self::Parity(cmd) => cmd,
            Self::StopSize(cmd) => cmd,
        }
    }
}

/// Decode a server response frame produced by an access server.
pub fn decode(frame: &[u8]) -> Result<DecodedCommand> {
    let (option, code, payload) = match frame {
        [option, code, payload @ ..] => (*option, *code, payload),
        _ => {
            return Err(SerialError::configuration(format!(
                "Frame too short: {} bytes",
                frame.len()
            )))
        }
    };

    if option != COM_PORT_OPTION {
        return Err(SerialError::configuration(format!(
            "Expected COM-PORT-OPTION ({}), got option {}",
            COM_PORT_OPTION, option
        )));
    }

    let code = CommandCode::new(code)?;
    debug!("Decoding response code {}", code.value());
    match code.value() {
        SIGNATURE_RESP => SignatureControlCmd::decode(payload).map(DecodedCommand::Signature),
        SET_BAUDRATE_RESP => BaudrateControlCmd::decode(payload).map(DecodedCommand::Baudrate),
        SET_DATASIZE_RESP => DataSizeControlCmd::decode(payload).map(DecodedCommand::DataSize),
        SET_PARITY_RESP => ParityControlCmd::decode(payload).map(DecodedCommand::Parity),
        SET_STOPSIZE_RESP => StopSizeControlCmd::decode(payload).map(DecodedCommand::StopSize),
        other => Err(SerialError::configuration(format!(
            "Unsupported response code {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rfc2217::commands::MockControlCmd;
    use crate::settings::{Parity, StopBits};
    use proptest::prelude::*;

    #[test]
    fn test_encode_mock_command() {
        let mut cmd = MockControlCmd::new();
        cmd.expect_command_code().times(1).return_const(99u8);
        cmd.expect_write_payload()
            .times(1)
            .returning(|out| out.extend_from_slice(&[1, 2, 3]));

        let frame = encode(Some(&cmd)).unwrap();

        assert_eq!(frame, vec![44, 99, 1, 2, 3]);
    }

    #[test]
    fn test_encode_none() {
        let err = encode(None).unwrap_err();
        assert!(matches!(err, SerialError::Configuration(_)));
    }

    #[test]
    fn test_encode_signature() {
        let cmd = SignatureControlCmd::new("sensor");
        let frame = encode(Some(&cmd)).unwrap();
        assert_eq!(frame[..2], [44, 0]);
        assert_eq!(&frame[2..], b"sensor");
    }

    #[test]
    fn test_decode_responses() {
        assert_eq!(
            decode(&[44, 101, 0x00, 0x00, 0x25, 0x80]).unwrap(),
            DecodedCommand::Baudrate(BaudrateControlCmd::decode(&[0, 0, 0x25, 0x80]).unwrap())
        );

        match decode(&[44, 103, 3]).unwrap() {
            DecodedCommand::Parity(cmd) => assert_eq!(cmd.parity(), Parity::Even),
            other => panic!("unexpected {:?}", other),
        }

        match decode(&[44, 104, 3]).unwrap() {
            DecodedCommand::StopSize(cmd) => assert_eq!(cmd.stop_bits(), StopBits::OnePointFive),
            other => panic!("unexpected {:?}", other),
        }

        let decoded = decode(b"\x2c\x64access server").unwrap();
        assert_eq!(decoded.as_control_cmd().command_code(), 100);
        match decoded {
            DecodedCommand::Signature(cmd) => assert_eq!(cmd.signature(), "access server"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_malformed_frames() {
        assert!(decode(&[44]).is_err());
        assert!(decode(&[43, 100]).is_err());
        assert!(decode(&[44, 50]).is_err());
        // Requests are not responses.
        assert!(decode(&[44, 1, 0, 0, 0, 0]).is_err());
        // Valid code without a decoder.
        assert!(decode(&[44, 112]).is_err());
    }

    proptest! {
        #[test]
        fn test_baudrate_frame_decodes(baudrate in any::<u32>()) {
            let mut frame = encode(Some(&BaudrateControlCmd::new(baudrate))).unwrap();
            frame[1] += 100;
            match decode(&frame).unwrap() {
                DecodedCommand::Baudrate(cmd) => prop_assert_eq!(cmd.baudrate(), baudrate),
                other => prop_assert!(false, "unexpected {:?}", other),
            }
        }

        #[test]
        fn test_frame_layout(code in any::<u8>(), payload in proptest::collection::vec(any::<u8>(), 0..32)) {
            let mut cmd = MockControlCmd::new();
            cmd.expect_command_code().return_const(code);
            let written = payload.clone();
            cmd.expect_write_payload()
                .returning(move |out| out.extend_from_slice(&written));

            let frame = encode(Some(&cmd)).unwrap();

            prop_assert_eq!(frame.len(), payload.len() + 2);
            prop_assert_eq!(frame[0], 44);
            prop_assert_eq!(frame[1], code);
            prop_assert_eq!(&frame[2..], &payload[..]);
        }
    }
}
