//! Native result translation.
//!
//! Maps raw Win32 status values onto the engine's fault taxonomy. Error codes
//! reported by a failed overlapped request are classified through
//! [`ISSUE_FAILURES`]; supporting a new code means adding a table entry.

use crate::error::{InfrastructureFault, NativeCall, Operation, Result, SerialError};
use crate::native::{
    WaitOutcome, ERROR_BAD_COMMAND, ERROR_INVALID_HANDLE, ERROR_IO_PENDING, WAIT_ABANDONED,
    WAIT_FAILED, WAIT_OBJECT_0, WAIT_TIMEOUT,
};

/// What a failed overlapped request means for the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueDisposition {
    /// The request was queued; wait for its completion event.
    Pending,
    /// The device handle is gone.
    PortClosed,
    /// Any other failure.
    Failed,
}

/// Error codes with a dedicated meaning when an overlapped request fails.
pub const ISSUE_FAILURES: &[(u32, IssueDisposition)] = &[
    (ERROR_IO_PENDING, IssueDisposition::Pending),
    (ERROR_INVALID_HANDLE, IssueDisposition::PortClosed),
    (ERROR_BAD_COMMAND, IssueDisposition::PortClosed),
];

/// Classify the error code left behind by a failed write or comm-event wait.
pub fn issue_disposition(code: u32) -> IssueDisposition {
    ISSUE_FAILURES
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, disposition)| *disposition)
        .unwrap_or(IssueDisposition::Failed)
}

/// Turn a failed request into the error surfaced to the caller, or `None`
/// when the request is merely pending.
pub fn issue_failure(
    call: NativeCall,
    code: u32,
    port: &str,
    operation: Operation,
) -> Option<SerialError> {
    match issue_disposition(code) {
        IssueDisposition::Pending => None,
        IssueDisposition::PortClosed => Some(SerialError::closed_port(port, operation)),
        IssueDisposition::Failed => Some(call_failed(call, code)),
    }
}

/// Decode the raw return value of `WaitForSingleObject`.
pub fn wait_outcome(raw: u32) -> WaitOutcome {
    match raw {
        WAIT_OBJECT_0 => WaitOutcome::Signaled,
        WAIT_TIMEOUT => WaitOutcome::Timeout,
        WAIT_FAILED => WaitOutcome::Failed,
        WAIT_ABANDONED => WaitOutcome::Abandoned,
        other => WaitOutcome::Other(other),
    }
}

/// Map a wait outcome onto success or a fault.
///
/// `last_error` is only consulted for [`WaitOutcome::Failed`].
pub fn check_wait(
    outcome: WaitOutcome,
    operation: Operation,
    timeout_ms: u32,
    last_error: impl FnOnce() -> u32,
) -> Result<()> {
    match outcome {
        WaitOutcome::Signaled => Ok(()),
        WaitOutcome::Timeout => Err(SerialError::timeout(operation, u64::from(timeout_ms))),
        WaitOutcome::Failed => Err(InfrastructureFault::WaitFailed { code: last_error() }.into()),
        WaitOutcome::Abandoned => Err(InfrastructureFault::WaitAbandoned.into()),
        WaitOutcome::Other(value) => Err(InfrastructureFault::UnexpectedWaitValue { value }.into()),
    }
}

/// Require that exactly the requested number of bytes was transferred.
pub fn check_transferred(transferred: u32, expected: u32) -> Result<()> {
    if transferred == expected {
        Ok(())
    } else {
        Err(InfrastructureFault::TransferMismatch {
            transferred,
            expected,
        }
        .into())
    }
}

pub fn call_failed(call: NativeCall, code: u32) -> SerialError {
    InfrastructureFault::CallFailed { call, code }.into()
}

pub fn event_creation_failed(code: u32) -> SerialError {
    InfrastructureFault::EventCreation { code }.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_table() {
        assert_eq!(issue_disposition(ERROR_IO_PENDING), IssueDisposition::Pending);
        assert_eq!(
            issue_disposition(ERROR_INVALID_HANDLE),
            IssueDisposition::PortClosed
        );
        assert_eq!(issue_disposition(ERROR_BAD_COMMAND), IssueDisposition::PortClosed);
        assert_eq!(issue_disposition(12345), IssueDisposition::Failed);
    }

    #[test]
    fn test_issue_failure_messages() {
        assert!(issue_failure(NativeCall::WriteFile, ERROR_IO_PENDING, "COM1", Operation::Write)
            .is_none());

        let err = issue_failure(
            NativeCall::WriteFile,
            ERROR_INVALID_HANDLE,
            "COM1",
            Operation::Write,
        )
        .unwrap();
        assert_eq!(
            err.to_string(),
            "Port COM1 is closed! Write operation failed, because the handle is invalid"
        );

        let err = issue_failure(NativeCall::WaitCommEvent, 12345, "COM1", Operation::Read).unwrap();
        assert_eq!(
            err,
            SerialError::Infrastructure(InfrastructureFault::CallFailed {
                call: NativeCall::WaitCommEvent,
                code: 12345
            })
        );
    }

    #[test]
    fn test_wait_outcome_decoding() {
        assert_eq!(wait_outcome(0), WaitOutcome::Signaled);
        assert_eq!(wait_outcome(0x102), WaitOutcome::Timeout);
        assert_eq!(wait_outcome(0xFFFF_FFFF), WaitOutcome::Failed);
        assert_eq!(wait_outcome(0x80), WaitOutcome::Abandoned);
        assert_eq!(wait_outcome(12345), WaitOutcome::Other(12345));
    }

    #[test]
    fn test_check_wait() {
        assert!(check_wait(WaitOutcome::Signaled, Operation::Write, 2000, || 0).is_ok());

        let err = check_wait(WaitOutcome::Timeout, Operation::Write, 2000, || 0).unwrap_err();
        assert_eq!(err.to_string(), "Write operation timed out after 2000 milliseconds");

        let err = check_wait(WaitOutcome::Failed, Operation::Read, 2000, || 5).unwrap_err();
        assert!(err.to_string().contains("WAIT_FAILED"));
        assert_eq!(err.as_fault().and_then(InfrastructureFault::code), Some(5));

        let err = check_wait(WaitOutcome::Abandoned, Operation::Read, 2000, || {
            panic!("last error must not be read for WAIT_ABANDONED")
        })
        .unwrap_err();
        assert!(err.to_string().contains("WAIT_ABANDONED"));

        let err = check_wait(WaitOutcome::Other(12345), Operation::Write, 2000, || 0).unwrap_err();
        assert_eq!(
            err.as_fault(),
            Some(&InfrastructureFault::UnexpectedWaitValue { value: 12345 })
        );
    }

    #[test]
    fn test_check_transferred() {
        assert!(check_transferred(5, 5).is_ok());
        let err = check_transferred(4, 5).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Infrastructure fault: transferred count mismatch: 4 vs expected 5"
        );
    }
}
