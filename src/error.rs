//! Error taxonomy for the overlapped serial engine.
//!
//! Every operation surfaces exactly one of four kinds: an invalid argument
//! (`Configuration`), a native primitive breaking its contract
//! (`Infrastructure`), an elapsed deadline (`Timeout`) or a device that went
//! away mid-operation (`ClosedPort`).

use std::fmt;
use thiserror::Error;

/// A specialized `Result` type for engine operations.
pub type Result<T> = std::result::Result<T, SerialError>;

/// The operation a fault was raised from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Write,
    Read,
    Close,
    /// Waiting on a [`BlockingResultFuture`](crate::future::BlockingResultFuture).
    Get,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Write => "Write",
            Self::Read => "Read",
            Self::Close => "Close",
            Self::Get => "Get",
        };
        f.write_str(name)
    }
}

/// The native primitive that reported a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeCall {
    CreateFile,
    GetCommState,
    SetCommState,
    SetCommMask,
    WriteFile,
    WaitCommEvent,
    GetOverlappedResult,
    ResetEvent,
    CloseHandle,
}

impl fmt::Display for NativeCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CreateFile => "CreateFile",
            Self::GetCommState => "GetCommState",
            Self::SetCommState => "SetCommState",
            Self::SetCommMask => "SetCommMask",
            Self::WriteFile => "WriteFile",
            Self::WaitCommEvent => "WaitCommEvent",
            Self::GetOverlappedResult => "GetOverlappedResult",
            Self::ResetEvent => "ResetEvent",
            Self::CloseHandle => "CloseHandle",
        };
        f.write_str(name)
    }
}

/// A native primitive returned a value outside its documented contract.
///
/// These are always fatal to the operation that observed them and are never
/// retried by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InfrastructureFault {
    /// The completion event could not be created.
    #[error("event creation failed (error code {code})")]
    EventCreation { code: u32 },

    /// A scratch buffer could not be allocated.
    #[error("allocation of {size} scratch buffer failed")]
    Allocation { size: &'static str },

    /// A native call failed with a status that has no dedicated meaning.
    #[error("{call} failed unexpectedly (error code {code})")]
    CallFailed { call: NativeCall, code: u32 },

    /// Waiting on the completion event returned `WAIT_FAILED`.
    #[error("wait for completion returned WAIT_FAILED (error code {code})")]
    WaitFailed { code: u32 },

    /// Waiting on the completion event returned `WAIT_ABANDONED`.
    #[error("wait for completion returned WAIT_ABANDONED")]
    WaitAbandoned,

    /// Waiting on the completion event returned an undocumented value.
    #[error("wait for completion returned unexpected value {value:#x}")]
    UnexpectedWaitValue { value: u32 },

    /// Fewer (or more) bytes were transferred than requested.
    #[error("transferred count mismatch: {transferred} vs expected {expected}")]
    TransferMismatch { transferred: u32, expected: u32 },

    /// A communication event was observed on the read path.
    #[error("unexpected comm event (mask {mask:#06x})")]
    UnexpectedCommEvent { mask: u32 },

    /// A pending future was resolved twice.
    #[error("a value is already set")]
    AlreadyResolved,

    /// The producer of a pending future went away without resolving it.
    #[error("producer dropped without resolving the future")]
    ProducerDropped,
}

impl InfrastructureFault {
    /// The native error code carried by this fault, if any.
    pub fn code(&self) -> Option<u32> {
        match self {
            Self::EventCreation { code }
            | Self::CallFailed { code, .. }
            | Self::WaitFailed { code } => Some(*code),
            _ => None,
        }
    }
}

/// Errors raised by the serial engine and its collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerialError {
    /// An invalid argument was supplied; raised before any native call.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A native primitive broke its contract.
    #[error("Infrastructure fault: {0}")]
    Infrastructure(#[from] InfrastructureFault),

    /// A bounded wait exceeded its deadline.
    #[error("{operation} operation timed out after {timeout_ms} milliseconds")]
    Timeout { operation: Operation, timeout_ms: u64 },

    /// The device handle became invalid while an operation was in flight.
    #[error("Port {port} is closed! {operation} operation failed, because the handle is invalid")]
    ClosedPort { port: String, operation: Operation },
}

impl SerialError {
    /// Create a Configuration error from a message.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a Timeout error for an operation.
    pub fn timeout(operation: Operation, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation,
            timeout_ms,
        }
    }

    /// Create a ClosedPort error naming the port.
    pub fn closed_port(port: impl Into<String>, operation: Operation) -> Self {
        Self::ClosedPort {
            port: port.into(),
            operation,
        }
    }

    /// The infrastructure fault behind this error, if it is one.
    pub fn as_fault(&self) -> Option<&InfrastructureFault> {
        match self {
            Self::Infrastructure(fault) => Some(fault),
            _ => None,
        }
    }

    /// Whether the caller may reasonably retry the whole operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
