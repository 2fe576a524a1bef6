//! Overlapped serial I/O engine.
//!
//! This library drives a serial device through Win32 overlapped I/O with a
//! bounded wait per operation and deterministic release of every native
//! resource an operation acquires.
//!
//! # Modules
//!
//! - `connection`: `SerialConnection` write/read/close state machine
//! - `overlapped`: scoped per-operation native scratch resources
//! - `future`: blocking result hand-off and worker-thread helper
//! - `translate`: native status codes to the error taxonomy
//! - `native`: the native device boundary, Win32 backend and test fake
//! - `settings`: serial line settings and device control block mapping
//! - `rfc2217`: COM-PORT-OPTION command framing
//! - `config`: Configuration management with TOML support
//! - `logging`: tracing subscriber setup
//! - `error`: Unified error handling

pub mod config;
pub mod connection;
pub mod error;
pub mod future;
pub mod logging;
pub mod native;
pub mod overlapped;
pub mod rfc2217;
pub mod settings;
pub mod translate;

// Re-export commonly used types for convenience
pub use connection::{SerialConnection, COMPLETION_TIMEOUT_MS};
pub use error::{InfrastructureFault, NativeCall, Operation, Result, SerialError};
pub use future::{spawn_blocking, BlockingResultFuture, Completer};
pub use native::{DeviceHandle, NativeDeviceApi, RawHandle};
pub use overlapped::OverlappedOperationContext;
pub use settings::{
    DataBits, Dcb, DcbConfigurer, FlowControl, Parity, SerialPortSettings, StopBits,
};

#[cfg(windows)]
pub use native::Win32DeviceApi;
