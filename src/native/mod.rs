//! Native device layer.
//!
//! Provides the `NativeDeviceApi` boundary the engine drives, a Win32
//! implementation and a scriptable in-memory fake for tests.

pub mod fake;
pub mod traits;

#[cfg(windows)]
pub mod win32;

pub use fake::{FakeCall, FakeDeviceApi, IssueBehavior, WaitGate};
pub use traits::*;

#[cfg(windows)]
pub use win32::Win32DeviceApi;
