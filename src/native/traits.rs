//! The native device boundary.
//!
//! Defines the primitive operations the engine drives (`NativeDeviceApi`)
//! together with the opaque handle, pointer and wait-outcome types that cross
//! it. Both the Win32 backend and the in-memory fake implement this trait.

use std::fmt;

/// `INVALID_HANDLE_VALUE` as returned by `CreateFile`.
pub const INVALID_HANDLE_VALUE: isize = -1;

/// The handle is not (or no longer) valid.
pub const ERROR_INVALID_HANDLE: u32 = 6;
/// Reported by USB-serial drivers once the adapter has been unplugged.
pub const ERROR_BAD_COMMAND: u32 = 22;
/// Overlapped I/O operation is in progress.
pub const ERROR_IO_PENDING: u32 = 997;

pub const WAIT_OBJECT_0: u32 = 0x0000_0000;
pub const WAIT_ABANDONED: u32 = 0x0000_0080;
pub const WAIT_TIMEOUT: u32 = 0x0000_0102;
pub const WAIT_FAILED: u32 = 0xFFFF_FFFF;

/// A character was received and placed in the input buffer.
pub const EV_RXCHAR: u32 = 0x0001;

/// An opaque native handle value (device, event).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle(isize);

impl RawHandle {
    pub const NULL: RawHandle = RawHandle(0);
    pub const INVALID: RawHandle = RawHandle(INVALID_HANDLE_VALUE);

    pub const fn new(raw: isize) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> isize {
        self.0
    }

    /// Whether this value can refer to an open object.
    ///
    /// Win32 signals failure with `NULL` for events and with
    /// `INVALID_HANDLE_VALUE` for files, so both are rejected.
    pub const fn is_valid(self) -> bool {
        self.0 != 0 && self.0 != INVALID_HANDLE_VALUE
    }
}

impl fmt::Display for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Exclusive ownership token for an open device handle.
///
/// Deliberately not `Clone`: moving it into a
/// [`SerialConnection`](crate::connection::SerialConnection) makes the
/// connection its only owner, so the handle cannot be closed twice.
#[derive(Debug, PartialEq, Eq)]
pub struct DeviceHandle(RawHandle);

impl DeviceHandle {
    pub fn new(raw: RawHandle) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> RawHandle {
        self.0
    }
}

/// Address of a native scratch buffer handed out by [`NativeDeviceApi::allocate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativePtr(usize);

impl NativePtr {
    pub const NULL: NativePtr = NativePtr(0);

    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    pub const fn addr(self) -> usize {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// The kinds of scratch buffer the engine asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeClass {
    /// An `OVERLAPPED` async descriptor.
    Overlapped,
    /// A `DWORD` receiving a byte count or an event mask.
    Dword,
}

impl SizeClass {
    pub fn name(self) -> &'static str {
        match self {
            Self::Overlapped => "OVERLAPPED",
            Self::Dword => "DWORD",
        }
    }
}

/// Result of waiting on a completion event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Signaled,
    Timeout,
    Failed,
    Abandoned,
    /// A value the wait primitive does not document.
    Other(u32),
}

/// Primitive native operations driven by the overlapped engine.
///
/// Boolean returns follow Win32 conventions: `false` means the caller must
/// consult [`last_error_code`](NativeDeviceApi::last_error_code). The code
/// must be preserved per thread by the implementation, since it is read after
/// the failing call returns.
#[cfg_attr(test, mockall::automock)]
pub trait NativeDeviceApi {
    /// Create an event object. Returns an invalid handle on failure.
    fn create_event(&self, manual_reset: bool, initial_state: bool) -> RawHandle;

    /// Bind `event` to the async descriptor so completion signals it.
    fn attach_event(&self, descriptor: NativePtr, event: RawHandle);

    /// Issue an overlapped write. `true` means it completed synchronously.
    fn write_file(
        &self,
        handle: RawHandle,
        data: &[u8],
        transferred: NativePtr,
        descriptor: NativePtr,
    ) -> bool;

    /// Arm an overlapped wait for a communication event. `true` means an
    /// event was already pending and `event_mask` has been written.
    fn wait_comm_event(&self, handle: RawHandle, event_mask: NativePtr, descriptor: NativePtr)
        -> bool;

    /// Wait for `event` to become signaled, for at most `timeout_ms`.
    fn wait_for_completion(&self, event: RawHandle, timeout_ms: u32) -> WaitOutcome;

    /// Retrieve the result of an overlapped operation.
    fn query_overlapped_result(
        &self,
        handle: RawHandle,
        descriptor: NativePtr,
        transferred: NativePtr,
        blocking: bool,
    ) -> bool;

    fn close_handle(&self, handle: RawHandle) -> bool;

    fn reset_event(&self, event: RawHandle) -> bool;

    /// Allocate a scratch buffer. Returns [`NativePtr::NULL`] on failure.
    fn allocate(&self, size: SizeClass) -> NativePtr;

    fn free(&self, ptr: NativePtr);

    /// Read the `DWORD` stored in a [`SizeClass::Dword`] buffer.
    fn read_dword(&self, ptr: NativePtr) -> u32;

    /// The error code preserved from the last failing call on this thread.
    fn last_error_code(&self) -> u32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_validity() {
        assert!(RawHandle::new(2).is_valid());
        assert!(!RawHandle::NULL.is_valid());
        assert!(!RawHandle::INVALID.is_valid());
        assert_eq!(RawHandle::new(255).to_string(), "0xff");
    }

    #[test]
    fn test_device_handle_exposes_raw() {
        let handle = DeviceHandle::new(RawHandle::new(7));
        assert_eq!(handle.raw().raw(), 7);
    }

    #[test]
    fn test_native_ptr_null() {
        assert!(NativePtr::NULL.is_null());
        assert!(!NativePtr::new(0x1000).is_null());
        assert_eq!(SizeClass::Dword.name(), "DWORD");
    }
}
