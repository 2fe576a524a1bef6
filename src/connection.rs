//! Overlapped serial connection.
//!
//! A `SerialConnection` owns an opened device handle and drives one native
//! overlapped request per call: it issues the request, waits a bounded time
//! for the completion event and validates the outcome. All scratch state
//! lives in an [`OverlappedOperationContext`], so every exit path releases
//! the event and buffers it acquired.
//!
//! A write and a read may be in flight at the same time: each call takes
//! `&self` and works on its own context. Two concurrent writes or two
//! concurrent reads on one connection are not supported and must be
//! serialized by the caller.

use crate::error::{InfrastructureFault, NativeCall, Operation, Result, SerialError};
use crate::native::{DeviceHandle, NativeDeviceApi, NativePtr, RawHandle};
use crate::overlapped::OverlappedOperationContext;
use crate::translate;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

/// Deadline for a pending write or comm-event wait.
pub const COMPLETION_TIMEOUT_MS: u32 = 2000;

/// A serial port opened for overlapped I/O.
pub struct SerialConnection<A: NativeDeviceApi> {
    api: A,
    port_name: String,
    /// `None` once closed. Only held long enough to read or take the handle.
    handle: Mutex<Option<DeviceHandle>>,
}

impl<A: NativeDeviceApi> SerialConnection<A> {
    /// Wrap an already opened device handle.
    ///
    /// A null or `INVALID_HANDLE_VALUE` handle is a configuration error.
    pub fn new(port_name: impl Into<String>, api: A, handle: DeviceHandle) -> Result<Self> {
        let port_name = port_name.into();
        if !handle.raw().is_valid() {
            return Err(SerialError::configuration(format!(
                "Invalid handle {} for port {}",
                handle.raw(),
                port_name
            )));
        }

        debug!("Connection to {} uses handle {}", port_name, handle.raw());
        Ok(Self {
            api,
            port_name,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn is_open(&self) -> bool {
        self.handle.lock().is_some()
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Write `data` and wait until the device accepted all of it.
    ///
    /// # Errors
    /// - `Configuration` if the connection is closed or `data` exceeds 4 GiB
    /// - `ClosedPort` if the device handle became invalid
    /// - `Timeout` if the write did not complete within 2000 ms
    /// - `Infrastructure` for any native failure or a short transfer
    pub fn write(&self, data: &[u8]) -> Result<()> {
        let handle = self.open_handle(Operation::Write)?;
        let expected = u32::try_from(data.len()).map_err(|_| {
            SerialError::configuration(format!(
                "Write of {} bytes exceeds the native transfer limit",
                data.len()
            ))
        })?;

        let mut context = OverlappedOperationContext::new(&self.api, 1)?;
        let event = context.create_event()?;
        let transferred = context.transfer_count(0);

        debug!("Writing {} bytes to {}", expected, self.port_name);
        if !self
            .api
            .write_file(handle, data, transferred, context.descriptor())
        {
            self.complete_pending(
                handle,
                &context,
                event,
                NativeCall::WriteFile,
                Operation::Write,
                transferred,
            )?;
        }

        translate::check_transferred(self.api.read_dword(transferred), expected)
    }

    /// Wait for the next comm event on the port.
    ///
    /// The native wait is armed for received characters. An observed event
    /// is reported as [`InfrastructureFault::UnexpectedCommEvent`] carrying
    /// the event mask; payload retrieval is not performed.
    pub fn read(&self) -> Result<Vec<u8>> {
        let handle = self.open_handle(Operation::Read)?;

        let mut context = OverlappedOperationContext::new(&self.api, 2)?;
        let event = context.create_event()?;
        let event_mask = context.transfer_count(0);
        let transferred = context.transfer_count(1);

        if !self.api.reset_event(event) {
            return Err(translate::call_failed(
                NativeCall::ResetEvent,
                self.api.last_error_code(),
            ));
        }

        debug!("Waiting for comm event on {}", self.port_name);
        if !self
            .api
            .wait_comm_event(handle, event_mask, context.descriptor())
        {
            self.complete_pending(
                handle,
                &context,
                event,
                NativeCall::WaitCommEvent,
                Operation::Read,
                transferred,
            )?;
        }

        let mask = self.api.read_dword(event_mask);
        Err(InfrastructureFault::UnexpectedCommEvent { mask }.into())
    }

    /// Close the device handle.
    ///
    /// The native close is attempted once; the connection is closed afterwards
    /// whether or not it succeeded. Closing again is a no-op. A write or read
    /// still waiting on the handle has an undefined outcome.
    pub fn close(&self) -> Result<()> {
        let Some(handle) = self.handle.lock().take() else {
            return Ok(());
        };

        if !self.api.close_handle(handle.raw()) {
            return Err(translate::call_failed(
                NativeCall::CloseHandle,
                self.api.last_error_code(),
            ));
        }

        info!("Closed {}", self.port_name);
        Ok(())
    }

    fn open_handle(&self, operation: Operation) -> Result<RawHandle> {
        let handle = self.handle.lock().as_ref().map(DeviceHandle::raw);
        handle.ok_or_else(|| {
            SerialError::configuration(format!(
                "Port {} is closed; {} is not possible",
                self.port_name, operation
            ))
        })
    }

    /// Finish a request whose issue call returned `false`.
    fn complete_pending(
        &self,
        handle: RawHandle,
        context: &OverlappedOperationContext<'_, A>,
        event: RawHandle,
        call: NativeCall,
        operation: Operation,
        transferred: NativePtr,
    ) -> Result<()> {
        let code = self.api.last_error_code();
        if let Some(err) = translate::issue_failure(call, code, &self.port_name, operation) {
            return Err(err);
        }

        let outcome = self.api.wait_for_completion(event, COMPLETION_TIMEOUT_MS);
        translate::check_wait(outcome, operation, COMPLETION_TIMEOUT_MS, || {
            self.api.last_error_code()
        })?;

        if !self
            .api
            .query_overlapped_result(handle, context.descriptor(), transferred, true)
        {
            return Err(translate::call_failed(
                NativeCall::GetOverlappedResult,
                self.api.last_error_code(),
            ));
        }
        Ok(())
    }
}

impl<A: NativeDeviceApi> Drop for SerialConnection<A> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close {} on drop: {}", self.port_name, e);
        }
    }
}

impl<A: NativeDeviceApi> std::fmt::Debug for SerialConnection<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialConnection")
            .field("port_name", &self.port_name)
            .field("handle", &*self.handle.lock())
            .finish()
    }
}
