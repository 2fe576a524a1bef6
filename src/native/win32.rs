//! Win32 overlapped I/O backend.
//!
//! Scratch buffers live in a registry owned by the backend, keyed by the
//! address handed out to the engine. Freeing a descriptor whose request is
//! still in flight cancels the request and waits for the cancellation first,
//! since the kernel writes into the descriptor (and the event-mask buffer)
//! until the request retires.

use super::traits::{
    DeviceHandle, NativeDeviceApi, NativePtr, RawHandle, SizeClass, WaitOutcome, EV_RXCHAR,
};
use crate::error::{NativeCall, Result};
use crate::settings::{Dcb, SerialPortSettings};
use crate::translate;
use parking_lot::Mutex;
use std::cell::Cell;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;
use std::ptr;
use tracing::{debug, info};
use winapi::shared::minwindef::{BOOL, DWORD, FALSE, TRUE};
use winapi::shared::winerror::ERROR_INVALID_PARAMETER;
use winapi::um::errhandlingapi::GetLastError;
use winapi::um::fileapi::{CreateFileW, WriteFile, OPEN_EXISTING};
use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
use winapi::um::ioapiset::{CancelIoEx, GetOverlappedResult};
use winapi::um::minwinbase::OVERLAPPED;
use winapi::um::synchapi::{CreateEventW, ResetEvent, WaitForSingleObject};
use winapi::um::winbase::{
    GetCommState, SetCommMask, SetCommState, WaitCommEvent, DCB, FILE_FLAG_OVERLAPPED,
};
use winapi::um::winnt::{GENERIC_READ, GENERIC_WRITE, HANDLE};

/// `OVERLAPPED::Internal` while the request is still in flight.
const STATUS_PENDING: usize = 0x0000_0103;

thread_local! {
    static LAST_ERROR: Cell<u32> = const { Cell::new(0) };
}

/// Capture `GetLastError` right after a failing call.
fn preserve(result: BOOL) -> bool {
    if result == FALSE {
        let code = unsafe { GetLastError() };
        LAST_ERROR.with(|last| last.set(code));
        false
    } else {
        true
    }
}

fn reject(code: u32) -> bool {
    LAST_ERROR.with(|last| last.set(code));
    false
}

struct DescriptorSlot {
    overlapped: OVERLAPPED,
    /// Device the last request was issued against.
    handle: Option<isize>,
    /// Copy of the payload; the kernel reads it until the write retires.
    data: Vec<u8>,
}

enum Slot {
    Descriptor(Box<DescriptorSlot>),
    Dword(Box<DWORD>),
}

type Slots = HashMap<NativePtr, Slot>;

fn dword_ptr(slots: &mut Slots, ptr: NativePtr) -> Option<*mut DWORD> {
    match slots.get_mut(&ptr) {
        Some(Slot::Dword(value)) => Some(&mut **value as *mut DWORD),
        _ => None,
    }
}

fn descriptor_ptr(slots: &mut Slots, ptr: NativePtr) -> Option<*mut DescriptorSlot> {
    match slots.get_mut(&ptr) {
        Some(Slot::Descriptor(slot)) => Some(&mut **slot as *mut DescriptorSlot),
        _ => None,
    }
}

/// Native device API backed by `kernel32`.
#[derive(Default)]
pub struct Win32DeviceApi {
    slots: Mutex<Slots>,
}

// SAFETY: the raw pointers inside `OVERLAPPED` refer to kernel objects and to
// boxes owned by the registry; all registry access goes through the mutex.
unsafe impl Send for Win32DeviceApi {}
unsafe impl Sync for Win32DeviceApi {}

impl Win32DeviceApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open `port_name` (e.g. `COM3`) for overlapped I/O and apply `settings`.
    pub fn open(&self, port_name: &str, settings: &SerialPortSettings) -> Result<DeviceHandle> {
        let path = if port_name.starts_with(r"\\.\") {
            port_name.to_string()
        } else {
            format!(r"\\.\{}", port_name)
        };
        let wide: Vec<u16> = OsStr::new(&path)
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        let handle = unsafe {
            CreateFileW(
                wide.as_ptr(),
                GENERIC_READ | GENERIC_WRITE,
                0,
                ptr::null_mut(),
                OPEN_EXISTING,
                FILE_FLAG_OVERLAPPED,
                ptr::null_mut(),
            )
        };
        if handle == INVALID_HANDLE_VALUE {
            let code = unsafe { GetLastError() };
            return Err(translate::call_failed(NativeCall::CreateFile, code));
        }

        if let Err(e) = configure(handle, settings) {
            unsafe { CloseHandle(handle) };
            return Err(e);
        }

        info!("Opened {} at {} baud", port_name, settings.bauds());
        Ok(DeviceHandle::new(RawHandle::new(handle as isize)))
    }
}

fn configure(handle: HANDLE, settings: &SerialPortSettings) -> Result<()> {
    let mut native: DCB = unsafe { std::mem::zeroed() };
    native.DCBlength = std::mem::size_of::<DCB>() as DWORD;

    if unsafe { GetCommState(handle, &mut native) } == FALSE {
        let code = unsafe { GetLastError() };
        return Err(translate::call_failed(NativeCall::GetCommState, code));
    }

    apply_dcb(&Dcb::from_settings(settings), &mut native);

    if unsafe { SetCommState(handle, &mut native) } == FALSE {
        let code = unsafe { GetLastError() };
        return Err(translate::call_failed(NativeCall::SetCommState, code));
    }
    if unsafe { SetCommMask(handle, EV_RXCHAR) } == FALSE {
        let code = unsafe { GetLastError() };
        return Err(translate::call_failed(NativeCall::SetCommMask, code));
    }
    Ok(())
}

/// Copy the mapped control block onto the native `DCB`.
fn apply_dcb(dcb: &Dcb, native: &mut DCB) {
    native.BaudRate = dcb.baud_rate;
    native.ByteSize = dcb.byte_size;
    native.Parity = dcb.parity;
    native.StopBits = dcb.stop_bits;
    native.set_fBinary(1);
    native.set_fRtsControl(DWORD::from(dcb.rts_control));
    native.set_fOutxCtsFlow(DWORD::from(dcb.outx_cts_flow));
    native.set_fOutxDsrFlow(DWORD::from(dcb.outx_dsr_flow));
    native.set_fDsrSensitivity(DWORD::from(dcb.dsr_sensitivity));
    native.set_fTXContinueOnXoff(DWORD::from(dcb.tx_continue_on_xoff));
    native.set_fOutX(DWORD::from(dcb.out_x));
    native.set_fInX(DWORD::from(dcb.in_x));
    native.set_fErrorChar(DWORD::from(dcb.error_char));
    native.set_fNull(DWORD::from(dcb.null));
    native.set_fAbortOnError(DWORD::from(dcb.abort_on_error));
    native.XonLim = dcb.xon_lim;
    native.XoffLim = dcb.xoff_lim;
    native.XonChar = dcb.xon_char as _;
    native.XoffChar = dcb.xoff_char as _;
}

impl NativeDeviceApi for Win32DeviceApi {
    fn create_event(&self, manual_reset: bool, initial_state: bool) -> RawHandle {
        let event = unsafe {
            CreateEventW(
                ptr::null_mut(),
                manual_reset as BOOL,
                initial_state as BOOL,
                ptr::null(),
            )
        };
        if event.is_null() {
            preserve(FALSE);
        }
        RawHandle::new(event as isize)
    }

    fn attach_event(&self, descriptor: NativePtr, event: RawHandle) {
        let mut slots = self.slots.lock();
        if let Some(slot) = descriptor_ptr(&mut slots, descriptor) {
            // SAFETY: the box is owned by the registry and the lock is held.
            unsafe { (*slot).overlapped.hEvent = event.raw() as HANDLE };
        }
    }

    fn write_file(
        &self,
        handle: RawHandle,
        data: &[u8],
        transferred: NativePtr,
        descriptor: NativePtr,
    ) -> bool {
        let mut slots = self.slots.lock();
        let (Some(count), Some(slot)) = (
            dword_ptr(&mut slots, transferred),
            descriptor_ptr(&mut slots, descriptor),
        ) else {
            return reject(ERROR_INVALID_PARAMETER);
        };

        // SAFETY: both boxes stay registered until `free`, which retires any
        // request still referencing them.
        unsafe {
            let slot = &mut *slot;
            slot.handle = Some(handle.raw());
            slot.data.clear();
            slot.data.extend_from_slice(data);
            preserve(WriteFile(
                handle.raw() as HANDLE,
                slot.data.as_ptr().cast(),
                slot.data.len() as DWORD,
                count,
                &mut slot.overlapped,
            ))
        }
    }

    fn wait_comm_event(
        &self,
        handle: RawHandle,
        event_mask: NativePtr,
        descriptor: NativePtr,
    ) -> bool {
        let mut slots = self.slots.lock();
        let (Some(mask), Some(slot)) = (
            dword_ptr(&mut slots, event_mask),
            descriptor_ptr(&mut slots, descriptor),
        ) else {
            return reject(ERROR_INVALID_PARAMETER);
        };

        // SAFETY: see `write_file`.
        unsafe {
            let slot = &mut *slot;
            slot.handle = Some(handle.raw());
            preserve(WaitCommEvent(
                handle.raw() as HANDLE,
                mask,
                &mut slot.overlapped,
            ))
        }
    }

    fn wait_for_completion(&self, event: RawHandle, timeout_ms: u32) -> WaitOutcome {
        let raw = unsafe { WaitForSingleObject(event.raw() as HANDLE, timeout_ms) };
        let outcome = translate::wait_outcome(raw);
        if outcome == WaitOutcome::Failed {
            preserve(FALSE);
        }
        outcome
    }

    fn query_overlapped_result(
        &self,
        handle: RawHandle,
        descriptor: NativePtr,
        transferred: NativePtr,
        blocking: bool,
    ) -> bool {
        let (count, slot) = {
            let mut slots = self.slots.lock();
            match (
                dword_ptr(&mut slots, transferred),
                descriptor_ptr(&mut slots, descriptor),
            ) {
                (Some(count), Some(slot)) => (count, slot),
                _ => return reject(ERROR_INVALID_PARAMETER),
            }
        };

        // SAFETY: the engine frees these buffers only after the query returns;
        // the lock is released so a blocking query does not stall other calls.
        unsafe {
            preserve(GetOverlappedResult(
                handle.raw() as HANDLE,
                &mut (*slot).overlapped,
                count,
                if blocking { TRUE } else { FALSE },
            ))
        }
    }

    fn close_handle(&self, handle: RawHandle) -> bool {
        preserve(unsafe { CloseHandle(handle.raw() as HANDLE) })
    }

    fn reset_event(&self, event: RawHandle) -> bool {
        preserve(unsafe { ResetEvent(event.raw() as HANDLE) })
    }

    fn allocate(&self, size: SizeClass) -> NativePtr {
        let (ptr, slot) = match size {
            SizeClass::Overlapped => {
                let slot = Box::new(DescriptorSlot {
                    overlapped: unsafe { std::mem::zeroed() },
                    handle: None,
                    data: Vec::new(),
                });
                let ptr = NativePtr::new(&*slot as *const DescriptorSlot as usize);
                (ptr, Slot::Descriptor(slot))
            }
            SizeClass::Dword => {
                let value: Box<DWORD> = Box::new(0);
                let ptr = NativePtr::new(&*value as *const DWORD as usize);
                (ptr, Slot::Dword(value))
            }
        };
        self.slots.lock().insert(ptr, slot);
        ptr
    }

    fn free(&self, ptr: NativePtr) {
        let removed = self.slots.lock().remove(&ptr);
        let Some(Slot::Descriptor(mut slot)) = removed else {
            return;
        };
        let Some(handle) = slot.handle else {
            return;
        };

        if slot.overlapped.Internal == STATUS_PENDING {
            debug!("Cancelling in-flight request on handle {:#x}", handle);
            let mut ignored: DWORD = 0;
            unsafe {
                CancelIoEx(handle as HANDLE, &mut slot.overlapped);
                GetOverlappedResult(handle as HANDLE, &mut slot.overlapped, &mut ignored, TRUE);
            }
        }
    }

    fn read_dword(&self, ptr: NativePtr) -> u32 {
        match self.slots.lock().get(&ptr) {
            Some(Slot::Dword(value)) => **value,
            _ => 0,
        }
    }

    fn last_error_code(&self) -> u32 {
        LAST_ERROR.with(|last| last.get())
    }
}

impl std::fmt::Debug for Win32DeviceApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Win32DeviceApi")
            .field("live_buffers", &self.slots.lock().len())
            .finish()
    }
}
