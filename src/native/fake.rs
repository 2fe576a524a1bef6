//! In-memory native device for testing.
//!
//! Provides a `FakeDeviceApi` that simulates the overlapped Win32 primitives
//! without a device. Outcomes of every call are scriptable, and every
//! allocation, free, event and handle close is recorded so tests can verify
//! that an operation released exactly what it acquired.

use super::traits::{
    NativeDeviceApi, NativePtr, RawHandle, SizeClass, WaitOutcome, ERROR_IO_PENDING,
};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

/// How an overlapped request (write or comm-event wait) is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueBehavior {
    /// The call completes synchronously.
    Immediate,
    /// The call reports `ERROR_IO_PENDING`.
    Pending,
    /// The call fails with the given error code.
    Fail(u32),
}

/// A recorded native call, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeCall {
    CreateEvent,
    AttachEvent,
    WriteFile(usize),
    WaitCommEvent,
    WaitForCompletion(RawHandle, u32),
    QueryOverlappedResult(bool),
    CloseHandle(RawHandle),
    ResetEvent(RawHandle),
    Allocate(SizeClass),
    Free(NativePtr),
    ReadDword(NativePtr),
    LastErrorCode,
}

/// A write or comm-event wait whose completion is delivered on query.
#[derive(Debug, Clone, Copy)]
struct PendingCompletion {
    /// Buffer the native side writes into asynchronously (event mask).
    async_target: Option<(NativePtr, u32)>,
    /// Byte count reported by the overlapped query.
    transferred: u32,
}

#[derive(Debug)]
struct FakeState {
    next_addr: usize,
    next_event: isize,
    /// Live scratch buffers and their `DWORD` contents.
    live: HashMap<NativePtr, (SizeClass, u32)>,
    allocated: Vec<(NativePtr, SizeClass)>,
    free_counts: HashMap<NativePtr, u32>,
    fail_allocation_after: Option<usize>,
    events: Vec<RawHandle>,
    close_counts: HashMap<RawHandle, u32>,
    fail_event_creation: Option<u32>,
    write_behavior: IssueBehavior,
    comm_event_behavior: IssueBehavior,
    wait_outcomes: VecDeque<WaitOutcome>,
    wait_failure_code: u32,
    query_failure: Option<u32>,
    transferred_override: Option<u32>,
    comm_event_mask: u32,
    reset_failure: Option<u32>,
    close_failure: Option<u32>,
    /// In-flight requests keyed by their async descriptor.
    pending: HashMap<NativePtr, PendingCompletion>,
    /// Per-thread like `GetLastError`.
    last_error: HashMap<ThreadId, u32>,
    gate: Option<WaitGate>,
    write_log: Vec<Vec<u8>>,
    calls: Vec<FakeCall>,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            next_addr: 0x1000,
            next_event: 0x100,
            live: HashMap::new(),
            allocated: Vec::new(),
            free_counts: HashMap::new(),
            fail_allocation_after: None,
            events: Vec::new(),
            close_counts: HashMap::new(),
            fail_event_creation: None,
            write_behavior: IssueBehavior::Immediate,
            comm_event_behavior: IssueBehavior::Pending,
            wait_outcomes: VecDeque::new(),
            wait_failure_code: 0,
            query_failure: None,
            transferred_override: None,
            comm_event_mask: 0,
            reset_failure: None,
            close_failure: None,
            pending: HashMap::new(),
            last_error: HashMap::new(),
            gate: None,
            write_log: Vec::new(),
            calls: Vec::new(),
        }
    }
}

impl FakeState {
    fn store(&mut self, ptr: NativePtr, value: u32) {
        if let Some(slot) = self.live.get_mut(&ptr) {
            slot.1 = value;
        }
    }

    fn set_last_error(&mut self, code: u32) {
        self.last_error.insert(thread::current().id(), code);
    }
}

#[derive(Debug, Default)]
struct GateState {
    open: bool,
    waiting: usize,
}

/// Holds every `wait_for_completion` on a [`FakeDeviceApi`] until opened.
///
/// Lets a test park one operation inside its bounded wait while another
/// operation runs on the same connection.
#[derive(Debug, Clone, Default)]
pub struct WaitGate {
    inner: Arc<(Mutex<GateState>, Condvar)>,
}

impl WaitGate {
    /// Release every held and future wait.
    pub fn open(&self) {
        let (state, cond) = &*self.inner;
        state.lock().open = true;
        cond.notify_all();
    }

    /// Block until `count` waits are held or `timeout` elapses.
    /// Returns whether `count` was reached.
    pub fn wait_for_held(&self, count: usize, timeout: Duration) -> bool {
        let (state, cond) = &*self.inner;
        let mut guard = state.lock();
        while guard.waiting < count {
            if cond.wait_for(&mut guard, timeout).timed_out() {
                return guard.waiting >= count;
            }
        }
        true
    }

    fn pass(&self) {
        let (state, cond) = &*self.inner;
        let mut guard = state.lock();
        guard.waiting += 1;
        cond.notify_all();
        while !guard.open {
            cond.wait(&mut guard);
        }
        guard.waiting -= 1;
    }
}

/// Scriptable native device.
///
/// Clones share state, so a test can hand one clone to a
/// [`SerialConnection`](crate::connection::SerialConnection) and inspect the
/// other.
///
/// # Example
/// ```
/// use serial_overlapped::native::{DeviceHandle, FakeDeviceApi, RawHandle};
/// use serial_overlapped::SerialConnection;
///
/// let api = FakeDeviceApi::new();
/// let conn =
///     SerialConnection::new("COM1", api.clone(), DeviceHandle::new(RawHandle::new(2))).unwrap();
///
/// conn.write(b"hello").unwrap();
///
/// assert_eq!(api.write_log(), vec![b"hello".to_vec()]);
/// assert!(api.all_released());
/// ```
#[derive(Clone, Default)]
pub struct FakeDeviceApi {
    state: Arc<Mutex<FakeState>>,
}

impl FakeDeviceApi {
    /// Create a fake whose writes complete immediately and whose waits signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `create_event` return an invalid handle with the given error code.
    pub fn fail_event_creation(&self, code: u32) {
        self.state.lock().fail_event_creation = Some(code);
    }

    /// Make the allocation after `successful` allocations return null.
    pub fn fail_allocation_after(&self, successful: usize) {
        self.state.lock().fail_allocation_after = Some(successful);
    }

    pub fn script_write(&self, behavior: IssueBehavior) {
        self.state.lock().write_behavior = behavior;
    }

    pub fn script_comm_event(&self, behavior: IssueBehavior) {
        self.state.lock().comm_event_behavior = behavior;
    }

    /// Queue the outcome of the next wait. Unscripted waits are signaled.
    pub fn push_wait_outcome(&self, outcome: WaitOutcome) {
        self.state.lock().wait_outcomes.push_back(outcome);
    }

    /// Error code preserved when a wait returns `Failed`.
    pub fn set_wait_failure_code(&self, code: u32) {
        self.state.lock().wait_failure_code = code;
    }

    pub fn fail_query(&self, code: u32) {
        self.state.lock().query_failure = Some(code);
    }

    /// Report `count` transferred bytes instead of the requested length.
    pub fn override_transferred(&self, count: u32) {
        self.state.lock().transferred_override = Some(count);
    }

    pub fn set_comm_event_mask(&self, mask: u32) {
        self.state.lock().comm_event_mask = mask;
    }

    pub fn fail_reset(&self, code: u32) {
        self.state.lock().reset_failure = Some(code);
    }

    pub fn fail_close(&self, code: u32) {
        self.state.lock().close_failure = Some(code);
    }

    /// Hold subsequent waits until the returned gate is opened.
    pub fn hold_waits(&self) -> WaitGate {
        let gate = WaitGate::default();
        self.state.lock().gate = Some(gate.clone());
        gate
    }

    /// Every native call made so far.
    pub fn calls(&self) -> Vec<FakeCall> {
        self.state.lock().calls.clone()
    }

    /// Timeouts passed to every wait, in order.
    pub fn wait_timeouts(&self) -> Vec<u32> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                FakeCall::WaitForCompletion(_, timeout) => Some(*timeout),
                _ => None,
            })
            .collect()
    }

    /// Events created so far.
    pub fn events(&self) -> Vec<RawHandle> {
        self.state.lock().events.clone()
    }

    /// How often `close_handle` was called for `handle`.
    pub fn close_count(&self, handle: RawHandle) -> u32 {
        self.state.lock().close_counts.get(&handle).copied().unwrap_or(0)
    }

    /// Buffers allocated so far, with their size class.
    pub fn allocations(&self) -> Vec<(NativePtr, SizeClass)> {
        self.state.lock().allocated.clone()
    }

    /// How often `free` was called for `ptr`.
    pub fn free_count(&self, ptr: NativePtr) -> u32 {
        self.state.lock().free_counts.get(&ptr).copied().unwrap_or(0)
    }

    /// Whether every buffer was freed exactly once and every event closed
    /// exactly once.
    pub fn all_released(&self) -> bool {
        let state = self.state.lock();
        let buffers = state
            .allocated
            .iter()
            .all(|(ptr, _)| state.free_counts.get(ptr) == Some(&1));
        let events = state
            .events
            .iter()
            .all(|event| state.close_counts.get(event) == Some(&1));
        buffers && events && state.free_counts.len() == state.allocated.len()
    }

    /// Payloads passed to `write_file`.
    pub fn write_log(&self) -> Vec<Vec<u8>> {
        self.state.lock().write_log.clone()
    }

    fn record(state: &mut FakeState, call: FakeCall) {
        state.calls.push(call);
    }
}

impl NativeDeviceApi for FakeDeviceApi {
    fn create_event(&self, _manual_reset: bool, _initial_state: bool) -> RawHandle {
        let mut state = self.state.lock();
        Self::record(&mut state, FakeCall::CreateEvent);

        if let Some(code) = state.fail_event_creation {
            state.set_last_error(code);
            return RawHandle::NULL;
        }

        let event = RawHandle::new(state.next_event);
        state.next_event += 1;
        state.events.push(event);
        event
    }

    fn attach_event(&self, _descriptor: NativePtr, _event: RawHandle) {
        Self::record(&mut self.state.lock(), FakeCall::AttachEvent);
    }

    fn write_file(
        &self,
        _handle: RawHandle,
        data: &[u8],
        transferred: NativePtr,
        descriptor: NativePtr,
    ) -> bool {
        let mut state = self.state.lock();
        Self::record(&mut state, FakeCall::WriteFile(data.len()));
        state.write_log.push(data.to_vec());

        let count = state
            .transferred_override
            .unwrap_or(data.len() as u32);

        match state.write_behavior {
            IssueBehavior::Immediate => {
                state.store(transferred, count);
                true
            }
            IssueBehavior::Pending => {
                state.pending.insert(
                    descriptor,
                    PendingCompletion {
                        async_target: None,
                        transferred: count,
                    },
                );
                state.set_last_error(ERROR_IO_PENDING);
                false
            }
            IssueBehavior::Fail(code) => {
                state.set_last_error(code);
                false
            }
        }
    }

    fn wait_comm_event(
        &self,
        _handle: RawHandle,
        event_mask: NativePtr,
        descriptor: NativePtr,
    ) -> bool {
        let mut state = self.state.lock();
        Self::record(&mut state, FakeCall::WaitCommEvent);
        let mask = state.comm_event_mask;

        match state.comm_event_behavior {
            IssueBehavior::Immediate => {
                state.store(event_mask, mask);
                true
            }
            IssueBehavior::Pending => {
                state.pending.insert(
                    descriptor,
                    PendingCompletion {
                        async_target: Some((event_mask, mask)),
                        transferred: 0,
                    },
                );
                state.set_last_error(ERROR_IO_PENDING);
                false
            }
            IssueBehavior::Fail(code) => {
                state.set_last_error(code);
                false
            }
        }
    }

    fn wait_for_completion(&self, event: RawHandle, timeout_ms: u32) -> WaitOutcome {
        let mut state = self.state.lock();
        Self::record(&mut state, FakeCall::WaitForCompletion(event, timeout_ms));

        let outcome = state
            .wait_outcomes
            .pop_front()
            .unwrap_or(WaitOutcome::Signaled);
        if outcome == WaitOutcome::Failed {
            let code = state.wait_failure_code;
            state.set_last_error(code);
        }
        let gate = state.gate.clone();
        drop(state);

        if let Some(gate) = gate {
            gate.pass();
        }
        outcome
    }

    fn query_overlapped_result(
        &self,
        _handle: RawHandle,
        descriptor: NativePtr,
        transferred: NativePtr,
        blocking: bool,
    ) -> bool {
        let mut state = self.state.lock();
        Self::record(&mut state, FakeCall::QueryOverlappedResult(blocking));

        if let Some(code) = state.query_failure {
            state.set_last_error(code);
            return false;
        }

        if let Some(completion) = state.pending.remove(&descriptor) {
            if let Some((target, value)) = completion.async_target {
                state.store(target, value);
            }
            state.store(transferred, completion.transferred);
        }
        true
    }

    fn close_handle(&self, handle: RawHandle) -> bool {
        let mut state = self.state.lock();
        Self::record(&mut state, FakeCall::CloseHandle(handle));
        *state.close_counts.entry(handle).or_insert(0) += 1;

        // Only device handles are subject to the scripted close failure.
        if !state.events.contains(&handle) {
            if let Some(code) = state.close_failure {
                state.set_last_error(code);
                return false;
            }
        }
        true
    }

    fn reset_event(&self, event: RawHandle) -> bool {
        let mut state = self.state.lock();
        Self::record(&mut state, FakeCall::ResetEvent(event));

        if let Some(code) = state.reset_failure {
            state.set_last_error(code);
            return false;
        }
        true
    }

    fn allocate(&self, size: SizeClass) -> NativePtr {
        let mut state = self.state.lock();
        Self::record(&mut state, FakeCall::Allocate(size));

        if let Some(limit) = state.fail_allocation_after {
            if state.allocated.len() >= limit {
                return NativePtr::NULL;
            }
        }

        let ptr = NativePtr::new(state.next_addr);
        state.next_addr += 0x10;
        state.live.insert(ptr, (size, 0));
        state.allocated.push((ptr, size));
        ptr
    }

    fn free(&self, ptr: NativePtr) {
        let mut state = self.state.lock();
        Self::record(&mut state, FakeCall::Free(ptr));
        state.live.remove(&ptr);
        *state.free_counts.entry(ptr).or_insert(0) += 1;
    }

    fn read_dword(&self, ptr: NativePtr) -> u32 {
        let mut state = self.state.lock();
        Self::record(&mut state, FakeCall::ReadDword(ptr));
        state.live.get(&ptr).map(|(_, value)| *value).unwrap_or(0)
    }

    fn last_error_code(&self) -> u32 {
        let mut state = self.state.lock();
        Self::record(&mut state, FakeCall::LastErrorCode);
        state
            .last_error
            .get(&thread::current().id())
            .copied()
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for FakeDeviceApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FakeDeviceApi")
            .field("live_buffers", &state.live.len())
            .field("events", &state.events.len())
            .finish()
    }
}
