//! Blocking result hand-off between a producer and a waiting consumer.
//!
//! `BlockingResultFuture` is either already resolved (a value or a carried
//! failure) or pending on a mutex/condvar pair until its single
//! [`Completer`] sets it. [`spawn_blocking`] runs a fallible job on its own
//! thread and returns the pending side.

use crate::error::{InfrastructureFault, Operation, Result, SerialError};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug)]
struct SlotState<T> {
    value: Option<Result<T>>,
    cancelled: bool,
}

/// Shared state behind a pending future.
#[derive(Debug)]
pub struct PendingSlot<T> {
    state: Mutex<SlotState<T>>,
    resolved: Condvar,
}

impl<T> PendingSlot<T> {
    fn resolve(&self, result: Result<T>) -> Result<()> {
        let mut state = self.state.lock();
        if state.value.is_some() {
            return Err(InfrastructureFault::AlreadyResolved.into());
        }
        state.value = Some(result);
        self.resolved.notify_all();
        Ok(())
    }
}

impl<T: Clone> PendingSlot<T> {
    fn wait(&self, timeout: Option<Duration>) -> Result<T> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();
        loop {
            if let Some(result) = state.value.as_ref() {
                return result.clone();
            }
            match deadline {
                Some(deadline) => {
                    if self.resolved.wait_until(&mut state, deadline).timed_out()
                        && state.value.is_none()
                    {
                        let millis = timeout
                            .map_or(0, |t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX));
                        return Err(SerialError::timeout(Operation::Get, millis));
                    }
                }
                None => self.resolved.wait(&mut state),
            }
        }
    }
}

/// The result of an operation, possibly not yet available.
#[derive(Debug)]
pub enum BlockingResultFuture<T> {
    /// Already resolved; `get` never blocks.
    Resolved(Result<T>),
    /// Resolved later by exactly one [`Completer`].
    Pending(Arc<PendingSlot<T>>),
}

impl<T> BlockingResultFuture<T> {
    /// A future holding `value`.
    pub fn completed(value: T) -> Self {
        Self::Resolved(Ok(value))
    }

    /// A future carrying `error`.
    pub fn failed(error: SerialError) -> Self {
        Self::Resolved(Err(error))
    }

    /// A pending future together with the handle that resolves it.
    pub fn pending() -> (Self, Completer<T>) {
        let slot = Arc::new(PendingSlot {
            state: Mutex::new(SlotState {
                value: None,
                cancelled: false,
            }),
            resolved: Condvar::new(),
        });
        let completer = Completer {
            slot: Arc::clone(&slot),
        };
        (Self::Pending(slot), completer)
    }

    /// Request cancellation.
    ///
    /// Advisory only: it marks a still-unresolved future as cancelled but does
    /// not interrupt the producer, and waiters keep waiting for its result.
    /// Returns whether the request was recorded.
    pub fn cancel(&self) -> bool {
        match self {
            Self::Resolved(_) => false,
            Self::Pending(slot) => {
                let mut state = slot.state.lock();
                if state.value.is_some() {
                    return false;
                }
                state.cancelled = true;
                true
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Resolved(_) => false,
            Self::Pending(slot) => slot.state.lock().cancelled,
        }
    }

    pub fn is_done(&self) -> bool {
        match self {
            Self::Resolved(_) => true,
            Self::Pending(slot) => slot.state.lock().value.is_some(),
        }
    }
}

impl<T: Clone> BlockingResultFuture<T> {
    /// Block until the result is available.
    pub fn get(&self) -> Result<T> {
        match self {
            Self::Resolved(result) => result.clone(),
            Self::Pending(slot) => slot.wait(None),
        }
    }

    /// Block for at most `timeout`; a `Timeout` error if nothing arrived.
    pub fn get_timeout(&self, timeout: Duration) -> Result<T> {
        match self {
            Self::Resolved(result) => result.clone(),
            Self::Pending(slot) => slot.wait(Some(timeout)),
        }
    }
}

/// Producer side of a pending [`BlockingResultFuture`].
///
/// Dropping it unresolved fails the future with
/// [`InfrastructureFault::ProducerDropped`] so waiters do not hang.
#[derive(Debug)]
pub struct Completer<T> {
    slot: Arc<PendingSlot<T>>,
}

impl<T> Completer<T> {
    /// Resolve with a value. Fails with `AlreadyResolved` on a second call.
    pub fn set(&self, value: T) -> Result<()> {
        self.slot.resolve(Ok(value))
    }

    /// Resolve with a carried failure.
    pub fn set_failure(&self, error: SerialError) -> Result<()> {
        self.slot.resolve(Err(error))
    }

    fn set_result(&self, result: Result<T>) -> Result<()> {
        self.slot.resolve(result)
    }
}

impl<T> Drop for Completer<T> {
    fn drop(&mut self) {
        // Ignore the error: a resolved future keeps its value.
        let _ = self.slot.resolve(Err(InfrastructureFault::ProducerDropped.into()));
    }
}

/// Run `job` on a new named thread and return a future for its outcome.
pub fn spawn_blocking<T, F>(name: &str, job: F) -> std::io::Result<BlockingResultFuture<T>>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let (future, completer) = BlockingResultFuture::pending();
    thread::Builder::new().name(name.to_string()).spawn(move || {
        if let Err(e) = completer.set_result(job()) {
            warn!("Discarding result of blocking job: {}", e);
        }
    })?;
    Ok(future)
}
