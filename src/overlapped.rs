//! Scoped native scratch resources for a single overlapped operation.
//!
//! An `OverlappedOperationContext` allocates the async descriptor and the
//! transfer-count buffers up front and creates the completion event on
//! request. Everything it acquired is released exactly once, either through
//! an explicit [`release`](OverlappedOperationContext::release) or when the
//! context is dropped, so early returns via `?` cannot leak.

use crate::error::{InfrastructureFault, Result};
use crate::native::{NativeDeviceApi, NativePtr, RawHandle, SizeClass};
use crate::translate;
use tracing::warn;

/// Native scratch state owned by one write or read.
pub struct OverlappedOperationContext<'a, A: NativeDeviceApi + ?Sized> {
    api: &'a A,
    descriptor: NativePtr,
    transfer_counts: Vec<NativePtr>,
    event: Option<RawHandle>,
    released: bool,
}

impl<'a, A: NativeDeviceApi + ?Sized> OverlappedOperationContext<'a, A> {
    /// Allocate a descriptor and `transfer_count_buffers` `DWORD` buffers.
    ///
    /// If any allocation fails, the buffers already obtained are freed before
    /// the error is returned.
    pub fn new(api: &'a A, transfer_count_buffers: usize) -> Result<Self> {
        let mut context = Self {
            api,
            descriptor: NativePtr::NULL,
            transfer_counts: Vec::with_capacity(transfer_count_buffers),
            event: None,
            released: false,
        };

        context.descriptor = context.allocate(SizeClass::Overlapped)?;
        for _ in 0..transfer_count_buffers {
            let buffer = context.allocate(SizeClass::Dword)?;
            context.transfer_counts.push(buffer);
        }

        Ok(context)
    }

    fn allocate(&self, size: SizeClass) -> Result<NativePtr> {
        let ptr = self.api.allocate(size);
        if ptr.is_null() {
            return Err(InfrastructureFault::Allocation { size: size.name() }.into());
        }
        Ok(ptr)
    }

    /// Create the manual-reset completion event and bind it to the descriptor.
    pub fn create_event(&mut self) -> Result<RawHandle> {
        let event = self.api.create_event(true, false);
        if !event.is_valid() {
            return Err(translate::event_creation_failed(self.api.last_error_code()));
        }

        self.event = Some(event);
        self.api.attach_event(self.descriptor, event);
        Ok(event)
    }

    pub fn descriptor(&self) -> NativePtr {
        self.descriptor
    }

    /// The `index`-th transfer-count buffer.
    ///
    /// # Panics
    /// If `index` is not below the count passed to [`new`](Self::new).
    pub fn transfer_count(&self, index: usize) -> NativePtr {
        self.transfer_counts[index]
    }

    pub fn event(&self) -> Option<RawHandle> {
        self.event
    }

    /// Free every buffer and close the completion event, once.
    ///
    /// The descriptor goes first: a backend may have to retire an in-flight
    /// request, which still signals the event and writes the buffers.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if !self.descriptor.is_null() {
            self.api.free(self.descriptor);
        }
        for buffer in self.transfer_counts.drain(..) {
            self.api.free(buffer);
        }
        if let Some(event) = self.event.take() {
            if !self.api.close_handle(event) {
                warn!(
                    "Failed to close completion event {} (error code {})",
                    event,
                    self.api.last_error_code()
                );
            }
        }
    }
}

impl<A: NativeDeviceApi + ?Sized> Drop for OverlappedOperationContext<'_, A> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<A: NativeDeviceApi + ?Sized> std::fmt::Debug for OverlappedOperationContext<'_, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlappedOperationContext")
            .field("descriptor", &self.descriptor)
            .field("transfer_counts", &self.transfer_counts)
            .field("event", &self.event)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SerialError;
    use crate::native::{FakeDeviceApi, MockNativeDeviceApi};

    #[test]
    fn test_allocates_descriptor_and_buffers() {
        let api = FakeDeviceApi::new();
        let context = OverlappedOperationContext::new(&api, 2).unwrap();

        let allocations = api.allocations();
        assert_eq!(allocations.len(), 3);
        assert_eq!(allocations[0], (context.descriptor(), SizeClass::Overlapped));
        assert_eq!(allocations[1], (context.transfer_count(0), SizeClass::Dword));
        assert_eq!(allocations[2], (context.transfer_count(1), SizeClass::Dword));
        assert_eq!(context.event(), None);
    }

    #[test]
    fn test_drop_releases_everything_once() {
        let api = FakeDeviceApi::new();
        {
            let mut context = OverlappedOperationContext::new(&api, 1).unwrap();
            context.create_event().unwrap();
        }
        assert!(api.all_released());
        assert_eq!(api.events().len(), 1);
    }

    #[test]
    fn test_release_is_idempotent() {
        let api = FakeDeviceApi::new();
        let mut context = OverlappedOperationContext::new(&api, 2).unwrap();
        let event = context.create_event().unwrap();

        context.release();
        context.release();
        drop(context);

        assert_eq!(api.close_count(event), 1);
        for (ptr, _) in api.allocations() {
            assert_eq!(api.free_count(ptr), 1);
        }
    }

    #[test]
    fn test_event_creation_failure_closes_nothing() {
        let api = FakeDeviceApi::new();
        api.fail_event_creation(8);
        let mut context = OverlappedOperationContext::new(&api, 1).unwrap();

        let err = context.create_event().unwrap_err();
        assert_eq!(
            err,
            SerialError::Infrastructure(InfrastructureFault::EventCreation { code: 8 })
        );
        drop(context);

        assert_eq!(api.close_count(RawHandle::NULL), 0);
        assert!(api.all_released());
    }

    #[test]
    fn test_partial_allocation_is_rolled_back() {
        let api = FakeDeviceApi::new();
        api.fail_allocation_after(2);

        let err = OverlappedOperationContext::new(&api, 2).unwrap_err();
        assert_eq!(
            err.as_fault(),
            Some(&InfrastructureFault::Allocation { size: "DWORD" })
        );
        assert_eq!(api.allocations().len(), 2);
        assert!(api.all_released());
    }

    #[test]
    fn test_release_order_descriptor_first() {
        let mut api = MockNativeDeviceApi::new();
        let mut seq = mockall::Sequence::new();
        api.expect_allocate()
            .withf(|size| *size == SizeClass::Overlapped)
            .return_const(NativePtr::new(1));
        api.expect_allocate()
            .withf(|size| *size == SizeClass::Dword)
            .return_const(NativePtr::new(2));
        api.expect_create_event().return_const(RawHandle::new(9));
        api.expect_attach_event().times(1).return_const(());
        api.expect_free()
            .withf(|ptr| *ptr == NativePtr::new(1))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        api.expect_free()
            .withf(|ptr| *ptr == NativePtr::new(2))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        api.expect_close_handle()
            .withf(|handle| *handle == RawHandle::new(9))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(true);

        let mut context = OverlappedOperationContext::new(&api, 1).unwrap();
        context.create_event().unwrap();
    }
}
