//! Shared test utilities for the engine integration tests.
//!
//! This module provides common test infrastructure including:
//! - Connections wired to a scripted `FakeDeviceApi`
//! - Resource accounting assertions
//! - Common test data

#![allow(dead_code)]

use serial_overlapped::native::{DeviceHandle, FakeDeviceApi, RawHandle, SizeClass};
use serial_overlapped::SerialConnection;

/// Raw value of the device handle every test connection owns.
pub const DEVICE: RawHandle = RawHandle::new(0x42);

/// Five-byte payload used by the write scenarios.
pub const PAYLOAD: &[u8] = &[0x01, 0x02, 0x03, 0x04, 0x05];

/// Create a connection on `port_name` and the fake behind it.
///
/// # Example
/// ```ignore
/// let (api, conn) = fake_connection("COM1");
/// api.script_write(IssueBehavior::Pending);
/// conn.write(PAYLOAD).unwrap();
/// ```
pub fn fake_connection(port_name: &str) -> (FakeDeviceApi, SerialConnection<FakeDeviceApi>) {
    let api = FakeDeviceApi::new();
    let connection = SerialConnection::new(port_name, api.clone(), DeviceHandle::new(DEVICE))
        .expect("valid handle");
    (api, connection)
}

/// Assert every scratch buffer was freed once and every event closed once.
pub fn assert_released(api: &FakeDeviceApi) {
    for (ptr, size) in api.allocations() {
        assert_eq!(
            api.free_count(ptr),
            1,
            "{} buffer at {:?} not freed exactly once",
            size.name(),
            ptr
        );
    }
    for event in api.events() {
        assert_eq!(
            api.close_count(event),
            1,
            "event {} not closed exactly once",
            event
        );
    }
    assert!(api.all_released());
}

/// Size classes of every allocation, in order.
pub fn allocation_sizes(api: &FakeDeviceApi) -> Vec<SizeClass> {
    api.allocations().into_iter().map(|(_, size)| size).collect()
}
