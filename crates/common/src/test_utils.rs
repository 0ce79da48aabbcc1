//! Test utilities for the fake-device harness
//!
//! Provides ready-made descriptors and helper functions for testing across
//! crates.
//!
//! # Example
//!
//! ```
//! use common::test_utils::create_mock_descriptor;
//!
//! let descriptor = create_mock_descriptor();
//! assert!(descriptor.configuration(1).is_some());
//! ```

use protocol::{
    ConfigurationDescriptor, ControlSetup, DeviceDescriptor, InterfaceDescriptor, Recipient,
};
use std::future::Future;
use std::time::Duration;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Single-configuration device
///
/// Configuration 1 with interface 0 (alternate 0) and interface 1
/// (alternates 0 and 1).
pub fn create_mock_descriptor() -> DeviceDescriptor {
    DeviceDescriptor {
        vendor_id: 0x18d1,
        product_id: 0xf00d,
        product_name: Some("Fake USB Device".to_string()),
        configurations: vec![ConfigurationDescriptor::new(
            1,
            vec![
                InterfaceDescriptor::new(0, [0]),
                InterfaceDescriptor::new(1, [0, 1]),
            ],
        )],
    }
}

/// Two-configuration device
///
/// Configuration 1 exposes interface 0; configuration 2 exposes interfaces
/// 0 and 2, the latter with alternates 0..=3.
pub fn create_mock_multi_config_descriptor() -> DeviceDescriptor {
    DeviceDescriptor {
        vendor_id: 0x18d1,
        product_id: 0xf00e,
        product_name: Some("Fake Composite Device".to_string()),
        configurations: vec![
            ConfigurationDescriptor::new(1, vec![InterfaceDescriptor::new(0, [0])]),
            ConfigurationDescriptor::new(
                2,
                vec![
                    InterfaceDescriptor::new(0, [0]),
                    InterfaceDescriptor::new(2, 0..=3),
                ],
            ),
        ],
    }
}

/// Device with no configurations at all
pub fn create_mock_unconfigurable_descriptor() -> DeviceDescriptor {
    DeviceDescriptor {
        vendor_id: 0x1234,
        product_id: 0x5678,
        product_name: None,
        configurations: Vec::new(),
    }
}

/// Standard control setup
pub fn create_mock_setup(recipient: Recipient, request: u8, value: u16, index: u16) -> ControlSetup {
    ControlSetup::new(recipient, request, value, index)
}

/// Bytes `0, 1, .., 255, 0, 1, ..` of the given length
pub fn pattern_bytes(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i & 0xFF) as u8).collect()
}

/// Timeout wrapper for async tests
///
/// # Example
/// ```ignore
/// use common::test_utils::{with_timeout, DEFAULT_TEST_TIMEOUT};
///
/// #[tokio::test]
/// async fn test_with_timeout() {
///     let result = with_timeout(DEFAULT_TEST_TIMEOUT, async { 42 }).await.unwrap();
///     assert_eq!(result, 42);
/// }
/// ```
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError { duration })
}

/// Error returned when a test times out
#[derive(Debug)]
pub struct TimeoutError {
    /// The timeout duration that was exceeded
    pub duration: Duration,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Test timed out after {:?}", self.duration)
    }
}

impl std::error::Error for TimeoutError {}
