//! Common utilities for the WebUSB fake-device harness
//!
//! Shared error type, tracing setup, the deferred device-event queue used to
//! model asynchronous hot-unplug, and helpers for tests across crates.

pub mod error;
pub mod events;
pub mod logging;
pub mod test_utils;

pub use error::{Error, Result};
pub use events::{DeviceEvent, EventQueue, EventSender};
pub use logging::{LogFormat, setup_logging};
