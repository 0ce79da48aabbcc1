//! Simulated USB subsystem
//!
//! - [`device`]: per-device open/configuration/interface state machine
//! - [`transfers`]: deterministic payloads for control, bulk and
//!   isochronous transfers
//! - [`registry`]: the test harness that owns devices and applies deferred
//!   disconnects

pub mod device;
pub mod registry;
pub mod transfers;

pub use device::{DeviceError, FakeDevice};
pub use registry::{FakeUsbDevice, HarnessError, HarnessState, RemovalCallback, UsbTest};
