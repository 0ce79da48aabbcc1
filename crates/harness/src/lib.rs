//! Fake WebUSB device harness
//!
//! Simulated USB devices driven through the WebUSB call surface, a registry
//! that owns them for one test run, and a dispatch layer that applies
//! operations from framed messages or JSON scripts.

pub mod config;
pub mod dispatch;
pub mod script;
pub mod usb;

pub use config::{HarnessConfig, HarnessSettings};
pub use dispatch::{execute, handle_message, reply_body, serve};
pub use script::{ScriptStep, StepOutcome, parse_script, run_script};
pub use usb::{DeviceError, FakeDevice, FakeUsbDevice, HarnessError, HarnessState, UsbTest};

use protocol::DeviceDescriptor;

/// Initialize a harness, attach it and add `fixtures` in order
pub async fn bootstrap(
    fixtures: impl IntoIterator<Item = DeviceDescriptor>,
) -> Result<UsbTest, HarnessError> {
    let mut harness = UsbTest::new();
    harness.initialize().await;
    harness.attach_to_context().await?;
    for descriptor in fixtures {
        harness.add_fake_device(descriptor).await?;
    }
    Ok(harness)
}
