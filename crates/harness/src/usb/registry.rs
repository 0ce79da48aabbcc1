//! Device registry and test harness
//!
//! [`UsbTest`] owns every fake device for one test run. It must be
//! initialized before devices can be added, and it removes devices only on
//! its own turn: a disconnect schedules a [`DeviceEvent`] and the device
//! stays visible until [`UsbTest::next_turn`] (or
//! [`UsbTest::process_pending_events`]) drains the queue.

use crate::usb::device::FakeDevice;
use common::{DeviceEvent, EventQueue, EventSender};
use protocol::{DescriptorError, DeviceDescriptor, DeviceId, DeviceInfo};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Harness-level failures
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A harness call was made before `initialize()`
    #[error("Call initialize() before {operation}().")]
    NotInitialized { operation: &'static str },

    #[error("Device {0:?} not found")]
    DeviceNotFound(DeviceId),

    #[error("Invalid device descriptor: {0}")]
    InvalidDescriptor(#[from] DescriptorError),

    #[error("Event queue error: {0}")]
    Events(#[from] common::Error),
}

/// Lifecycle of the harness; there is no way back to `Uninitialized`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessState {
    Uninitialized,
    Initialized,
}

/// Callback run for each device as it is removed
pub type RemovalCallback = Box<dyn FnMut(&FakeUsbDevice) + Send>;

/// Handle to a fake device owned by the registry
#[derive(Debug)]
pub struct FakeUsbDevice {
    id: DeviceId,
    device: FakeDevice,
    events: EventSender,
}

impl FakeUsbDevice {
    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn device(&self) -> &FakeDevice {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut FakeDevice {
        &mut self.device
    }

    /// Enumeration summary of this device
    pub fn info(&self) -> DeviceInfo {
        let descriptor = self.device.descriptor();
        DeviceInfo {
            id: self.id,
            vendor_id: descriptor.vendor_id,
            product_id: descriptor.product_id,
            product_name: descriptor.product_name.clone(),
            configuration_count: u8::try_from(descriptor.configurations.len())
                .unwrap_or(u8::MAX),
            configuration_value: self
                .device
                .active_configuration()
                .map(|config| config.configuration_value)
                .unwrap_or(0),
            opened: self.device.is_opened(),
        }
    }

    /// Simulate hot-unplug
    ///
    /// Only schedules the removal; the registry applies it on its next turn.
    pub fn disconnect(&self) -> Result<(), HarnessError> {
        debug!("Scheduling disconnect of device {:?}", self.id);
        self.events.schedule(DeviceEvent::Disconnected { device_id: self.id })?;
        Ok(())
    }
}

/// Registry of fake devices for one test run
pub struct UsbTest {
    state: HarnessState,
    /// Live devices in attach order
    devices: Vec<FakeUsbDevice>,
    next_device_id: u32,
    events: EventQueue,
    on_removed: Option<RemovalCallback>,
}

impl UsbTest {
    pub fn new() -> Self {
        Self {
            state: HarnessState::Uninitialized,
            devices: Vec::new(),
            next_device_id: 1,
            events: EventQueue::new(),
            on_removed: None,
        }
    }

    pub fn state(&self) -> HarnessState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.state == HarnessState::Initialized
    }

    /// One-time setup; later calls are no-ops
    pub async fn initialize(&mut self) {
        if self.is_initialized() {
            return;
        }
        self.state = HarnessState::Initialized;
        info!("USB test harness initialized");
    }

    pub async fn attach_to_context(&mut self) -> Result<(), HarnessError> {
        self.require_initialized("attachToContext")?;
        debug!("USB test harness attached to context");
        Ok(())
    }

    /// Validate `descriptor` and append a new fake device for it
    pub async fn add_fake_device(
        &mut self,
        descriptor: DeviceDescriptor,
    ) -> Result<DeviceId, HarnessError> {
        self.require_initialized("addFakeDevice")?;
        descriptor.validate()?;

        let id = DeviceId(self.next_device_id);
        self.next_device_id += 1;

        info!(
            "Added fake device {:?}: vid={:#06x}, pid={:#06x}, {} configuration(s)",
            id,
            descriptor.vendor_id,
            descriptor.product_id,
            descriptor.configurations.len()
        );

        self.devices.push(FakeUsbDevice {
            id,
            device: FakeDevice::new(descriptor),
            events: self.events.sender(),
        });
        Ok(id)
    }

    /// Summaries of every live device, in attach order
    pub fn get_devices(&self) -> Vec<DeviceInfo> {
        self.devices.iter().map(FakeUsbDevice::info).collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn contains(&self, id: DeviceId) -> bool {
        self.device(id).is_some()
    }

    pub fn device(&self, id: DeviceId) -> Option<&FakeUsbDevice> {
        self.devices.iter().find(|d| d.id == id)
    }

    pub fn device_mut(&mut self, id: DeviceId) -> Option<&mut FakeUsbDevice> {
        self.devices.iter_mut().find(|d| d.id == id)
    }

    /// Borrow the simulated device behind a handle
    pub fn fake_device_mut(&mut self, id: DeviceId) -> Result<&mut FakeDevice, HarnessError> {
        self.device_mut(id)
            .map(FakeUsbDevice::device_mut)
            .ok_or(HarnessError::DeviceNotFound(id))
    }

    /// Schedule removal of a device
    pub fn disconnect(&self, id: DeviceId) -> Result<(), HarnessError> {
        self.device(id)
            .ok_or(HarnessError::DeviceNotFound(id))?
            .disconnect()
    }

    /// Install the callback run for every removed device
    pub fn on_device_removed<F>(&mut self, callback: F)
    where
        F: FnMut(&FakeUsbDevice) + Send + 'static,
    {
        self.on_removed = Some(Box::new(callback));
    }

    /// Events scheduled but not yet applied
    pub fn pending_events(&self) -> usize {
        self.events.pending()
    }

    /// Apply every scheduled event now
    ///
    /// Returns the ids of the devices removed, in scheduling order.
    pub fn process_pending_events(&mut self) -> Vec<DeviceId> {
        let mut removed = Vec::new();

        for event in self.events.drain() {
            match event {
                DeviceEvent::Disconnected { device_id } => {
                    let Some(index) = self.devices.iter().position(|d| d.id == device_id) else {
                        warn!("Disconnect for device {:?} already applied", device_id);
                        continue;
                    };
                    let device = self.devices.remove(index);
                    if let Some(callback) = self.on_removed.as_mut() {
                        callback(&device);
                    }
                    info!("Removed fake device {:?}", device_id);
                    removed.push(device_id);
                }
            }
        }

        removed
    }

    /// Yield to the scheduler, then apply scheduled events
    pub async fn next_turn(&mut self) -> Vec<DeviceId> {
        tokio::task::yield_now().await;
        self.process_pending_events()
    }

    fn require_initialized(&self, operation: &'static str) -> Result<(), HarnessError> {
        if !self.is_initialized() {
            warn!("{} called before initialize()", operation);
            return Err(HarnessError::NotInitialized { operation });
        }
        Ok(())
    }
}

impl Default for UsbTest {
    fn default() -> Self {
        Self::new()
    }
}
