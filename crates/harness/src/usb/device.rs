//! Fake USB device
//!
//! A software model of one device's open/configuration/interface state.
//! It accepts the same calls a real WebUSB backend does and enforces the
//! same preconditions: a call made in the wrong state fails with a
//! [`DeviceError`], while a request the device itself would refuse comes back
//! as a normal result with a `PERMISSION_DENIED` status.
//!
//! Every operation is `async` to match the backend calling convention, but
//! completes without suspending.

use crate::usb::transfers;
use protocol::{
    CommandResult, ConfigurationDescriptor, ConfigurationValue, ControlInResult, ControlSetup,
    DeviceDescriptor, InTransferResult, InterfaceDescriptor, IsoInResult, IsoOutResult,
    OutTransferResult,
};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Precondition violations
///
/// These indicate the caller is misusing the device API; they are never
/// recoverable by retrying the same call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("The device must be opened first.")]
    NotOpen,

    #[error("The device is already opened.")]
    AlreadyOpen,

    #[error("The device must be configured first.")]
    NotConfigured,

    #[error("Interface {0} is already claimed.")]
    InterfaceAlreadyClaimed(u8),

    #[error("Interface {0} is not claimed.")]
    InterfaceNotClaimed(u8),

    #[error("Interface {0} does not exist in the active configuration.")]
    InterfaceNotFound(u8),

    #[error("Interface {interface} has no alternate setting {alternate}.")]
    AlternateNotFound { interface: u8, alternate: u8 },

    #[error("Transfer of {requested} bytes exceeds the {max}-byte limit.")]
    TransferTooLarge { requested: u64, max: u64 },

    #[error("Isochronous transfer of {requested} packets exceeds the {max}-packet limit.")]
    TooManyPackets { requested: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, DeviceError>;

/// Simulated device state
#[derive(Debug, Clone)]
pub struct FakeDevice {
    descriptor: DeviceDescriptor,
    opened: bool,
    /// Value of the selected configuration
    current_configuration: Option<u8>,
    /// interfaceNumber -> active alternate setting
    claimed_interfaces: BTreeMap<u8, u8>,
}

impl FakeDevice {
    /// Create a closed, unconfigured device
    pub fn new(descriptor: DeviceDescriptor) -> Self {
        Self {
            descriptor,
            opened: false,
            current_configuration: None,
            claimed_interfaces: BTreeMap::new(),
        }
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub fn is_opened(&self) -> bool {
        self.opened
    }

    /// Currently selected configuration, if any
    pub fn active_configuration(&self) -> Option<&ConfigurationDescriptor> {
        self.current_configuration
            .and_then(|value| self.descriptor.configuration(value))
    }

    /// Claimed interfaces and their active alternate settings
    pub fn claimed_interfaces(&self) -> &BTreeMap<u8, u8> {
        &self.claimed_interfaces
    }

    /// Active alternate setting of a claimed interface
    pub fn alternate_setting(&self, interface_number: u8) -> Option<u8> {
        self.claimed_interfaces.get(&interface_number).copied()
    }

    pub async fn get_configuration(&self) -> ConfigurationValue {
        ConfigurationValue {
            value: self.current_configuration.unwrap_or(0),
        }
    }

    pub async fn open(&mut self) -> Result<()> {
        if self.opened {
            return Err(reject(DeviceError::AlreadyOpen));
        }
        self.opened = true;
        debug!("Fake device opened");
        Ok(())
    }

    /// Close the device
    ///
    /// Only the open flag changes. The selected configuration and any
    /// claimed interfaces are still in place after the next `open`.
    pub async fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.opened = false;
        debug!("Fake device closed");
        Ok(())
    }

    /// Select a configuration by value
    ///
    /// An unknown value leaves the device unconfigured rather than failing.
    pub async fn set_configuration(&mut self, value: u8) -> Result<CommandResult> {
        self.ensure_open()?;

        self.current_configuration = self
            .descriptor
            .configuration(value)
            .map(|config| config.configuration_value);
        self.claimed_interfaces.clear();

        match self.current_configuration {
            Some(value) => debug!("Selected configuration {}", value),
            None => debug!("No configuration with value {}, device unconfigured", value),
        }
        Ok(CommandResult::SUCCESS)
    }

    pub async fn claim_interface(&mut self, interface_number: u8) -> Result<CommandResult> {
        self.ensure_open()?;
        let config = self.ensure_configured()?;
        if self.claimed_interfaces.contains_key(&interface_number) {
            return Err(reject(DeviceError::InterfaceAlreadyClaimed(interface_number)));
        }
        if config.interface(interface_number).is_none() {
            return Err(reject(DeviceError::InterfaceNotFound(interface_number)));
        }

        self.claimed_interfaces.insert(interface_number, 0);
        debug!("Claimed interface {}", interface_number);
        Ok(CommandResult::SUCCESS)
    }

    pub async fn release_interface(&mut self, interface_number: u8) -> Result<CommandResult> {
        self.ensure_open()?;
        self.ensure_configured()?;
        if self.claimed_interfaces.remove(&interface_number).is_none() {
            return Err(reject(DeviceError::InterfaceNotClaimed(interface_number)));
        }

        debug!("Released interface {}", interface_number);
        Ok(CommandResult::SUCCESS)
    }

    pub async fn set_interface_alternate_setting(
        &mut self,
        interface_number: u8,
        alternate_setting: u8,
    ) -> Result<CommandResult> {
        self.ensure_open()?;
        self.ensure_configured()?;
        if !self.claimed_interfaces.contains_key(&interface_number) {
            return Err(reject(DeviceError::InterfaceNotClaimed(interface_number)));
        }
        let iface = self.claimed_interface_descriptor(interface_number)?;
        if !iface.has_alternate(alternate_setting) {
            return Err(reject(DeviceError::AlternateNotFound {
                interface: interface_number,
                alternate: alternate_setting,
            }));
        }

        self.claimed_interfaces
            .insert(interface_number, alternate_setting);
        debug!(
            "Interface {} switched to alternate setting {}",
            interface_number, alternate_setting
        );
        Ok(CommandResult::SUCCESS)
    }

    pub async fn reset(&mut self) -> Result<CommandResult> {
        self.ensure_open()?;
        debug!("Fake device reset");
        Ok(CommandResult::SUCCESS)
    }

    pub async fn clear_halt(&mut self, endpoint: u8) -> Result<CommandResult> {
        self.ensure_open()?;
        self.ensure_configured()?;
        debug!("Cleared halt on endpoint {:#04x}", endpoint);
        Ok(CommandResult::SUCCESS)
    }

    pub async fn control_transfer_in(
        &mut self,
        setup: &ControlSetup,
        length: u16,
    ) -> Result<ControlInResult> {
        self.ensure_open()?;
        let result = transfers::control_in(setup, length, self.is_configured());
        debug!(
            "Control IN: recipient={:?}, request={:#x}, value={:#x}, index={:#x}, length={}, status={:?}",
            setup.recipient, setup.request, setup.value, setup.index, length, result.status
        );
        Ok(result)
    }

    pub async fn control_transfer_out(
        &mut self,
        setup: &ControlSetup,
        data: &[u8],
    ) -> Result<OutTransferResult> {
        self.ensure_open()?;
        let result = transfers::control_out(setup, data, self.is_configured());
        debug!(
            "Control OUT: recipient={:?}, request={:#x}, data_len={}, status={:?}",
            setup.recipient,
            setup.request,
            data.len(),
            result.status
        );
        Ok(result)
    }

    /// Isochronous IN; `timeout` is accepted but never enforced
    pub async fn isochronous_transfer_in(
        &mut self,
        endpoint_number: u8,
        packet_lengths: &[u32],
        _timeout: Option<Duration>,
    ) -> Result<IsoInResult> {
        self.ensure_open()?;
        self.ensure_configured()?;
        ensure_packet_count(packet_lengths.len())?;
        ensure_transfer_fits(packet_lengths.iter().map(|&len| u64::from(len)).sum())?;
        debug!(
            "Isochronous IN on endpoint {}: {} packet(s)",
            endpoint_number,
            packet_lengths.len()
        );
        Ok(transfers::isochronous_in(packet_lengths))
    }

    /// Isochronous OUT; `timeout` is accepted but never enforced
    pub async fn isochronous_transfer_out(
        &mut self,
        endpoint_number: u8,
        data: &[u8],
        packet_lengths: &[u32],
        _timeout: Option<Duration>,
    ) -> Result<IsoOutResult> {
        self.ensure_open()?;
        self.ensure_configured()?;
        ensure_packet_count(packet_lengths.len())?;
        debug!(
            "Isochronous OUT on endpoint {}: {} packet(s), {} bytes",
            endpoint_number,
            packet_lengths.len(),
            data.len()
        );
        Ok(transfers::isochronous_out(packet_lengths))
    }

    pub async fn transfer_in(&mut self, endpoint_number: u8, length: u32) -> Result<InTransferResult> {
        self.ensure_open()?;
        self.ensure_configured()?;
        ensure_transfer_fits(u64::from(length))?;
        debug!("Bulk IN on endpoint {}: {} bytes", endpoint_number, length);
        Ok(transfers::bulk_in(length))
    }

    pub async fn transfer_out(
        &mut self,
        endpoint_number: u8,
        data: &[u8],
    ) -> Result<OutTransferResult> {
        self.ensure_open()?;
        self.ensure_configured()?;
        debug!("Bulk OUT on endpoint {}: {} bytes", endpoint_number, data.len());
        Ok(transfers::written(data))
    }

    fn is_configured(&self) -> bool {
        self.active_configuration().is_some()
    }

    fn ensure_open(&self) -> Result<()> {
        if !self.opened {
            return Err(reject(DeviceError::NotOpen));
        }
        Ok(())
    }

    fn ensure_configured(&self) -> Result<&ConfigurationDescriptor> {
        self.active_configuration()
            .ok_or_else(|| reject(DeviceError::NotConfigured))
    }

    fn claimed_interface_descriptor(&self, interface_number: u8) -> Result<&InterfaceDescriptor> {
        self.ensure_configured()?
            .interface(interface_number)
            .ok_or_else(|| reject(DeviceError::InterfaceNotFound(interface_number)))
    }
}

fn reject(err: DeviceError) -> DeviceError {
    warn!("Rejected fake device call: {}", err);
    err
}

fn ensure_transfer_fits(requested: u64) -> Result<()> {
    if requested > transfers::MAX_TRANSFER_LENGTH {
        return Err(reject(DeviceError::TransferTooLarge {
            requested,
            max: transfers::MAX_TRANSFER_LENGTH,
        }));
    }
    Ok(())
}

fn ensure_packet_count(requested: usize) -> Result<()> {
    if requested > transfers::MAX_ISO_PACKETS {
        return Err(reject(DeviceError::TooManyPackets {
            requested,
            max: transfers::MAX_ISO_PACKETS,
        }));
    }
    Ok(())
}
