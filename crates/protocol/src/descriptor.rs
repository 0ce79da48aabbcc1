//! Fake device descriptor model
//!
//! A device is described by its configurations, each configuration by its
//! interfaces, and each interface by its alternate settings. Descriptors are
//! plain records; [`DeviceDescriptor::new`] and [`DeviceDescriptor::validate`]
//! reject shapes a real device could never report.
//!
//! The serialized form uses the WebUSB field names:
//!
//! ```text
//! {configurations: [{configurationValue, interfaces: [{interfaceNumber,
//!   alternates: [{alternateSetting}]}]}]}
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Descriptor validation failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DescriptorError {
    /// Value 0 means "not configured" and cannot name a configuration
    #[error("Configuration value 0 is reserved for the unconfigured state")]
    ReservedConfigurationValue,

    #[error("Duplicate configuration value {0}")]
    DuplicateConfiguration(u8),

    #[error("Duplicate interface {interface} in configuration {configuration}")]
    DuplicateInterface { configuration: u8, interface: u8 },

    /// Claiming activates alternate 0, so every interface must declare it
    #[error("Interface {interface} in configuration {configuration} has no alternate setting 0")]
    MissingPrimaryAlternate { configuration: u8, interface: u8 },

    #[error(
        "Duplicate alternate setting {alternate} on interface {interface} in configuration {configuration}"
    )]
    DuplicateAlternate {
        configuration: u8,
        interface: u8,
        alternate: u8,
    },
}

/// Alternate setting of an interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlternateDescriptor {
    pub alternate_setting: u8,
}

/// Interface within a configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceDescriptor {
    pub interface_number: u8,
    pub alternates: Vec<AlternateDescriptor>,
}

impl InterfaceDescriptor {
    /// Interface with the given alternate settings
    pub fn new(interface_number: u8, alternates: impl IntoIterator<Item = u8>) -> Self {
        Self {
            interface_number,
            alternates: alternates
                .into_iter()
                .map(|alternate_setting| AlternateDescriptor { alternate_setting })
                .collect(),
        }
    }

    /// Whether `alternate` is one of the declared alternate settings
    pub fn has_alternate(&self, alternate: u8) -> bool {
        self.alternates
            .iter()
            .any(|a| a.alternate_setting == alternate)
    }
}

/// Configuration a device can be switched into
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationDescriptor {
    pub configuration_value: u8,
    pub interfaces: Vec<InterfaceDescriptor>,
}

impl ConfigurationDescriptor {
    pub fn new(configuration_value: u8, interfaces: Vec<InterfaceDescriptor>) -> Self {
        Self {
            configuration_value,
            interfaces,
        }
    }

    /// Look up an interface by number
    pub fn interface(&self, interface_number: u8) -> Option<&InterfaceDescriptor> {
        self.interfaces
            .iter()
            .find(|iface| iface.interface_number == interface_number)
    }
}

/// Immutable description of a fake device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    /// USB Vendor ID reported by enumeration
    #[serde(default)]
    pub vendor_id: u16,
    /// USB Product ID reported by enumeration
    #[serde(default)]
    pub product_id: u16,
    /// Product string reported by enumeration
    #[serde(default)]
    pub product_name: Option<String>,
    pub configurations: Vec<ConfigurationDescriptor>,
}

impl DeviceDescriptor {
    /// Build and validate a descriptor from its configurations
    pub fn new(configurations: Vec<ConfigurationDescriptor>) -> Result<Self, DescriptorError> {
        let descriptor = Self {
            configurations,
            ..Self::default()
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Attach vendor/product identification
    pub fn with_ids(mut self, vendor_id: u16, product_id: u16) -> Self {
        self.vendor_id = vendor_id;
        self.product_id = product_id;
        self
    }

    /// Attach a product string
    pub fn with_product_name(mut self, name: impl Into<String>) -> Self {
        self.product_name = Some(name.into());
        self
    }

    /// Look up a configuration by its configuration value
    pub fn configuration(&self, value: u8) -> Option<&ConfigurationDescriptor> {
        self.configurations
            .iter()
            .find(|config| config.configuration_value == value)
    }

    /// Check the structural rules every descriptor must satisfy
    ///
    /// Deserialized descriptors are not validated automatically; callers
    /// accepting external input must call this before use.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        let mut values = HashSet::new();

        for config in &self.configurations {
            let configuration = config.configuration_value;
            if configuration == 0 {
                return Err(DescriptorError::ReservedConfigurationValue);
            }
            if !values.insert(configuration) {
                return Err(DescriptorError::DuplicateConfiguration(configuration));
            }

            let mut interfaces = HashSet::new();
            for iface in &config.interfaces {
                let interface = iface.interface_number;
                if !interfaces.insert(interface) {
                    return Err(DescriptorError::DuplicateInterface {
                        configuration,
                        interface,
                    });
                }

                let mut alternates = HashSet::new();
                for alt in &iface.alternates {
                    if !alternates.insert(alt.alternate_setting) {
                        return Err(DescriptorError::DuplicateAlternate {
                            configuration,
                            interface,
                            alternate: alt.alternate_setting,
                        });
                    }
                }
                if !alternates.contains(&0) {
                    return Err(DescriptorError::MissingPrimaryAlternate {
                        configuration,
                        interface,
                    });
                }
            }
        }

        Ok(())
    }
}
