//! Operation parameter and result types
//!
//! These mirror the shapes a WebUSB backend hands back to the scripting
//! side: control setups, transfer statuses, per-packet isochronous results
//! and the small acknowledgement records returned by state-changing calls.

use serde::{Deserialize, Serialize};

/// Harness-assigned device identifier
///
/// Stable for the lifetime of a fake device in a registry; never reused
/// after the device is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub u32);

/// Request ID for matching replies to requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

/// Target of a control transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recipient {
    Device,
    Interface,
    Endpoint,
    Other,
}

impl Recipient {
    /// Interface and endpoint requests are only valid on a configured device
    pub fn requires_configuration(self) -> bool {
        matches!(self, Recipient::Interface | Recipient::Endpoint)
    }
}

/// Control request category (bmRequestType bits 5..6)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    #[default]
    Standard,
    Class,
    Vendor,
}

/// Control transfer setup parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlSetup {
    pub recipient: Recipient,
    #[serde(default)]
    pub request_type: RequestType,
    /// bRequest
    pub request: u8,
    /// wValue
    pub value: u16,
    /// wIndex
    pub index: u16,
}

impl ControlSetup {
    /// Standard request with the given recipient
    pub fn new(recipient: Recipient, request: u8, value: u16, index: u16) -> Self {
        Self {
            recipient,
            request_type: RequestType::Standard,
            request,
            value,
            index,
        }
    }
}

/// Outcome of a transfer
///
/// `PermissionDenied` is what a backend reports when the device rejects a
/// request at runtime; it is a result, not a failure of the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferStatus {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "PERMISSION_DENIED")]
    PermissionDenied,
}

/// `{value}` reply of `getConfiguration`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationValue {
    /// Active configuration value, 0 when unconfigured
    pub value: u8,
}

/// `{success}` acknowledgement of a state-changing call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
}

impl CommandResult {
    pub const SUCCESS: CommandResult = CommandResult { success: true };
}

/// Result of a control IN transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlInResult {
    pub status: TransferStatus,
    /// Payload, absent when the request was refused
    pub data: Option<Vec<u8>>,
}

impl ControlInResult {
    pub fn permission_denied() -> Self {
        Self {
            status: TransferStatus::PermissionDenied,
            data: None,
        }
    }
}

/// Result of a bulk IN transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InTransferResult {
    pub status: TransferStatus,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

/// Result of a control or bulk OUT transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutTransferResult {
    pub status: TransferStatus,
    pub bytes_written: u32,
}

impl OutTransferResult {
    pub fn permission_denied() -> Self {
        Self {
            status: TransferStatus::PermissionDenied,
            bytes_written: 0,
        }
    }
}

/// Per-packet result of an isochronous transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IsoPacketResult {
    /// Requested packet length
    pub length: u32,
    /// Bytes actually moved for this packet
    pub transferred_length: u32,
    pub status: TransferStatus,
}

/// Result of an isochronous IN transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsoInResult {
    /// Packet payloads concatenated in request order
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
    pub packets: Vec<IsoPacketResult>,
}

/// Result of an isochronous OUT transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsoOutResult {
    pub packets: Vec<IsoPacketResult>,
}

/// Device summary returned by enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub vendor_id: u16,
    pub product_id: u16,
    pub product_name: Option<String>,
    pub configuration_count: u8,
    /// Active configuration value, 0 when unconfigured
    pub configuration_value: u8,
    pub opened: bool,
}
