//! Request/reply messages of the operation dispatch layer
//!
//! Every call a binding makes on a device becomes an [`Operation`] carried in
//! an `OperationRequest`; the host answers with an `OperationResponse`
//! holding either an [`OperationReply`] or an [`OperationError`]. Messages
//! are organized into:
//! - Discovery (get devices)
//! - Device operations (request/response)
//! - Hot-unplug requests and notifications
//! - Protocol errors

use crate::types::{
    CommandResult, ConfigurationValue, ControlInResult, ControlSetup, DeviceId, DeviceInfo,
    InTransferResult, IsoInResult, IsoOutResult, OutTransferResult, RequestId,
};
use crate::version::ProtocolVersion;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level message envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Protocol version of this message
    pub version: ProtocolVersion,
    /// Message payload
    pub payload: MessagePayload,
}

/// All message types exchanged with the dispatch host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MessagePayload {
    /// Request list of attached fake devices
    GetDevicesRequest,

    /// Response containing every attached device
    GetDevicesResponse { devices: Vec<DeviceInfo> },

    /// Apply one operation to one device
    OperationRequest {
        id: RequestId,
        device: DeviceId,
        operation: Operation,
    },

    /// Completion of an `OperationRequest`
    OperationResponse {
        id: RequestId,
        result: Result<OperationReply, OperationError>,
    },

    /// Simulate hot-unplug of a device; removal is reported later by a
    /// `DeviceRemovedNotification`
    DisconnectRequest { device_id: DeviceId },

    /// A device was removed after a disconnect
    DeviceRemovedNotification { device_id: DeviceId },

    /// Protocol-level error message
    Error { message: String },
}

/// A device operation, named after the binding's call surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Operation {
    Open,
    Close,
    GetConfiguration,
    SetConfiguration {
        value: u8,
    },
    ClaimInterface {
        interface_number: u8,
    },
    ReleaseInterface {
        interface_number: u8,
    },
    SetInterfaceAlternateSetting {
        interface_number: u8,
        alternate_setting: u8,
    },
    Reset,
    ClearHalt {
        endpoint: u8,
    },
    ControlTransferIn {
        params: ControlSetup,
        length: u16,
    },
    ControlTransferOut {
        params: ControlSetup,
        #[serde(with = "serde_bytes")]
        data: Vec<u8>,
    },
    IsochronousTransferIn {
        endpoint_number: u8,
        packet_lengths: Vec<u32>,
        /// Accepted for parity with real backends, never enforced
        timeout_ms: Option<u32>,
    },
    IsochronousTransferOut {
        endpoint_number: u8,
        #[serde(with = "serde_bytes")]
        data: Vec<u8>,
        packet_lengths: Vec<u32>,
        timeout_ms: Option<u32>,
    },
    TransferIn {
        endpoint_number: u8,
        length: u32,
    },
    TransferOut {
        endpoint_number: u8,
        #[serde(with = "serde_bytes")]
        data: Vec<u8>,
    },
}

impl Operation {
    /// Call-surface identifier of this operation
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Open => "open",
            Operation::Close => "close",
            Operation::GetConfiguration => "getConfiguration",
            Operation::SetConfiguration { .. } => "setConfiguration",
            Operation::ClaimInterface { .. } => "claimInterface",
            Operation::ReleaseInterface { .. } => "releaseInterface",
            Operation::SetInterfaceAlternateSetting { .. } => "setInterfaceAlternateSetting",
            Operation::Reset => "reset",
            Operation::ClearHalt { .. } => "clearHalt",
            Operation::ControlTransferIn { .. } => "controlTransferIn",
            Operation::ControlTransferOut { .. } => "controlTransferOut",
            Operation::IsochronousTransferIn { .. } => "isochronousTransferIn",
            Operation::IsochronousTransferOut { .. } => "isochronousTransferOut",
            Operation::TransferIn { .. } => "transferIn",
            Operation::TransferOut { .. } => "transferOut",
        }
    }
}

/// Successful result of an operation, one variant per reply shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationReply {
    /// `open`/`close` complete without a payload
    Done,
    Configuration(ConfigurationValue),
    Command(CommandResult),
    ControlIn(ControlInResult),
    In(InTransferResult),
    Out(OutTransferResult),
    IsochronousIn(IsoInResult),
    IsochronousOut(IsoOutResult),
}

/// Category of a failed operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    /// The caller violated a device precondition
    Precondition,
    /// No device with the requested id is attached
    DeviceNotFound,
    /// The harness was used before `initialize()`
    NotInitialized,
}

/// Failed operation, surfaced to the caller as a thrown error
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct OperationError {
    pub kind: FailureKind,
    pub message: String,
}

impl OperationError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Recipient;
    use crate::version::CURRENT_VERSION;

    #[test]
    fn test_message_construction() {
        let msg = Message {
            version: CURRENT_VERSION,
            payload: MessagePayload::OperationRequest {
                id: RequestId(1),
                device: DeviceId(3),
                operation: Operation::ClaimInterface {
                    interface_number: 0,
                },
            },
        };

        assert_eq!(msg.version, CURRENT_VERSION);
        assert!(matches!(
            msg.payload,
            MessagePayload::OperationRequest { .. }
        ));
    }

    #[test]
    fn test_operation_names() {
        assert_eq!(Operation::Open.name(), "open");
        assert_eq!(
            Operation::SetInterfaceAlternateSetting {
                interface_number: 0,
                alternate_setting: 1
            }
            .name(),
            "setInterfaceAlternateSetting"
        );
        assert_eq!(
            Operation::ControlTransferIn {
                params: ControlSetup::new(Recipient::Device, 5, 300, 7),
                length: 10
            }
            .name(),
            "controlTransferIn"
        );
    }

    #[test]
    fn test_operation_error_display() {
        let err = OperationError::new(FailureKind::Precondition, "The device must be opened first.");
        assert_eq!(err.to_string(), "The device must be opened first.");
        assert_eq!(err.kind, FailureKind::Precondition);
    }
}
