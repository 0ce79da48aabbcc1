//! Operation dispatch
//!
//! Applies [`Operation`]s to devices in a [`UsbTest`] and answers framed
//! protocol messages. Device precondition failures come back as
//! [`OperationError`]s; permission refusals stay inside the successful reply.
//!
//! [`serve`] drains the harness event queue after every request, so a
//! `DisconnectRequest` is answered by a `DeviceRemovedNotification` only
//! after the request that caused it has been handled.

use crate::usb::{DeviceError, HarnessError, UsbTest};
use protocol::{
    CURRENT_VERSION, DeviceId, FailureKind, Message, MessagePayload, Operation, OperationError,
    OperationReply, ProtocolError, read_framed_async, validate_version, write_framed_async,
};
use serde_json::Value;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

impl From<DeviceError> for OperationError {
    fn from(err: DeviceError) -> Self {
        OperationError::new(FailureKind::Precondition, err.to_string())
    }
}

impl From<HarnessError> for OperationError {
    fn from(err: HarnessError) -> Self {
        let kind = match err {
            HarnessError::NotInitialized { .. } => FailureKind::NotInitialized,
            HarnessError::DeviceNotFound(_) => FailureKind::DeviceNotFound,
            HarnessError::InvalidDescriptor(_) | HarnessError::Events(_) => {
                FailureKind::Precondition
            }
        };
        OperationError::new(kind, err.to_string())
    }
}

/// Apply one operation to one device
pub async fn execute(
    harness: &mut UsbTest,
    device_id: DeviceId,
    operation: Operation,
) -> Result<OperationReply, OperationError> {
    if !harness.is_initialized() {
        return Err(HarnessError::NotInitialized {
            operation: operation.name(),
        }
        .into());
    }

    let name = operation.name();
    debug!("Dispatching {} to device {:?}", name, device_id);
    let device = harness.fake_device_mut(device_id)?;

    let reply = match operation {
        Operation::Open => device.open().await.map(|()| OperationReply::Done),
        Operation::Close => device.close().await.map(|()| OperationReply::Done),
        Operation::GetConfiguration => {
            Ok(OperationReply::Configuration(device.get_configuration().await))
        }
        Operation::SetConfiguration { value } => device
            .set_configuration(value)
            .await
            .map(OperationReply::Command),
        Operation::ClaimInterface { interface_number } => device
            .claim_interface(interface_number)
            .await
            .map(OperationReply::Command),
        Operation::ReleaseInterface { interface_number } => device
            .release_interface(interface_number)
            .await
            .map(OperationReply::Command),
        Operation::SetInterfaceAlternateSetting {
            interface_number,
            alternate_setting,
        } => device
            .set_interface_alternate_setting(interface_number, alternate_setting)
            .await
            .map(OperationReply::Command),
        Operation::Reset => device.reset().await.map(OperationReply::Command),
        Operation::ClearHalt { endpoint } => device
            .clear_halt(endpoint)
            .await
            .map(OperationReply::Command),
        Operation::ControlTransferIn { params, length } => device
            .control_transfer_in(&params, length)
            .await
            .map(OperationReply::ControlIn),
        Operation::ControlTransferOut { params, data } => device
            .control_transfer_out(&params, &data)
            .await
            .map(OperationReply::Out),
        Operation::IsochronousTransferIn {
            endpoint_number,
            packet_lengths,
            timeout_ms,
        } => device
            .isochronous_transfer_in(endpoint_number, &packet_lengths, timeout(timeout_ms))
            .await
            .map(OperationReply::IsochronousIn),
        Operation::IsochronousTransferOut {
            endpoint_number,
            data,
            packet_lengths,
            timeout_ms,
        } => device
            .isochronous_transfer_out(
                endpoint_number,
                &data,
                &packet_lengths,
                timeout(timeout_ms),
            )
            .await
            .map(OperationReply::IsochronousOut),
        Operation::TransferIn {
            endpoint_number,
            length,
        } => device
            .transfer_in(endpoint_number, length)
            .await
            .map(OperationReply::In),
        Operation::TransferOut {
            endpoint_number,
            data,
        } => device
            .transfer_out(endpoint_number, &data)
            .await
            .map(OperationReply::Out),
    };

    if let Err(e) = &reply {
        debug!("{} on device {:?} failed: {}", name, device_id, e);
    }
    reply.map_err(OperationError::from)
}

fn timeout(timeout_ms: Option<u32>) -> Option<Duration> {
    timeout_ms.map(|ms| Duration::from_millis(u64::from(ms)))
}

/// JSON body of a reply as a binding would see it
///
/// `open`/`close` yield `null`, and a refused control IN carries no `data`
/// key.
pub fn reply_body(reply: &OperationReply) -> serde_json::Result<Value> {
    match reply {
        OperationReply::Done => Ok(Value::Null),
        OperationReply::Configuration(r) => serde_json::to_value(r),
        OperationReply::Command(r) => serde_json::to_value(r),
        OperationReply::ControlIn(r) => {
            let mut body = serde_json::to_value(r)?;
            if let Value::Object(fields) = &mut body {
                if fields.get("data").is_some_and(Value::is_null) {
                    fields.remove("data");
                }
            }
            Ok(body)
        }
        OperationReply::In(r) => serde_json::to_value(r),
        OperationReply::Out(r) => serde_json::to_value(r),
        OperationReply::IsochronousIn(r) => serde_json::to_value(r),
        OperationReply::IsochronousOut(r) => serde_json::to_value(r),
    }
}

fn envelope(payload: MessagePayload) -> Message {
    Message {
        version: CURRENT_VERSION,
        payload,
    }
}

/// Answer one protocol message
///
/// Returns the reply, or `None` for messages that are acknowledged later
/// (a successful `DisconnectRequest`).
pub async fn handle_message(harness: &mut UsbTest, message: Message) -> Option<Message> {
    if let Err(e) = validate_version(&message.version) {
        warn!("Rejecting message: {}", e);
        return Some(envelope(MessagePayload::Error {
            message: e.to_string(),
        }));
    }

    match message.payload {
        MessagePayload::GetDevicesRequest => Some(envelope(MessagePayload::GetDevicesResponse {
            devices: harness.get_devices(),
        })),

        MessagePayload::OperationRequest {
            id,
            device,
            operation,
        } => {
            let result = execute(harness, device, operation).await;
            Some(envelope(MessagePayload::OperationResponse { id, result }))
        }

        MessagePayload::DisconnectRequest { device_id } => match harness.disconnect(device_id) {
            Ok(()) => None,
            Err(e) => Some(envelope(MessagePayload::Error {
                message: e.to_string(),
            })),
        },

        other => {
            warn!("Unexpected message from client: {:?}", other);
            Some(envelope(MessagePayload::Error {
                message: "Unexpected message type".to_string(),
            }))
        }
    }
}

/// Answer framed requests until the reader reaches end of stream
///
/// Returns the number of messages handled.
pub async fn serve<R, W>(
    harness: &mut UsbTest,
    reader: &mut R,
    writer: &mut W,
) -> protocol::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info!("Serving framed requests");
    let mut handled = 0u64;

    loop {
        let message = match read_framed_async(reader).await {
            Ok(message) => message,
            Err(e) if e.is_eof() => break,
            Err(e) => return Err(e),
        };
        handled += 1;

        if let Some(reply) = handle_message(harness, message).await {
            send_reply(writer, &reply).await?;
        }

        for device_id in harness.next_turn().await {
            write_framed_async(
                writer,
                &envelope(MessagePayload::DeviceRemovedNotification { device_id }),
            )
            .await?;
        }
    }

    info!("Request stream closed after {} message(s)", handled);
    Ok(handled)
}

/// Write `reply`, or an `Error` message in its place when it cannot be
/// encoded into one frame
///
/// Encoding happens before any byte is written, so a rejected reply leaves
/// the stream intact.
async fn send_reply<W>(writer: &mut W, reply: &Message) -> protocol::Result<()>
where
    W: AsyncWrite + Unpin,
{
    match write_framed_async(writer, reply).await {
        Err(e @ (ProtocolError::FrameTooLarge { .. } | ProtocolError::Serialization(_))) => {
            warn!("Reply could not be framed: {}", e);
            write_framed_async(
                writer,
                &envelope(MessagePayload::Error {
                    message: e.to_string(),
                }),
            )
            .await
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::create_mock_descriptor;

    #[tokio::test]
    async fn test_execute_before_initialize() {
        let mut harness = UsbTest::new();
        let err = execute(&mut harness, DeviceId(1), Operation::Open)
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::NotInitialized);
        assert_eq!(err.message, "Call initialize() before open().");
    }

    #[tokio::test]
    async fn test_execute_unknown_device() {
        let mut harness = UsbTest::new();
        harness.initialize().await;
        let err = execute(&mut harness, DeviceId(42), Operation::Reset)
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::DeviceNotFound);
    }

    #[tokio::test]
    async fn test_precondition_maps_to_error() {
        let mut harness = UsbTest::new();
        harness.initialize().await;
        let id = harness
            .add_fake_device(create_mock_descriptor())
            .await
            .unwrap();

        let err = execute(&mut harness, id, Operation::Close)
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::Precondition);
        assert_eq!(err.message, "The device must be opened first.");
    }

    #[test]
    fn test_reply_body_shapes() {
        assert_eq!(reply_body(&OperationReply::Done).unwrap(), Value::Null);

        let body = reply_body(&OperationReply::Out(protocol::OutTransferResult {
            status: protocol::TransferStatus::Ok,
            bytes_written: 3,
        }))
        .unwrap();
        assert_eq!(body, serde_json::json!({"status": "ok", "bytesWritten": 3}));
    }

    #[test]
    fn test_denied_control_in_has_no_data_key() {
        let body = reply_body(&OperationReply::ControlIn(
            protocol::ControlInResult::permission_denied(),
        ))
        .unwrap();
        assert_eq!(body, serde_json::json!({"status": "PERMISSION_DENIED"}));

        let body = reply_body(&OperationReply::ControlIn(protocol::ControlInResult {
            status: protocol::TransferStatus::Ok,
            data: Some(vec![1, 2]),
        }))
        .unwrap();
        assert_eq!(body, serde_json::json!({"status": "ok", "data": [1, 2]}));
    }

    #[tokio::test]
    async fn test_unframeable_reply_becomes_error() {
        let reply = envelope(MessagePayload::OperationResponse {
            id: protocol::RequestId(1),
            result: Ok(OperationReply::In(protocol::InTransferResult {
                status: protocol::TransferStatus::Ok,
                data: vec![0; protocol::MAX_FRAME_SIZE + 1],
            })),
        });

        let mut output: Vec<u8> = Vec::new();
        send_reply(&mut output, &reply).await.unwrap();

        let written = read_framed_async(&mut output.as_slice()).await.unwrap();
        assert!(matches!(written.payload, MessagePayload::Error { .. }));
    }

    #[tokio::test]
    async fn test_incompatible_version_rejected() {
        let mut harness = UsbTest::new();
        let message = Message {
            version: protocol::ProtocolVersion {
                major: 9,
                minor: 0,
                patch: 0,
            },
            payload: MessagePayload::GetDevicesRequest,
        };

        let reply = handle_message(&mut harness, message).await.unwrap();
        assert!(matches!(reply.payload, MessagePayload::Error { .. }));
    }
}
