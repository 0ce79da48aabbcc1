//! Integration tests for the dispatch protocol
//!
//! Covers the serialized shapes bindings rely on (WebUSB field names and
//! status strings), descriptor input parsing, and framed codec behavior.

use protocol::{
    CURRENT_VERSION, ConfigurationDescriptor, ControlInResult, ControlSetup, DescriptorError,
    DeviceDescriptor, DeviceId, FailureKind, InterfaceDescriptor, IsoPacketResult, Message,
    MessagePayload, Operation, OperationError, OperationReply, OutTransferResult,
    ProtocolError, Recipient, RequestId, TransferStatus,
};
use protocol::{encode_framed, read_framed_async, write_framed_async};
use serde_json::json;

mod serialized_shapes {
    use super::*;

    #[test]
    fn test_control_setup_field_names() {
        let setup: ControlSetup = serde_json::from_value(json!({
            "recipient": "interface",
            "request": 5,
            "value": 300,
            "index": 7
        }))
        .unwrap();

        assert_eq!(setup.recipient, Recipient::Interface);
        assert_eq!(setup.request, 5);
        assert_eq!(setup.value, 300);
        assert_eq!(setup.index, 7);
    }

    #[test]
    fn test_control_setup_rejects_out_of_range_value() {
        let result = serde_json::from_value::<ControlSetup>(json!({
            "recipient": "device",
            "request": 1,
            "value": 70000,
            "index": 0
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(serde_json::to_value(TransferStatus::Ok).unwrap(), json!("ok"));
        assert_eq!(
            serde_json::to_value(TransferStatus::PermissionDenied).unwrap(),
            json!("PERMISSION_DENIED")
        );
    }

    #[test]
    fn test_permission_denied_shape() {
        let value = serde_json::to_value(ControlInResult::permission_denied()).unwrap();
        assert_eq!(value["status"], json!("PERMISSION_DENIED"));
        assert!(value["data"].is_null());
    }

    #[test]
    fn test_out_transfer_shape() {
        let value = serde_json::to_value(OutTransferResult {
            status: TransferStatus::Ok,
            bytes_written: 4,
        })
        .unwrap();
        assert_eq!(value, json!({"status": "ok", "bytesWritten": 4}));
    }

    #[test]
    fn test_iso_packet_shape() {
        let value = serde_json::to_value(IsoPacketResult {
            length: 3,
            transferred_length: 3,
            status: TransferStatus::Ok,
        })
        .unwrap();
        assert_eq!(
            value,
            json!({"length": 3, "transferredLength": 3, "status": "ok"})
        );
    }

    #[test]
    fn test_operation_identifiers() {
        let op: Operation = serde_json::from_value(json!({
            "setInterfaceAlternateSetting": {"interfaceNumber": 1, "alternateSetting": 2}
        }))
        .unwrap();
        assert_eq!(
            op,
            Operation::SetInterfaceAlternateSetting {
                interface_number: 1,
                alternate_setting: 2
            }
        );

        let op: Operation = serde_json::from_value(json!("open")).unwrap();
        assert_eq!(op, Operation::Open);

        let op: Operation = serde_json::from_value(json!({
            "isochronousTransferIn": {"endpointNumber": 1, "packetLengths": [3, 2], "timeoutMs": null}
        }))
        .unwrap();
        assert_eq!(op.name(), "isochronousTransferIn");
    }
}

mod descriptor_input {
    use super::*;

    #[test]
    fn test_parse_json_descriptor() {
        let desc: DeviceDescriptor = serde_json::from_value(json!({
            "configurations": [{
                "configurationValue": 1,
                "interfaces": [{
                    "interfaceNumber": 0,
                    "alternates": [{"alternateSetting": 0}, {"alternateSetting": 1}]
                }]
            }]
        }))
        .unwrap();

        assert!(desc.validate().is_ok());
        assert_eq!(desc.vendor_id, 0);
        let iface = desc.configuration(1).unwrap().interface(0).unwrap();
        assert!(iface.has_alternate(1));
    }

    #[test]
    fn test_parse_toml_descriptor() {
        let desc: DeviceDescriptor = toml::from_str(
            r#"
vendorId = 0x18d1
productId = 0xf00d
productName = "Fake Gadget"

[[configurations]]
configurationValue = 1

[[configurations.interfaces]]
interfaceNumber = 0
alternates = [{ alternateSetting = 0 }]
"#,
        )
        .unwrap();

        assert!(desc.validate().is_ok());
        assert_eq!(desc.vendor_id, 0x18d1);
        assert_eq!(desc.product_name.as_deref(), Some("Fake Gadget"));
    }

    #[test]
    fn test_deserialized_descriptor_needs_validation() {
        let desc: DeviceDescriptor = serde_json::from_value(json!({
            "configurations": [{"configurationValue": 0, "interfaces": []}]
        }))
        .unwrap();
        assert_eq!(
            desc.validate(),
            Err(DescriptorError::ReservedConfigurationValue)
        );
    }

    #[test]
    fn test_builder_matches_parsed() {
        let built = DeviceDescriptor::new(vec![ConfigurationDescriptor::new(
            1,
            vec![InterfaceDescriptor::new(0, [0])],
        )])
        .unwrap();
        let parsed: DeviceDescriptor = serde_json::from_value(json!({
            "configurations": [{
                "configurationValue": 1,
                "interfaces": [{"interfaceNumber": 0, "alternates": [{"alternateSetting": 0}]}]
            }]
        }))
        .unwrap();
        assert_eq!(built, parsed);
    }
}

mod framed_codec {
    use super::*;

    async fn round_trip(msg: &Message) -> Message {
        let framed = encode_framed(msg).unwrap();
        read_framed_async(&mut framed.as_slice()).await.unwrap()
    }

    #[tokio::test]
    async fn test_error_response_through_frame() {
        let msg = Message {
            version: CURRENT_VERSION,
            payload: MessagePayload::OperationResponse {
                id: RequestId(3),
                result: Err(OperationError::new(
                    FailureKind::NotInitialized,
                    "Call initialize() before addFakeDevice().",
                )),
            },
        };

        let decoded = round_trip(&msg).await;
        let MessagePayload::OperationResponse { id, result } = decoded.payload else {
            panic!("Expected OperationResponse payload");
        };
        assert_eq!(id, RequestId(3));
        assert_eq!(result.unwrap_err().kind, FailureKind::NotInitialized);
    }

    #[tokio::test]
    async fn test_several_frames_on_one_stream() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        for id in 1..=3 {
            let msg = Message {
                version: CURRENT_VERSION,
                payload: MessagePayload::OperationRequest {
                    id: RequestId(id),
                    device: DeviceId(1),
                    operation: Operation::Reset,
                },
            };
            write_framed_async(&mut client, &msg).await.unwrap();
        }
        drop(client);

        for expected in 1..=3 {
            let msg = read_framed_async(&mut server).await.unwrap();
            let MessagePayload::OperationRequest { id, .. } = msg.payload else {
                panic!("Expected OperationRequest payload");
            };
            assert_eq!(id, RequestId(expected));
        }
        let err = read_framed_async(&mut server).await.unwrap_err();
        assert!(err.is_eof());
    }

    #[tokio::test]
    async fn test_control_out_payload_survives_frame() {
        let msg = Message {
            version: CURRENT_VERSION,
            payload: MessagePayload::OperationRequest {
                id: RequestId(1),
                device: DeviceId(2),
                operation: Operation::ControlTransferOut {
                    params: ControlSetup::new(Recipient::Device, 9, 1, 0),
                    data: vec![0xde, 0xad, 0xbe, 0xef],
                },
            },
        };

        let decoded = round_trip(&msg).await;
        let MessagePayload::OperationRequest { operation, .. } = decoded.payload else {
            panic!("Expected OperationRequest payload");
        };
        let Operation::ControlTransferOut { data, .. } = operation else {
            panic!("Expected controlTransferOut");
        };
        assert_eq!(data, vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[tokio::test]
    async fn test_truncated_body() {
        let msg = Message {
            version: CURRENT_VERSION,
            payload: MessagePayload::OperationResponse {
                id: RequestId(1),
                result: Ok(OperationReply::Done),
            },
        };
        let mut framed = encode_framed(&msg).unwrap();
        framed.pop();

        let err = read_framed_async(&mut framed.as_slice()).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Io(_)));
        assert!(err.is_eof());
    }
}
