//! Integration tests for the device registry
//!
//! Tests harness lifecycle and hot-unplug, including:
//! - Initialization order errors
//! - Descriptor validation on add
//! - Deferred disconnect and removal callbacks

use common::test_utils::{DEFAULT_TEST_TIMEOUT, create_mock_descriptor, with_timeout};
use protocol::{ConfigurationDescriptor, DeviceDescriptor, DeviceId, InterfaceDescriptor};
use std::sync::{Arc, Mutex};
use webusb_harness::{HarnessError, HarnessState, UsbTest, bootstrap};

async fn initialized() -> UsbTest {
    let mut harness = UsbTest::new();
    harness.initialize().await;
    harness
}

mod initialization {
    use super::*;

    #[tokio::test]
    async fn test_attach_before_initialize() {
        let mut harness = UsbTest::new();
        let err = harness.attach_to_context().await.unwrap_err();
        assert!(matches!(
            err,
            HarnessError::NotInitialized {
                operation: "attachToContext"
            }
        ));
    }

    #[tokio::test]
    async fn test_add_before_initialize() {
        let mut harness = UsbTest::new();
        let err = harness
            .add_fake_device(create_mock_descriptor())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Call initialize() before addFakeDevice().");
        assert!(harness.is_empty());
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let mut harness = initialized().await;
        harness.add_fake_device(create_mock_descriptor()).await.unwrap();

        harness.initialize().await;
        assert_eq!(harness.state(), HarnessState::Initialized);
        assert_eq!(harness.len(), 1);
    }

    #[tokio::test]
    async fn test_independent_harnesses() {
        let mut first = initialized().await;
        let second = initialized().await;
        first.add_fake_device(create_mock_descriptor()).await.unwrap();

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_bootstrap_adds_fixtures_in_order() {
        let harness = bootstrap([
            create_mock_descriptor().with_ids(0x1111, 0x0001),
            create_mock_descriptor().with_ids(0x2222, 0x0002),
        ])
        .await
        .unwrap();

        let devices = harness.get_devices();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].vendor_id, 0x1111);
        assert_eq!(devices[1].id, DeviceId(2));
    }
}

mod descriptors {
    use super::*;

    #[tokio::test]
    async fn test_invalid_descriptor_rejected() {
        let mut harness = initialized().await;
        let descriptor = DeviceDescriptor {
            configurations: vec![
                ConfigurationDescriptor::new(1, vec![InterfaceDescriptor::new(0, [0])]),
                ConfigurationDescriptor::new(1, vec![InterfaceDescriptor::new(0, [0])]),
            ],
            ..Default::default()
        };

        let err = harness.add_fake_device(descriptor).await.unwrap_err();
        assert!(matches!(err, HarnessError::InvalidDescriptor(_)));
        assert!(harness.is_empty());
    }

    #[tokio::test]
    async fn test_device_without_configurations() {
        let mut harness = initialized().await;
        let id = harness
            .add_fake_device(DeviceDescriptor::default())
            .await
            .unwrap();

        let device = harness.fake_device_mut(id).unwrap();
        device.open().await.unwrap();
        device.set_configuration(1).await.unwrap();
        assert_eq!(device.get_configuration().await.value, 0);
    }
}

mod disconnect {
    use super::*;

    #[tokio::test]
    async fn test_removal_is_deferred() {
        let mut harness = initialized().await;
        let id = harness.add_fake_device(create_mock_descriptor()).await.unwrap();

        harness.disconnect(id).unwrap();
        assert!(harness.contains(id));
        assert_eq!(harness.pending_events(), 1);

        let removed = harness.next_turn().await;
        assert_eq!(removed, vec![id]);
        assert!(!harness.contains(id));
        assert_eq!(harness.pending_events(), 0);
    }

    #[tokio::test]
    async fn test_handle_disconnect() {
        let mut harness = initialized().await;
        let id = harness.add_fake_device(create_mock_descriptor()).await.unwrap();

        harness.device(id).unwrap().disconnect().unwrap();
        assert_eq!(harness.get_devices().len(), 1);

        harness.next_turn().await;
        assert!(harness.get_devices().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_unknown_device() {
        let harness = initialized().await;
        assert!(matches!(
            harness.disconnect(DeviceId(99)),
            Err(HarnessError::DeviceNotFound(DeviceId(99)))
        ));
    }

    #[tokio::test]
    async fn test_double_disconnect_removes_once() {
        let mut harness = initialized().await;
        let id = harness.add_fake_device(create_mock_descriptor()).await.unwrap();

        harness.disconnect(id).unwrap();
        harness.disconnect(id).unwrap();
        assert_eq!(harness.next_turn().await, vec![id]);
    }

    #[tokio::test]
    async fn test_removal_callback() {
        let mut harness = initialized().await;
        let first = harness.add_fake_device(create_mock_descriptor()).await.unwrap();
        let second = harness.add_fake_device(create_mock_descriptor()).await.unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        harness.on_device_removed(move |device| {
            sink.lock().unwrap().push(device.id());
        });

        harness.disconnect(second).unwrap();
        harness.disconnect(first).unwrap();
        assert!(seen.lock().unwrap().is_empty());

        with_timeout(DEFAULT_TEST_TIMEOUT, harness.next_turn())
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![second, first]);
    }

    #[tokio::test]
    async fn test_remaining_devices_keep_state() {
        let mut harness = initialized().await;
        let first = harness.add_fake_device(create_mock_descriptor()).await.unwrap();
        let second = harness.add_fake_device(create_mock_descriptor()).await.unwrap();
        harness.fake_device_mut(second).unwrap().open().await.unwrap();

        harness.disconnect(first).unwrap();
        harness.next_turn().await;

        let devices = harness.get_devices();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].id, second);
        assert!(devices[0].opened);
    }
}
