//! Printer session integration tests
//!
//! Exercises the session state machine against the mock USB bus:
//! - connect/disconnect lifecycle and kernel driver restoration
//! - precondition failures without USB side effects
//! - claim failures at every stage
//! - release failure and the degraded state
//!
//! Run with: `cargo test -p printer --test session_tests`

use common::test_utils::{ESC_POS_INIT, create_mock_print_data};
use printer::test_utils::{MockBus, MockDeviceSpec, UsbCall};
use printer::usb::EndpointInfo;
use printer::{
    ClaimStage, ConnectOptions, ConnectionState, PrinterConfig, PrinterError, PrinterEvent,
    PrinterSession, UsbError,
};
use proptest::prelude::*;
use tokio::sync::broadcast;

fn new_session(
    bus: &MockBus,
    config: PrinterConfig,
) -> (PrinterSession<MockBus>, broadcast::Receiver<PrinterEvent>) {
    let (tx, rx) = broadcast::channel(16);
    (PrinterSession::new(bus.clone(), config, tx), rx)
}

fn drain(rx: &mut broadcast::Receiver<PrinterEvent>) -> Vec<PrinterEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ============================================================================
// Lifecycle
// ============================================================================

mod lifecycle {
    use super::*;

    #[test]
    fn test_connect_disconnect_round_trip() {
        let bus = MockBus::with_printer(0x04b8, 0x0202);
        let (mut session, mut rx) = new_session(&bus, PrinterConfig::default());

        session.connect(ConnectOptions::default()).unwrap();
        session.disconnect().unwrap();

        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(session.target().is_none());
        assert_eq!(bus.open_handles(), 0);
        assert_eq!(
            drain(&mut rx),
            vec![
                PrinterEvent::Connected {
                    vendor_id: 0x04b8,
                    product_id: 0x0202,
                },
                PrinterEvent::Disconnected,
            ]
        );
    }

    #[test]
    fn test_kernel_driver_state_restored() {
        let bus = MockBus::with_printer(0x04b8, 0x0202);
        let (mut session, _rx) = new_session(&bus, PrinterConfig::default());

        assert!(bus.kernel_driver_bound());
        session.connect(ConnectOptions::default()).unwrap();
        assert!(!bus.kernel_driver_bound());
        session.disconnect().unwrap();
        assert!(bus.kernel_driver_bound());
    }

    #[test]
    fn test_kernel_driver_not_attached_when_never_bound() {
        let bus = MockBus::with_printer(0x04b8, 0x0202);
        bus.unbind_kernel_driver();
        let (mut session, _rx) = new_session(&bus, PrinterConfig::default());

        session.connect(ConnectOptions::default()).unwrap();
        session.disconnect().unwrap();

        assert!(!bus.kernel_driver_bound());
        assert_eq!(bus.count(&UsbCall::AttachKernelDriver(0)), 0);
    }

    #[test]
    fn test_teardown_order() {
        let bus = MockBus::with_printer(0x04b8, 0x0202);
        let (mut session, _rx) = new_session(&bus, PrinterConfig::default());

        session.connect(ConnectOptions::default()).unwrap();
        session.print(&ESC_POS_INIT).unwrap();
        session.disconnect().unwrap();

        assert_eq!(
            bus.calls(),
            vec![
                UsbCall::Open,
                UsbCall::KernelDriverActive(0),
                UsbCall::DetachKernelDriver(0),
                UsbCall::ClaimInterface(0),
                UsbCall::WriteBulk {
                    endpoint: 0x01,
                    data: ESC_POS_INIT.to_vec(),
                },
                UsbCall::ReleaseInterface(0),
                UsbCall::AttachKernelDriver(0),
                UsbCall::Close,
            ]
        );
    }

    #[test]
    fn test_reconnect_after_disconnect() {
        let bus = MockBus::with_printer(0x04b8, 0x0202);
        let (mut session, _rx) = new_session(&bus, PrinterConfig::default());

        for _ in 0..3 {
            session.connect(ConnectOptions::default()).unwrap();
            session.print(&ESC_POS_INIT).unwrap();
            session.disconnect().unwrap();
        }

        assert_eq!(bus.count(&UsbCall::ClaimInterface(0)), 3);
        assert_eq!(bus.writes(0x01).len(), 3);
        assert_eq!(bus.open_handles(), 0);
    }

    #[test]
    fn test_claimed_exactly_once_per_connect() {
        let bus = MockBus::with_printer(0x04b8, 0x0202);
        let (mut session, _rx) = new_session(&bus, PrinterConfig::default());

        session.connect(ConnectOptions::default()).unwrap();
        for _ in 0..3 {
            assert_eq!(
                session.connect(ConnectOptions::default()),
                Err(PrinterError::AlreadyConnected)
            );
        }
        session.print(&ESC_POS_INIT).unwrap();

        assert_eq!(bus.count(&UsbCall::ClaimInterface(0)), 1);
        assert_eq!(bus.claimed(), vec![0]);
    }
}

// ============================================================================
// Preconditions
// ============================================================================

mod preconditions {
    use super::*;

    #[test]
    fn test_print_while_disconnected_has_no_side_effects() {
        let bus = MockBus::with_printer(0x04b8, 0x0202);
        let (mut session, mut rx) = new_session(&bus, PrinterConfig::default());

        assert_eq!(session.print(&ESC_POS_INIT), Err(PrinterError::NotConnected));
        assert!(bus.calls().is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_print_after_disconnect_fails() {
        let bus = MockBus::with_printer(0x04b8, 0x0202);
        let (mut session, _rx) = new_session(&bus, PrinterConfig::default());

        session.connect(ConnectOptions::default()).unwrap();
        session.disconnect().unwrap();

        assert_eq!(session.print(&ESC_POS_INIT), Err(PrinterError::NotConnected));
        assert_eq!(bus.write_count(), 0);
    }

    #[test]
    fn test_disconnect_while_disconnected() {
        let bus = MockBus::with_printer(0x04b8, 0x0202);
        let (mut session, mut rx) = new_session(&bus, PrinterConfig::default());

        assert_eq!(session.disconnect(), Err(PrinterError::NotConnected));
        assert!(drain(&mut rx).is_empty());
    }
}

// ============================================================================
// Connect failures
// ============================================================================

mod connect_failures {
    use super::*;

    fn assert_claim_failure(bus: MockBus, stage: ClaimStage, source: UsbError) {
        let (mut session, mut rx) = new_session(&bus, PrinterConfig::default());

        let err = session.connect(ConnectOptions::default()).unwrap_err();
        assert_eq!(err, PrinterError::Claim { stage, source });
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(bus.open_handles(), 0);
        assert!(bus.claimed().is_empty());
        assert!(bus.kernel_driver_bound());
    }

    #[test]
    fn test_no_matching_device() {
        let bus = MockBus::with_printer(0x0416, 0x5011);
        let (mut session, mut rx) = new_session(&bus, PrinterConfig::default());

        let err = session.connect(ConnectOptions::default()).unwrap_err();
        assert_eq!(
            err,
            PrinterError::NotFound {
                vendor_id: 0x04b8,
                product_id: 0x0202,
            }
        );
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(bus.calls().is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_open_failure() {
        let bus = MockBus::with_printer(0x04b8, 0x0202);
        bus.fail(|f| f.open = Some(UsbError::Access));
        assert_claim_failure(bus, ClaimStage::Open, UsbError::Access);
    }

    #[test]
    fn test_missing_interface() {
        let mut spec = MockDeviceSpec::printer(0x04b8, 0x0202);
        spec.interface = 1;
        let bus = MockBus::with_devices(vec![spec]);
        assert_claim_failure(bus, ClaimStage::SelectInterface, UsbError::NotFound);
    }

    #[test]
    fn test_kernel_driver_query_failure() {
        let bus = MockBus::with_printer(0x04b8, 0x0202);
        bus.fail(|f| f.kernel_driver_query = Some(UsbError::NoDevice));
        assert_claim_failure(bus, ClaimStage::DetachKernelDriver, UsbError::NoDevice);
    }

    #[test]
    fn test_detach_failure() {
        let bus = MockBus::with_printer(0x04b8, 0x0202);
        bus.fail(|f| f.detach = Some(UsbError::Access));
        assert_claim_failure(bus, ClaimStage::DetachKernelDriver, UsbError::Access);
    }

    #[test]
    fn test_claim_failure_restores_kernel_driver() {
        let bus = MockBus::with_printer(0x04b8, 0x0202);
        bus.fail(|f| f.claim = Some(UsbError::Busy));
        assert_claim_failure(bus, ClaimStage::Claim, UsbError::Busy);
    }

    #[test]
    fn test_enumeration_failure() {
        let bus = MockBus::with_printer(0x04b8, 0x0202);
        bus.fail(|f| f.enumerate = Some(UsbError::Io));
        let (mut session, _rx) = new_session(&bus, PrinterConfig::default());

        assert_eq!(
            session.connect(ConnectOptions::default()),
            Err(PrinterError::Usb(UsbError::Io))
        );
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_session_usable_after_failed_connect() {
        let bus = MockBus::with_printer(0x04b8, 0x0202);
        bus.fail(|f| f.claim = Some(UsbError::Busy));
        let (mut session, _rx) = new_session(&bus, PrinterConfig::default());

        assert!(session.connect(ConnectOptions::default()).is_err());
        bus.fail(|f| f.claim = None);
        assert!(session.connect(ConnectOptions::default()).is_ok());
        assert_eq!(session.state(), ConnectionState::Connected);
    }
}

// ============================================================================
// Printing
// ============================================================================

mod printing {
    use super::*;

    #[test]
    fn test_endpoint_override_used_for_prints() {
        let mut spec = MockDeviceSpec::printer(0x04b8, 0x0202);
        spec.endpoints = vec![EndpointInfo::bulk_out(0x01), EndpointInfo::bulk_out(0x03)];
        let bus = MockBus::with_devices(vec![spec]);
        let (mut session, _rx) = new_session(&bus, PrinterConfig::default());

        session
            .connect(ConnectOptions::default().endpoint(3))
            .unwrap();
        session.print(&ESC_POS_INIT).unwrap();

        assert_eq!(bus.written(0x03), ESC_POS_INIT.to_vec());
        assert!(bus.written(0x01).is_empty());
    }

    #[test]
    fn test_large_job_single_write() {
        let bus = MockBus::with_printer(0x04b8, 0x0202);
        let (mut session, _rx) = new_session(&bus, PrinterConfig::default());
        let data = create_mock_print_data(64 * 1024);

        session.connect(ConnectOptions::default()).unwrap();
        assert_eq!(session.print(&data), Ok(data.len()));
        assert_eq!(bus.writes(0x01), vec![data]);
    }

    #[test]
    fn test_missing_endpoint_reported() {
        let bus = MockBus::with_printer(0x04b8, 0x0202);
        let (mut session, mut rx) =
            new_session(&bus, PrinterConfig::new(0x04b8, 0x0202, 5));

        session.connect(ConnectOptions::default()).unwrap();
        let _ = drain(&mut rx);

        let err = session.print(&ESC_POS_INIT).unwrap_err();
        assert_eq!(
            err,
            PrinterError::Transfer {
                endpoint: 5,
                source: UsbError::NotFound,
            }
        );
        assert_eq!(drain(&mut rx), vec![PrinterEvent::Error(err)]);
        assert_eq!(bus.write_count(), 0);
    }

    #[test]
    fn test_short_write_reported() {
        let bus = MockBus::with_printer(0x04b8, 0x0202);
        let (mut session, _rx) = new_session(&bus, PrinterConfig::default());
        session.connect(ConnectOptions::default()).unwrap();
        bus.fail(|f| f.short_write = Some(1));

        assert_eq!(
            session.print(&ESC_POS_INIT),
            Err(PrinterError::ShortWrite {
                written: 1,
                expected: 2,
            })
        );
        assert_eq!(session.state(), ConnectionState::Connected);
    }
}

// ============================================================================
// Release failure
// ============================================================================

mod release_failure {
    use super::*;

    #[test]
    fn test_release_error_surfaced_once() {
        let bus = MockBus::with_printer(0x04b8, 0x0202);
        let (mut session, mut rx) = new_session(&bus, PrinterConfig::default());
        session.connect(ConnectOptions::default()).unwrap();
        let _ = drain(&mut rx);
        bus.fail(|f| f.release = Some(UsbError::Busy));

        let err = session.disconnect().unwrap_err();
        assert!(matches!(err, PrinterError::Release { interface: 0, .. }));
        assert_eq!(drain(&mut rx), vec![PrinterEvent::Error(err)]);
        assert_eq!(session.state(), ConnectionState::Degraded);
    }

    #[test]
    fn test_degraded_requires_force_close() {
        let bus = MockBus::with_printer(0x04b8, 0x0202);
        let (mut session, mut rx) = new_session(&bus, PrinterConfig::default());
        session.connect(ConnectOptions::default()).unwrap();
        bus.fail(|f| f.release = Some(UsbError::Busy));
        let _ = session.disconnect();
        let _ = drain(&mut rx);

        assert_eq!(session.print(&ESC_POS_INIT), Err(PrinterError::Degraded));
        assert_eq!(session.disconnect(), Err(PrinterError::Degraded));
        assert_eq!(
            session.connect(ConnectOptions::default()),
            Err(PrinterError::Degraded)
        );
        assert!(drain(&mut rx).is_empty());

        session.force_close().unwrap();
        assert_eq!(drain(&mut rx), vec![PrinterEvent::Disconnected]);
        assert_eq!(bus.open_handles(), 0);

        // Device is usable again once the release problem is gone
        bus.fail(|f| f.release = None);
        session.connect(ConnectOptions::default()).unwrap();
        session.disconnect().unwrap();
    }

    #[test]
    fn test_force_close_while_connected() {
        let bus = MockBus::with_printer(0x04b8, 0x0202);
        let (mut session, _rx) = new_session(&bus, PrinterConfig::default());
        session.connect(ConnectOptions::default()).unwrap();

        session.force_close().unwrap();

        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(bus.kernel_driver_bound());
        assert_eq!(bus.open_handles(), 0);
    }

    #[test]
    fn test_dropping_degraded_session_closes_device() {
        let bus = MockBus::with_printer(0x04b8, 0x0202);
        let (mut session, _rx) = new_session(&bus, PrinterConfig::default());
        session.connect(ConnectOptions::default()).unwrap();
        bus.fail(|f| f.release = Some(UsbError::Busy));
        let _ = session.disconnect();

        drop(session);
        assert_eq!(bus.open_handles(), 0);
    }
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_connect_disconnect_leaves_no_handle(
        vendor_id in any::<u16>(),
        product_id in any::<u16>(),
        endpoint in 1u8..=15,
    ) {
        let mut spec = MockDeviceSpec::printer(vendor_id, product_id);
        spec.endpoints = vec![EndpointInfo::bulk_out(endpoint)];
        let bus = MockBus::with_devices(vec![spec]);
        let (mut session, _rx) = new_session(&bus, PrinterConfig::new(vendor_id, product_id, endpoint));

        session.connect(ConnectOptions::default()).unwrap();
        prop_assert_eq!(session.print(&ESC_POS_INIT), Ok(2));
        session.disconnect().unwrap();

        prop_assert_eq!(session.state(), ConnectionState::Disconnected);
        prop_assert!(session.target().is_none());
        prop_assert_eq!(bus.open_handles(), 0);
        prop_assert!(bus.kernel_driver_bound());
        prop_assert_eq!(bus.written(endpoint), ESC_POS_INIT.to_vec());
    }
}
