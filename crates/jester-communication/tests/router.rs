//! Tests for router::EventRouter

mod common;

use common::{count, fast_config, wait_until, MockDiscovery};
use jester_communication::{
    AccessResult, DeviceEvent, DeviceHandle, EventRouter, Session, SessionPhase,
};
use jester_core::Mode;
use std::sync::Arc;
use std::time::Duration;

fn router() -> (Arc<MockDiscovery>, EventRouter) {
    let discovery = MockDiscovery::new();
    let session = Arc::new(Session::new(discovery.clone(), fast_config()));
    let router = EventRouter::new(session, discovery.clone());
    (discovery, router)
}

fn granted(device: &DeviceHandle) -> DeviceEvent {
    DeviceEvent::PermissionResult {
        device: device.clone(),
        result: AccessResult::Granted,
    }
}

#[test]
fn test_attach_grant_and_startup_report() {
    let (discovery, mut router) = router();
    router.handle(DeviceEvent::Resumed);

    let device = discovery.plug("/dev/ttyACM0");
    router.handle(DeviceEvent::Attached(device.clone()));
    assert_eq!(router.session().phase(), SessionPhase::AwaitingPermission);
    assert_eq!(discovery.access_requests(), vec![device.clone()]);

    discovery.grant("/dev/ttyACM0");
    router.handle(granted(&device));
    let session = router.session().clone();
    assert!(session.is_connected());
    assert_eq!(session.device(), Some(device));

    discovery
        .device("/dev/ttyACM0")
        .unwrap()
        .feed(b"default:both\n");
    assert!(wait_until(|| session.remote_mode() == Some(Mode::Both)));
    assert_eq!(count(&session.log_snapshot(), "Startup mode: Both"), 1);

    router.handle(DeviceEvent::Destroyed);
    assert!(!session.is_connected());
}

#[test]
fn test_resume_connects_to_present_device() {
    let (discovery, mut router) = router();
    discovery.plug("/dev/ttyACM0");
    discovery.grant("/dev/ttyACM0");

    router.handle(DeviceEvent::Resumed);

    assert!(router.is_subscribed());
    assert!(router.session().is_connected());
    assert!(discovery.access_requests().is_empty());
}

#[test]
fn test_resume_without_devices_logs() {
    let (_discovery, mut router) = router();
    router.handle(DeviceEvent::Resumed);

    assert_eq!(router.session().phase(), SessionPhase::Idle);
    assert_eq!(
        count(&router.session().log_snapshot(), "No USB serial drivers found"),
        1
    );
}

#[test]
fn test_resume_while_connected_keeps_session() {
    let (discovery, mut router) = router();
    discovery.plug("/dev/ttyACM0");
    discovery.grant("/dev/ttyACM0");
    router.handle(DeviceEvent::Resumed);
    router.handle(DeviceEvent::Paused);
    router.handle(DeviceEvent::Resumed);

    assert!(router.session().is_connected());
    assert_eq!(discovery.total_opened(), 1);
}

#[test]
fn test_events_before_resume_are_dropped() {
    let (discovery, mut router) = router();
    let device = discovery.plug("/dev/ttyACM0");

    router.handle(DeviceEvent::Attached(device));

    assert!(!router.is_subscribed());
    assert!(discovery.access_requests().is_empty());
    assert_eq!(router.session().phase(), SessionPhase::Idle);
}

#[test]
fn test_paused_router_ignores_hardware_events() {
    let (discovery, mut router) = router();
    router.handle(DeviceEvent::Resumed);
    router.handle(DeviceEvent::Paused);

    let device = discovery.plug("/dev/ttyACM0");
    discovery.grant("/dev/ttyACM0");
    router.handle(DeviceEvent::Attached(device.clone()));
    router.handle(granted(&device));

    assert!(discovery.access_requests().is_empty());
    assert!(!router.session().is_connected());
    assert_eq!(discovery.total_opened(), 0);
}

#[test]
fn test_pause_leaves_connection_open() {
    let (discovery, mut router) = router();
    let device = discovery.plug("/dev/ttyACM0");
    discovery.grant("/dev/ttyACM0");
    router.handle(DeviceEvent::Resumed);
    router.handle(DeviceEvent::Paused);

    // Detach while paused is dropped; the session stays up.
    router.handle(DeviceEvent::Detached(device));
    assert!(router.session().is_connected());
}

#[test]
fn test_detach_mid_read_stops_reading() {
    let (discovery, mut router) = router();
    let device = discovery.plug("/dev/ttyACM0");
    discovery.grant("/dev/ttyACM0");
    router.handle(DeviceEvent::Resumed);

    let mock = discovery.device("/dev/ttyACM0").unwrap();
    assert!(wait_until(|| mock.reads() >= 2));

    discovery.unplug("/dev/ttyACM0");
    router.handle(DeviceEvent::Detached(device));

    let session = router.session();
    assert_eq!(session.phase(), SessionPhase::Idle);
    assert!(!session.is_reading());
    assert!(!mock.is_open());

    let reads = mock.reads();
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(mock.reads(), reads);
    assert_eq!(
        count(&session.log_snapshot(), "Disconnected from USB device"),
        1
    );
}

#[test]
fn test_detach_when_idle_is_harmless() {
    let (discovery, mut router) = router();
    router.handle(DeviceEvent::Resumed);
    let device = discovery.plug("/dev/ttyACM0");

    router.handle(DeviceEvent::Detached(device));

    assert_eq!(router.session().phase(), SessionPhase::Idle);
    assert_eq!(
        count(&router.session().log_snapshot(), "Disconnected from USB device"),
        0
    );
}

#[test]
fn test_second_attach_is_queued_and_replayed() {
    let (discovery, mut router) = router();
    let first = discovery.plug("/dev/ttyACM0");
    discovery.grant("/dev/ttyACM0");
    router.handle(DeviceEvent::Resumed);

    let second = discovery.plug("/dev/ttyACM1");
    discovery.grant("/dev/ttyACM1");
    router.handle(DeviceEvent::Attached(second.clone()));

    assert_eq!(router.pending(), Some(&second));
    assert_eq!(router.session().device(), Some(first.clone()));
    assert_eq!(
        count(
            &router.session().log_snapshot(),
            "Device /dev/ttyACM1 queued until the current device is detached"
        ),
        1
    );

    discovery.unplug("/dev/ttyACM0");
    router.handle(DeviceEvent::Detached(first));

    assert_eq!(router.pending(), None);
    assert_eq!(router.session().phase(), SessionPhase::AwaitingPermission);
    assert_eq!(discovery.access_requests(), vec![second.clone()]);

    router.handle(granted(&second));
    assert!(router.session().is_connected());
    assert_eq!(router.session().device(), Some(second));
    assert_eq!(discovery.max_open(), 1);
}

#[test]
fn test_queued_device_that_detaches_is_forgotten() {
    let (discovery, mut router) = router();
    discovery.plug("/dev/ttyACM0");
    discovery.grant("/dev/ttyACM0");
    router.handle(DeviceEvent::Resumed);

    let second = discovery.plug("/dev/ttyACM1");
    router.handle(DeviceEvent::Attached(second.clone()));
    assert_eq!(router.pending(), Some(&second));

    discovery.unplug("/dev/ttyACM1");
    router.handle(DeviceEvent::Detached(second));

    assert_eq!(router.pending(), None);
    assert!(discovery.access_requests().is_empty());
}

#[test]
fn test_one_transport_across_plug_cycles() {
    let (discovery, mut router) = router();
    router.handle(DeviceEvent::Resumed);

    for round in 0..5 {
        let path = format!("/dev/ttyACM{}", round % 2);
        let device = discovery.plug(&path);
        discovery.grant(&path);
        router.handle(DeviceEvent::Attached(device.clone()));
        router.handle(granted(&device));
        assert!(router.session().is_connected());

        // A stray attach for a second device while connected.
        let stray = discovery.plug("/dev/ttyUSB9");
        router.handle(DeviceEvent::Attached(stray.clone()));
        discovery.unplug("/dev/ttyUSB9");
        router.handle(DeviceEvent::Detached(stray));

        discovery.unplug(&path);
        router.handle(DeviceEvent::Detached(device));
        assert_eq!(discovery.open_now(), 0);
    }

    assert_eq!(discovery.max_open(), 1);
}

#[test]
fn test_permission_denied_leaves_router_idle() {
    let (discovery, mut router) = router();
    router.handle(DeviceEvent::Resumed);
    let device = discovery.plug("/dev/ttyACM0");
    router.handle(DeviceEvent::Attached(device.clone()));

    router.handle(DeviceEvent::PermissionResult {
        device,
        result: AccessResult::Denied,
    });

    assert_eq!(router.session().phase(), SessionPhase::Idle);
    assert_eq!(
        count(
            &router.session().log_snapshot(),
            "USB permission denied for /dev/ttyACM0"
        ),
        1
    );
}

#[test]
fn test_destroy_ignores_later_events() {
    let (discovery, mut router) = router();
    discovery.plug("/dev/ttyACM0");
    discovery.grant("/dev/ttyACM0");
    router.handle(DeviceEvent::Resumed);
    assert!(router.session().is_connected());

    router.handle(DeviceEvent::Destroyed);
    assert!(router.is_destroyed());
    assert!(!router.is_subscribed());
    assert!(!router.session().is_connected());

    router.handle(DeviceEvent::Resumed);
    assert!(!router.is_subscribed());
    assert!(!router.session().is_connected());
    assert_eq!(discovery.total_opened(), 1);
}

#[test]
fn test_run_blocking_drains_channel() {
    let (discovery, router) = router();
    let session = router.session().clone();
    let device = discovery.plug("/dev/ttyACM0");
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

    let worker = std::thread::spawn(move || router.run_blocking(rx));

    tx.send(DeviceEvent::Resumed).unwrap();
    assert!(wait_until(|| session.phase() == SessionPhase::AwaitingPermission));

    discovery.grant("/dev/ttyACM0");
    tx.send(granted(&device)).unwrap();
    assert!(wait_until(|| session.is_connected()));

    tx.send(DeviceEvent::Destroyed).unwrap();
    worker.join().unwrap();

    assert!(!session.is_connected());
    assert!(tx.send(DeviceEvent::Resumed).is_err());
}

#[test]
fn test_run_blocking_shuts_down_when_senders_drop() {
    let (discovery, router) = router();
    let session = router.session().clone();
    discovery.plug("/dev/ttyACM0");
    discovery.grant("/dev/ttyACM0");
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

    tx.send(DeviceEvent::Resumed).unwrap();
    drop(tx);
    router.run_blocking(rx);

    assert!(!session.is_connected());
    assert_eq!(discovery.open_now(), 0);
}
