//! Facade lifecycle against the real device directory. No capture hardware
//! is assumed present; these tests only exercise the paths that hold either
//! way: subscriber handling, identifier validation and clean shutdown.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use extcam_discovery::{DiscoveryConfig, DiscoveryService, PresenceStatus};

fn test_config() -> DiscoveryConfig {
    DiscoveryConfig {
        id_offset: 0,
        internal_devices: HashSet::new(),
        usb_settle: Duration::from_millis(1),
        hdmi_settle: Duration::from_millis(1),
    }
}

#[test]
fn list_is_empty_by_design() {
    let service = DiscoveryService::start(test_config());
    assert!(service.list_known_identifiers().is_empty());
    service.stop().expect("clean stop");
}

#[test]
fn malformed_identifiers_do_not_resolve() {
    let service = DiscoveryService::start(test_config());
    assert!(service.resolve("").is_err());
    assert!(service.resolve("video3").is_err());
    assert!(service.resolve("device@1.1/external/oops").is_err());
    service.stop().expect("clean stop");
}

#[test]
fn unknown_identifier_does_not_resolve() {
    let service = DiscoveryService::start(test_config());
    // Well-formed, but never announced by the monitor.
    assert!(service.resolve("device@1.1/external/9999999").is_err());
    service.stop().expect("clean stop");
}

#[test]
fn subscriber_can_be_set_and_cleared() {
    let service = DiscoveryService::start(test_config());
    let sink: extcam_discovery::PresenceSink =
        Arc::new(|_id: &str, _status: PresenceStatus| {});
    service.set_subscriber(Some(sink));
    service.set_subscriber(None);
    service.stop().expect("clean stop");
}

#[test]
fn dropping_the_service_joins_the_monitor() {
    let service = DiscoveryService::start(test_config());
    drop(service);
}
