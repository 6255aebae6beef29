//! discoveryd - external capture device discovery daemon
//!
//! Starts the hotplug monitor, subscribes to presence changes and mirrors
//! them on the log until interrupted.

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use extcam_discovery::{DiscoveryConfig, DiscoveryService, PresenceStatus};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = DiscoveryConfig::load()?;
    log::info!(
        "starting discovery: id offset {}, {} internal device(s) suppressed",
        config.id_offset,
        config.internal_devices.len()
    );

    let service = DiscoveryService::start(config);
    service.set_subscriber(Some(Arc::new(
        |identifier: &str, status: PresenceStatus| match status {
            PresenceStatus::Present => log::info!("present: {}", identifier),
            PresenceStatus::NotPresent => log::info!("removed: {}", identifier),
        },
    )));

    let running = Arc::new(AtomicBool::new(true));
    let running_handler = running.clone();
    ctrlc::set_handler(move || running_handler.store(false, Ordering::SeqCst))?;

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));
    }

    log::info!("shutting down");
    service.stop()?;
    Ok(())
}
