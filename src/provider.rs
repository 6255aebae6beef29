//! Discovery facade.
//!
//! The thin surface consumed by the interface translation layer: it owns the
//! presence table and the hotplug monitor, forwards subscriber changes, and
//! resolves logical identifiers back to node paths for device-controller
//! construction. All facade calls are lock-bounded and fast; device probing
//! never happens on a caller thread.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::config::DiscoveryConfig;
use crate::monitor::{HotplugMonitor, MonitorHandle};
use crate::naming;
use crate::presence::{PresenceSink, PresenceTable};

pub struct DiscoveryService {
    table: Arc<PresenceTable>,
    id_offset: u32,
    monitor: Option<MonitorHandle>,
}

impl DiscoveryService {
    /// Build the presence table and start the background monitor.
    pub fn start(config: DiscoveryConfig) -> Self {
        let table = Arc::new(PresenceTable::new());
        let monitor = HotplugMonitor::new(&config, table.clone()).spawn();
        Self {
            table,
            id_offset: config.id_offset,
            monitor: Some(monitor),
        }
    }

    #[cfg(test)]
    fn with_table(table: Arc<PresenceTable>, id_offset: u32) -> Self {
        Self {
            table,
            id_offset,
            monitor: None,
        }
    }

    /// Replace the subscriber; a non-empty sink receives a full replay of the
    /// current presence table before this returns.
    pub fn set_subscriber(&self, sink: Option<PresenceSink>) {
        self.table.set_subscriber(sink);
    }

    /// Always empty: devices are announced by push notification only, never
    /// pulled through a list call.
    pub fn list_known_identifiers(&self) -> Vec<String> {
        Vec::new()
    }

    /// Resolve a logical identifier to the node path a device controller
    /// should be constructed from. Fails for identifiers this subsystem does
    /// not recognize and for devices not currently present.
    pub fn resolve(&self, identifier: &str) -> Result<PathBuf> {
        let parsed = naming::parse_identifier(identifier, self.id_offset)
            .map_err(|err| anyhow!("{}: {:?}", err, identifier))?;
        if !self.table.is_present(identifier) {
            return Err(anyhow!("device not present: {}", identifier));
        }
        Ok(parsed.node_path)
    }

    /// Signal the monitor to exit at its next poll boundary and join it.
    pub fn stop(mut self) -> Result<()> {
        if let Some(monitor) = self.monitor.take() {
            monitor.stop()?;
        }
        Ok(())
    }
}

impl Drop for DiscoveryService {
    fn drop(&mut self) {
        // MonitorHandle's own Drop joins the thread.
        self.monitor.take();
    }
}
