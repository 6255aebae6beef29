//! Hotplug monitor.
//!
//! One dedicated thread owns the device-directory watch for the lifetime of
//! the subsystem: it scans `/dev` once at startup, then follows inotify
//! create/delete notifications, reclassifies affected nodes and drives the
//! presence table. All probing, scanning and settle delays happen outside the
//! table lock, so slow device I/O never blocks a concurrent `resolve` or
//! subscriber change.
//!
//! Watch-establishment failure is fatal to the monitor only: it logs, parks
//! in [`MonitorState::Stopped`] and leaves the already-built presence table
//! resolvable.

use std::collections::HashSet;
use std::fs;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use inotify::{EventMask, Inotify, WatchMask};

use crate::classify::{Classifier, DeviceClass};
use crate::config::DiscoveryConfig;
use crate::naming::{self, NODE_PREFIX};
use crate::presence::PresenceTable;

/// Bounded poll so the loop stays responsive to stop requests.
const POLL_TIMEOUT_MS: i32 = 250;

/// Companion control-event node; its appearance signals that the on-chip
/// HDMI receiver's video node may have just become valid.
const CONTROL_EVENT_PREFIX: &str = "cec";

const EVENT_BUF_LEN: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MonitorState {
    Created,
    Initializing,
    Watching,
    Draining,
    Stopped,
}

/// One decoded directory-change notification, in kernel delivery order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum NodeEvent {
    Created(String),
    Removed(String),
}

pub struct HotplugMonitor {
    dev_dir: PathBuf,
    classifier: Classifier,
    table: Arc<PresenceTable>,
    id_offset: u32,
    internal_devices: HashSet<String>,
    usb_settle: Duration,
    hdmi_settle: Duration,
    /// Single current HDMI node remembered across companion control events.
    hdmi_node: Option<PathBuf>,
    state: MonitorState,
}

/// Handle owned by the facade; stopping joins the monitor thread at the next
/// poll-timeout boundary.
pub struct MonitorHandle {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    pub fn stop(mut self) -> Result<()> {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("hotplug monitor thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl HotplugMonitor {
    pub fn new(config: &DiscoveryConfig, table: Arc<PresenceTable>) -> Self {
        Self::with_classifier(
            config,
            table,
            Classifier::new(),
            PathBuf::from(naming::DEVICE_DIR),
        )
    }

    pub(crate) fn with_classifier(
        config: &DiscoveryConfig,
        table: Arc<PresenceTable>,
        classifier: Classifier,
        dev_dir: PathBuf,
    ) -> Self {
        Self {
            dev_dir,
            classifier,
            table,
            id_offset: config.id_offset,
            internal_devices: config.internal_devices.clone(),
            usb_settle: config.usb_settle,
            hdmi_settle: config.hdmi_settle,
            hdmi_node: None,
            state: MonitorState::Created,
        }
    }

    /// Start the monitor loop on its own thread.
    pub fn spawn(self) -> MonitorHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = stop.clone();
        let join = std::thread::spawn(move || {
            let mut monitor = self;
            monitor.run(&stop_thread);
        });
        MonitorHandle {
            stop,
            join: Some(join),
        }
    }

    fn run(&mut self, stop: &AtomicBool) {
        self.state = MonitorState::Initializing;
        self.scan_existing();

        let mut inotify = match self.establish_watch() {
            Ok(inotify) => inotify,
            Err(err) => {
                log::error!(
                    "cannot watch {} for hotplug events, monitoring stopped: {:#}",
                    self.dev_dir.display(),
                    err
                );
                self.state = MonitorState::Stopped;
                return;
            }
        };

        self.state = MonitorState::Watching;
        let mut buffer = [0u8; EVENT_BUF_LEN];
        while !stop.load(Ordering::SeqCst) {
            match wait_readable(inotify.as_raw_fd(), POLL_TIMEOUT_MS) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(err) => {
                    log::warn!("poll on watch descriptor failed: {}", err);
                    continue;
                }
            }

            let batch = match read_event_batch(&mut inotify, &mut buffer) {
                Ok(batch) => batch,
                Err(err) => {
                    log::warn!("reading hotplug events failed: {}", err);
                    continue;
                }
            };

            self.state = MonitorState::Draining;
            self.drain(&batch);
            self.state = MonitorState::Watching;
        }

        // Dropping the inotify handle releases the watch exactly once.
        drop(inotify);
        self.state = MonitorState::Stopped;
        log::info!("hotplug monitor stopped");
    }

    /// Initial full listing of the device directory.
    fn scan_existing(&mut self) {
        log::debug!("scanning {} for existing capture devices", self.dev_dir.display());
        let entries = match fs::read_dir(&self.dev_dir) {
            Ok(entries) => entries,
            Err(err) => {
                log::error!("cannot scan {}: {}", self.dev_dir.display(), err);
                return;
            }
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            // A node failing classification here is skipped, not fatal.
            if !self.is_candidate(name) {
                continue;
            }
            let node = self.dev_dir.join(name);
            let class = self.classifier.classify(&node);
            if class.is_capture() {
                self.announce(&node, class);
            }
        }
    }

    fn establish_watch(&self) -> Result<Inotify> {
        let mut inotify = Inotify::init().context("inotify init")?;
        inotify
            .watches()
            .add(&self.dev_dir, WatchMask::CREATE | WatchMask::DELETE)
            .with_context(|| format!("watch {}", self.dev_dir.display()))?;
        Ok(inotify)
    }

    /// Process one batch of change events in the order delivered.
    fn drain(&mut self, batch: &[NodeEvent]) {
        for event in batch {
            match event {
                NodeEvent::Created(name) if name.starts_with(CONTROL_EVENT_PREFIX) => {
                    self.control_node_created();
                }
                NodeEvent::Removed(name) if name.starts_with(CONTROL_EVENT_PREFIX) => {
                    self.control_node_removed();
                }
                NodeEvent::Created(name) if self.is_candidate(name) => {
                    // Devices are not reliably queryable right after their
                    // node appears.
                    std::thread::sleep(self.usb_settle);
                    let node = self.dev_dir.join(name);
                    let class = self.classifier.classify(&node);
                    if class.is_capture() {
                        self.announce(&node, class);
                    }
                }
                NodeEvent::Removed(name) if self.is_candidate(name) => {
                    let node = self.dev_dir.join(name);
                    self.withdraw(&node);
                }
                _ => {}
            }
        }
    }

    /// The companion control node appeared: the HDMI receiver's video node
    /// may now be valid. Rescan and remember the first match; a single slot
    /// is kept, matching the host's one-receiver wiring.
    fn control_node_created(&mut self) {
        let entries = match fs::read_dir(&self.dev_dir) {
            Ok(entries) => entries,
            Err(err) => {
                log::error!("cannot scan {}: {}", self.dev_dir.display(), err);
                return;
            }
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !name.starts_with(NODE_PREFIX) {
                continue;
            }
            // The on-chip pipeline settles slower than USB devices.
            std::thread::sleep(self.hdmi_settle);
            let node = self.dev_dir.join(name);
            if self.classifier.classify(&node) == DeviceClass::HdmiReceiver {
                self.announce(&node, DeviceClass::HdmiReceiver);
                log::info!("hdmi receiver node recorded: {}", node.display());
                self.hdmi_node = Some(node);
                break;
            }
        }
    }

    fn control_node_removed(&mut self) {
        match self.hdmi_node.take() {
            Some(node) => {
                log::info!("hdmi receiver node removed: {}", node.display());
                self.withdraw(&node);
            }
            None => log::debug!("control node removed with no hdmi receiver recorded"),
        }
    }

    /// A `video*` node whose numeric suffix is not configured as internal.
    fn is_candidate(&self, name: &str) -> bool {
        name.strip_prefix(NODE_PREFIX)
            .map_or(false, |suffix| !self.internal_devices.contains(suffix))
    }

    fn announce(&self, node: &Path, class: DeviceClass) {
        let Some(identifier) = naming::identifier_for(node, self.id_offset) else {
            log::warn!("cannot derive identifier for {}", node.display());
            return;
        };
        log::info!(
            "capture device present: {} ({}, {:?})",
            identifier,
            node.display(),
            class
        );
        self.table.mark_present(&identifier);
    }

    fn withdraw(&self, node: &Path) {
        let Some(identifier) = naming::identifier_for(node, self.id_offset) else {
            log::warn!("cannot derive identifier for {}", node.display());
            return;
        };
        log::info!("capture device removed: {} ({})", identifier, node.display());
        self.table.mark_absent(&identifier);
    }
}

fn wait_readable(fd: RawFd, timeout_ms: i32) -> std::io::Result<bool> {
    let mut pollfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let rc = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };
    if rc < 0 {
        let err = std::io::Error::last_os_error();
        if err.kind() == std::io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(err);
    }
    Ok(rc > 0 && pollfd.revents & libc::POLLIN != 0)
}

/// Read and decode one batch of pending inotify events. Malformed or
/// non-UTF-8 entries are discarded; they cannot be device nodes we track.
fn read_event_batch(
    inotify: &mut Inotify,
    buffer: &mut [u8; EVENT_BUF_LEN],
) -> std::io::Result<Vec<NodeEvent>> {
    let events = match inotify.read_events(buffer) {
        Ok(events) => events,
        Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };
    let mut batch = Vec::new();
    for event in events {
        let Some(name) = event.name.and_then(|name| name.to_str()) else {
            continue;
        };
        if event.mask.contains(EventMask::CREATE) {
            batch.push(NodeEvent::Created(name.to_string()));
        } else if event.mask.contains(EventMask::DELETE) {
            batch.push(NodeEvent::Removed(name.to_string()));
        }
    }
    Ok(batch)
}
