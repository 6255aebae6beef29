//! External capture device discovery.
//!
//! This crate watches the host's device directory for externally attached
//! V4L2 capture devices (USB cameras and one on-chip HDMI receiver) and
//! maintains a live presence map reported to a single subscriber.
//!
//! # Architecture
//!
//! - `classify`: decides whether a device node is a usable external capture
//!   device, failing closed on half-initialized nodes
//! - `naming`: maps node paths to stable logical identifiers and back
//! - `presence`: the guarded identifier -> status table with
//!   replay-on-subscribe semantics
//! - `monitor`: the background thread doing the initial scan and following
//!   inotify create/delete notifications
//! - `provider`: the facade consumed by the interface translation layer
//!   (`set_subscriber`, `resolve`, `list_known_identifiers`)
//! - `config`: identifier offset, internal-device suppression and settle
//!   delays, loaded once at startup
//!
//! The presence map is rebuilt from scratch on every start; there is no
//! persistence and no pull-based listing. Devices are announced to the
//! subscriber only.

pub mod classify;
pub mod config;
pub mod monitor;
pub mod naming;
pub mod presence;
pub mod provider;

pub use classify::{CaptureProbe, Classifier, DeviceClass, NodeCaps, V4lProbe};
pub use config::DiscoveryConfig;
pub use monitor::{HotplugMonitor, MonitorHandle};
pub use naming::{identifier_for, parse_identifier, ParseError, ParsedIdentifier};
pub use presence::{PresenceSink, PresenceStatus, PresenceTable};
pub use provider::DiscoveryService;
