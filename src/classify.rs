//! Device classification.
//!
//! Given a device node, decides whether it is an externally attached capture
//! device worth announcing. Classification fails closed: device nodes race
//! against their own creation, so an unreadable or half-initialized node is
//! reported as [`DeviceClass::NotCapture`] and logged, never escalated.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Sysfs directory exposing the human-readable name of each video node.
pub const SYSFS_VIDEO_CLASS: &str = "/sys/class/video4linux";

/// Driver-name substring identifying USB capture devices.
const USB_DRIVER_SIGNATURE: &str = "uvc";

/// Driver-name substring identifying the on-chip capture pipeline.
const ONCHIP_DRIVER_SIGNATURE: &str = "cap";

/// Expected sysfs name prefix of the HDMI receiver's video node.
const HDMI_RECEIVER_NAME: &str = "mxc_isi.6.capture";

/// Hardware codec nodes share the video node namespace but must never be
/// surfaced as cameras.
const CODEC_NAMES: [&str; 2] = ["amphion-vpu-decoder", "amphion-vpu-encoder"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceClass {
    NotCapture,
    ExternalCapture,
    /// On-chip HDMI receiver, a specialization of external capture.
    HdmiReceiver,
}

impl DeviceClass {
    pub fn is_capture(self) -> bool {
        !matches!(self, DeviceClass::NotCapture)
    }
}

/// Capability metadata obtained by synchronously probing an opened node.
#[derive(Clone, Debug)]
pub struct NodeCaps {
    /// Driver name reported by the capability query.
    pub driver: String,
    /// Whether the node carries a video-capture capability bit.
    pub video_capture: bool,
    /// Number of enumerable capture pixel formats.
    pub formats: usize,
}

/// Probe seam so classification logic can be exercised without real hardware.
pub trait CaptureProbe: Send + Sync {
    fn probe(&self, node: &Path) -> Result<NodeCaps>;
}

/// Production probe backed by the v4l crate.
pub struct V4lProbe;

impl CaptureProbe for V4lProbe {
    fn probe(&self, node: &Path) -> Result<NodeCaps> {
        use v4l::capability::Flags;
        use v4l::video::Capture;

        let device = v4l::Device::with_path(node)
            .with_context(|| format!("open v4l2 device {}", node.display()))?;
        let caps = device
            .query_caps()
            .with_context(|| format!("query capabilities of {}", node.display()))?;
        let video_capture = caps.capabilities.contains(Flags::VIDEO_CAPTURE)
            || caps.capabilities.contains(Flags::VIDEO_CAPTURE_MPLANE);
        // Meta/control nodes can share a capture driver name; an empty format
        // list is what tells them apart.
        let formats = device
            .enum_formats()
            .map(|formats| formats.len())
            .unwrap_or(0);
        Ok(NodeCaps {
            driver: caps.driver,
            video_capture,
            formats,
        })
    }
}

pub struct Classifier {
    probe: Box<dyn CaptureProbe>,
    sysfs_root: PathBuf,
}

impl Classifier {
    pub fn new() -> Self {
        Self {
            probe: Box::new(V4lProbe),
            sysfs_root: PathBuf::from(SYSFS_VIDEO_CLASS),
        }
    }

    pub(crate) fn with_probe(probe: Box<dyn CaptureProbe>, sysfs_root: PathBuf) -> Self {
        Self { probe, sysfs_root }
    }

    /// Classify a device node.
    pub fn classify(&self, node: &Path) -> DeviceClass {
        let sys_name = match self.sysfs_name(node) {
            Ok(name) => name,
            Err(err) => {
                log::warn!("cannot read device name for {}: {:#}", node.display(), err);
                return DeviceClass::NotCapture;
            }
        };

        if CODEC_NAMES
            .iter()
            .any(|codec| sys_name.starts_with(codec))
        {
            log::debug!("{} is a video codec node ({})", node.display(), sys_name);
            return DeviceClass::NotCapture;
        }

        let caps = match self.probe.probe(node) {
            Ok(caps) => caps,
            Err(err) => {
                log::warn!("probe of {} failed: {:#}", node.display(), err);
                return DeviceClass::NotCapture;
            }
        };

        if !caps.video_capture {
            log::debug!("{} does not support video capture", node.display());
            return DeviceClass::NotCapture;
        }

        if caps.driver.contains(USB_DRIVER_SIGNATURE) {
            if caps.formats > 0 {
                return DeviceClass::ExternalCapture;
            }
            log::warn!(
                "{}: driver {} matches {} but enumerates no formats, treating as meta node",
                node.display(),
                caps.driver,
                USB_DRIVER_SIGNATURE
            );
            return DeviceClass::NotCapture;
        }

        if caps.driver.contains(ONCHIP_DRIVER_SIGNATURE)
            && sys_name.starts_with(HDMI_RECEIVER_NAME)
        {
            return DeviceClass::HdmiReceiver;
        }

        DeviceClass::NotCapture
    }

    /// Read the newline-terminated device name from sysfs.
    fn sysfs_name(&self, node: &Path) -> Result<String> {
        let name = node
            .file_name()
            .and_then(|name| name.to_str())
            .context("device node has no usable name")?;
        let path = self.sysfs_root.join(name).join("name");
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("read {}", path.display()))?;
        Ok(raw.trim_end().to_string())
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use anyhow::anyhow;
    use std::collections::HashMap;

    /// Probe returning canned capability reports keyed by node name.
    pub(crate) struct FakeProbe {
        reports: HashMap<String, NodeCaps>,
    }

    impl FakeProbe {
        pub(crate) fn new() -> Self {
            Self {
                reports: HashMap::new(),
            }
        }

        pub(crate) fn with_node(
            mut self,
            name: &str,
            driver: &str,
            video_capture: bool,
            formats: usize,
        ) -> Self {
            self.reports.insert(
                name.to_string(),
                NodeCaps {
                    driver: driver.to_string(),
                    video_capture,
                    formats,
                },
            );
            self
        }
    }

    impl CaptureProbe for FakeProbe {
        fn probe(&self, node: &Path) -> Result<NodeCaps> {
            let name = node
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| anyhow!("bad node path"))?;
            self.reports
                .get(name)
                .cloned()
                .ok_or_else(|| anyhow!("no such device: {}", node.display()))
        }
    }

    /// Write a sysfs `name` attribute for a node under a synthetic sysfs root.
    pub(crate) fn write_sysfs_name(root: &Path, node_name: &str, device_name: &str) {
        let dir = root.join(node_name);
        std::fs::create_dir_all(&dir).expect("create sysfs dir");
        std::fs::write(dir.join("name"), format!("{device_name}\n")).expect("write sysfs name");
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::{write_sysfs_name, FakeProbe};
    use super::*;
    use tempfile::TempDir;

    fn classify_with(
        probe: FakeProbe,
        sysfs: &TempDir,
        node_name: &str,
    ) -> DeviceClass {
        let classifier = Classifier::with_probe(Box::new(probe), sysfs.path().to_path_buf());
        classifier.classify(&Path::new("/dev").join(node_name))
    }

    #[test]
    fn uvc_device_with_formats_is_external_capture() {
        let sysfs = TempDir::new().unwrap();
        write_sysfs_name(sysfs.path(), "video3", "USB 2.0 Camera");
        let probe = FakeProbe::new().with_node("video3", "uvcvideo", true, 2);

        assert_eq!(
            classify_with(probe, &sysfs, "video3"),
            DeviceClass::ExternalCapture
        );
    }

    #[test]
    fn uvc_device_without_formats_is_demoted() {
        let sysfs = TempDir::new().unwrap();
        write_sysfs_name(sysfs.path(), "video3", "USB 2.0 Camera");
        let probe = FakeProbe::new().with_node("video3", "uvcvideo", true, 0);

        assert_eq!(
            classify_with(probe, &sysfs, "video3"),
            DeviceClass::NotCapture
        );
    }

    #[test]
    fn onchip_node_with_matching_name_is_hdmi_receiver() {
        let sysfs = TempDir::new().unwrap();
        write_sysfs_name(sysfs.path(), "video5", "mxc_isi.6.capture");
        let probe = FakeProbe::new().with_node("video5", "mxc-isi-cap", true, 0);

        assert_eq!(
            classify_with(probe, &sysfs, "video5"),
            DeviceClass::HdmiReceiver
        );
    }

    #[test]
    fn onchip_node_with_other_name_is_rejected() {
        let sysfs = TempDir::new().unwrap();
        write_sysfs_name(sysfs.path(), "video5", "mxc_isi.0.capture");
        let probe = FakeProbe::new().with_node("video5", "mxc-isi-cap", true, 0);

        assert_eq!(
            classify_with(probe, &sysfs, "video5"),
            DeviceClass::NotCapture
        );
    }

    #[test]
    fn codec_nodes_are_rejected_before_probing() {
        let sysfs = TempDir::new().unwrap();
        write_sysfs_name(sysfs.path(), "video12", "amphion-vpu-decoder");
        write_sysfs_name(sysfs.path(), "video13", "amphion-vpu-encoder");
        // No probe reports registered: reaching the probe would fail the
        // classification with a different path than the codec rejection.
        let probe = FakeProbe::new();
        let classifier = Classifier::with_probe(Box::new(probe), sysfs.path().to_path_buf());

        assert_eq!(
            classifier.classify(Path::new("/dev/video12")),
            DeviceClass::NotCapture
        );
        assert_eq!(
            classifier.classify(Path::new("/dev/video13")),
            DeviceClass::NotCapture
        );
    }

    #[test]
    fn node_without_capture_capability_is_rejected() {
        let sysfs = TempDir::new().unwrap();
        write_sysfs_name(sysfs.path(), "video3", "USB 2.0 Camera");
        let probe = FakeProbe::new().with_node("video3", "uvcvideo", false, 2);

        assert_eq!(
            classify_with(probe, &sysfs, "video3"),
            DeviceClass::NotCapture
        );
    }

    #[test]
    fn probe_failure_fails_closed() {
        let sysfs = TempDir::new().unwrap();
        write_sysfs_name(sysfs.path(), "video3", "USB 2.0 Camera");
        let probe = FakeProbe::new();

        assert_eq!(
            classify_with(probe, &sysfs, "video3"),
            DeviceClass::NotCapture
        );
    }

    #[test]
    fn missing_sysfs_name_fails_closed() {
        let sysfs = TempDir::new().unwrap();
        let probe = FakeProbe::new().with_node("video3", "uvcvideo", true, 2);

        assert_eq!(
            classify_with(probe, &sysfs, "video3"),
            DeviceClass::NotCapture
        );
    }

    #[test]
    fn unrelated_driver_is_rejected() {
        let sysfs = TempDir::new().unwrap();
        write_sysfs_name(sysfs.path(), "video9", "some ISP pipeline");
        let probe = FakeProbe::new().with_node("video9", "isp-driver", true, 4);

        assert_eq!(
            classify_with(probe, &sysfs, "video9"),
            DeviceClass::NotCapture
        );
    }
}
