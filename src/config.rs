//! Discovery configuration.
//!
//! Loaded once before the monitor starts and treated as immutable thereafter.
//! A JSON config file is pointed at by `EXTCAM_CONFIG`; individual settings
//! may then be overridden through environment variables.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

const DEFAULT_ID_OFFSET: u32 = 100;
const DEFAULT_USB_SETTLE_MS: u64 = 100;
const DEFAULT_HDMI_SETTLE_MS: u64 = 800;

#[derive(Debug, Deserialize, Default)]
struct DiscoveryConfigFile {
    id_offset: Option<u32>,
    internal_devices: Option<Vec<String>>,
    usb_settle_ms: Option<u64>,
    hdmi_settle_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Offset added to a node's numeric suffix when forming its identifier.
    pub id_offset: u32,
    /// Raw numeric node suffixes to ignore entirely (built-in cameras).
    pub internal_devices: HashSet<String>,
    /// Wait after a device-node creation event before probing. USB devices
    /// are not reliably queryable right after their node appears.
    pub usb_settle: Duration,
    /// Wait before probing candidates after a companion control-event node
    /// appears. The on-chip pipeline settles slower than USB.
    pub hdmi_settle: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            id_offset: DEFAULT_ID_OFFSET,
            internal_devices: HashSet::new(),
            usb_settle: Duration::from_millis(DEFAULT_USB_SETTLE_MS),
            hdmi_settle: Duration::from_millis(DEFAULT_HDMI_SETTLE_MS),
        }
    }
}

impl DiscoveryConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("EXTCAM_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: DiscoveryConfigFile) -> Self {
        let defaults = Self::default();
        Self {
            id_offset: file.id_offset.unwrap_or(defaults.id_offset),
            internal_devices: file
                .internal_devices
                .map(|devices| devices.into_iter().collect())
                .unwrap_or(defaults.internal_devices),
            usb_settle: file
                .usb_settle_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.usb_settle),
            hdmi_settle: file
                .hdmi_settle_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.hdmi_settle),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(offset) = std::env::var("EXTCAM_ID_OFFSET") {
            self.id_offset = offset
                .parse()
                .map_err(|_| anyhow!("EXTCAM_ID_OFFSET must be an unsigned integer"))?;
        }
        if let Ok(devices) = std::env::var("EXTCAM_INTERNAL_DEVICES") {
            let parsed = split_csv(&devices);
            if !parsed.is_empty() {
                self.internal_devices = parsed.into_iter().collect();
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        for device in &self.internal_devices {
            if device.parse::<u32>().is_err() {
                return Err(anyhow!(
                    "internal_devices entries must be numeric node suffixes, got {:?}",
                    device
                ));
            }
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<DiscoveryConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_hardware_bring_up_values() {
        let cfg = DiscoveryConfig::default();
        assert_eq!(cfg.id_offset, 100);
        assert!(cfg.internal_devices.is_empty());
        assert_eq!(cfg.usb_settle, Duration::from_millis(100));
        assert_eq!(cfg.hdmi_settle, Duration::from_millis(800));
    }

    #[test]
    fn non_numeric_internal_device_is_rejected() {
        let mut cfg = DiscoveryConfig::default();
        cfg.internal_devices.insert("zero".to_string());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn split_csv_trims_and_drops_empty_entries() {
        assert_eq!(split_csv(" 0, 1 ,,2"), vec!["0", "1", "2"]);
        assert!(split_csv("").is_empty());
    }
}
