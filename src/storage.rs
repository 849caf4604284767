//! Known-device persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::device::Device;
use crate::error::{AppError, Result};

/// Lookup and update of previously used devices.
pub trait DeviceStore {
    /// Device whose id, or failing that ip, equals `host`.
    fn find(&self, host: &str) -> Option<Device>;
    /// Insert `device`, or refresh the stored entry with the same identity.
    fn add(&mut self, device: &Device);
    /// Persist pending changes.
    fn save(&self) -> Result<()>;
    /// Remember `id` as the last successful target.
    fn set_last(&mut self, id: &str);
    /// The last successful target, if it is still known.
    fn last(&self) -> Option<Device>;
    /// Every known device.
    fn devices(&self) -> &[Device];
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct KnownDevicesFile {
    #[serde(default)]
    last_id: String,
    #[serde(default)]
    devices: Vec<Device>,
}

/// TOML file of known devices plus the last successful target.
#[derive(Debug)]
pub struct KnownDevices {
    path: PathBuf,
    data: KnownDevicesFile,
}

impl KnownDevices {
    /// Load `path`; a missing file yields an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        let data = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)
                .map_err(|e| AppError::config(format!("Invalid known-devices file {}: {e}", path.display())))?
        } else {
            debug!("No known-devices file at {}", path.display());
            KnownDevicesFile::default()
        };

        Ok(Self {
            path: path.to_path_buf(),
            data,
        })
    }
}

impl DeviceStore for KnownDevices {
    fn find(&self, host: &str) -> Option<Device> {
        if host.is_empty() {
            return None;
        }
        let devices = &self.data.devices;
        devices
            .iter()
            .find(|d| d.id == host)
            .or_else(|| devices.iter().find(|d| d.ip == host))
            .cloned()
    }

    fn add(&mut self, device: &Device) {
        let existing = if device.id.is_empty() {
            self.data.devices.iter_mut().find(|d| d.id.is_empty() && d.ip == device.ip)
        } else {
            self.data.devices.iter_mut().find(|d| d.id == device.id)
        };

        match existing {
            Some(stored) => {
                stored.ip = device.ip.clone();
                if !device.token.is_empty() {
                    stored.token = device.token.clone();
                }
                if !device.model.is_empty() {
                    stored.model = device.model.clone();
                }
                stored.sacp = device.sacp;
            }
            None => self.data.devices.push(device.clone()),
        }
    }

    fn save(&self) -> Result<()> {
        let content = toml::to_string_pretty(&self.data)
            .map_err(|e| AppError::config(format!("Failed to serialize known devices: {e}")))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, content)?;
        debug!("Saved {} known device(s) to {}", self.data.devices.len(), self.path.display());
        Ok(())
    }

    fn set_last(&mut self, id: &str) {
        self.data.last_id = id.to_string();
    }

    fn last(&self) -> Option<Device> {
        if self.data.last_id.is_empty() {
            return None;
        }
        self.data.devices.iter().find(|d| d.id == self.data.last_id).cloned()
    }

    fn devices(&self) -> &[Device] {
        &self.data.devices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: &str, ip: &str, token: &str) -> Device {
        Device {
            ip: ip.to_string(),
            id: id.to_string(),
            model: "Snapmaker J1".to_string(),
            token: token.to_string(),
            sacp: true,
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = KnownDevices::load(&dir.path().join("devices.toml")).unwrap();
        assert!(store.devices().is_empty());
        assert!(store.last().is_none());
    }

    #[test]
    fn test_add_updates_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = KnownDevices::load(&dir.path().join("devices.toml")).unwrap();

        store.add(&device("J1", "10.0.0.2", "t1"));
        store.add(&device("J1", "10.0.0.9", ""));

        assert_eq!(store.devices().len(), 1);
        let stored = store.find("J1").unwrap();
        assert_eq!(stored.ip, "10.0.0.9");
        // Empty token does not wipe the stored one
        assert_eq!(stored.token, "t1");
    }

    #[test]
    fn test_find_prefers_id_over_ip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = KnownDevices::load(&dir.path().join("devices.toml")).unwrap();
        store.add(&device("10.0.0.5", "10.0.0.7", ""));
        store.add(&device("other", "10.0.0.5", ""));

        assert_eq!(store.find("10.0.0.5").unwrap().ip, "10.0.0.7");
        assert_eq!(store.find("10.0.0.7").unwrap().id, "10.0.0.5");
        assert!(store.find("missing").is_none());
        assert!(store.find("").is_none());
    }

    #[test]
    fn test_anonymous_devices_match_by_ip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = KnownDevices::load(&dir.path().join("devices.toml")).unwrap();

        store.add(&Device::from_host("printer.local"));
        let mut issued = Device::from_host("printer.local");
        issued.token = "abc".to_string();
        store.add(&issued);

        assert_eq!(store.devices().len(), 1);
        assert_eq!(store.find("printer.local").unwrap().token, "abc");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("devices.toml");

        let mut store = KnownDevices::load(&path).unwrap();
        store.add(&device("J1", "10.0.0.2", "t1"));
        store.add(&device("A350", "10.0.0.3", ""));
        store.set_last("A350");
        store.save().unwrap();

        let reloaded = KnownDevices::load(&path).unwrap();
        assert_eq!(reloaded.devices().len(), 2);
        assert_eq!(reloaded.last().unwrap().ip, "10.0.0.3");
        assert_eq!(reloaded.find("J1").unwrap().token, "t1");
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.toml");
        std::fs::write(&path, "devices = 5").unwrap();

        assert!(matches!(KnownDevices::load(&path), Err(AppError::Config(_))));
    }
}
