//! Upload service orchestration.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::connector::{Protocol, Registry};
use crate::device::Device;
use crate::discovery;
use crate::error::{AppError, Result};
use crate::payload::{ContentFixer, Payload, human_size};
use crate::progress::ProgressFn;
use crate::storage::DeviceStore;

/// Result of one file upload.
#[derive(Debug, Clone)]
pub struct UploadReport {
    pub name: String,
    pub size: u64,
    pub device: String,
    pub protocol: Protocol,
    pub duration_secs: f64,
}

impl UploadReport {
    /// Get summary message.
    pub fn summary(&self) -> String {
        format!(
            "Uploaded {} ({}) to {} via {} (took {:.1}s)",
            self.name,
            human_size(self.size),
            self.device,
            self.protocol,
            self.duration_secs
        )
    }
}

/// Resolves the target device and uploads files to it.
pub struct UploadService<S: DeviceStore> {
    config: AppConfig,
    registry: Registry,
    store: S,
    fixer: Option<Box<dyn ContentFixer>>,
}

impl<S: DeviceStore> UploadService<S> {
    /// Create a new upload service.
    pub fn new(config: AppConfig, store: S) -> Self {
        let registry = Registry::new(&config);
        Self {
            config,
            registry,
            store,
            fixer: None,
        }
    }

    /// Forward upload progress to `progress`.
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.registry = self.registry.with_progress(progress);
        self
    }

    /// Run G-code files through `fixer` before upload.
    pub fn with_fixer(mut self, fixer: Box<dyn ContentFixer>) -> Self {
        self.fixer = Some(fixer);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Find the target: known devices, then discovery, then `host` as given.
    ///
    /// Discovered devices are merged into the store and carry the token it
    /// holds for them. Without a host the single candidate is used; with
    /// several, the last successful target wins. When nothing answers
    /// discovery, the known devices are the candidates.
    pub async fn resolve(&mut self, host: Option<&str>) -> Result<Device> {
        if let Some(host) = host {
            if let Some(device) = self.store.find(host) {
                info!("Using known device {device}");
                return Ok(device);
            }
        }

        let found = match discovery::discover(self.config.discovery.port, self.config.discovery.timeout()).await {
            Ok(found) => found,
            Err(e) => {
                warn!("Discovery failed: {e}");
                Vec::new()
            }
        };
        self.choose(host, found)
    }

    /// Record `found` in the store, then pick the target among it.
    fn choose(&mut self, host: Option<&str>, found: Vec<Device>) -> Result<Device> {
        for device in &found {
            self.store.add(device);
        }

        match host {
            Some(host) => match found.into_iter().find(|d| d.matches(host)) {
                Some(device) => Ok(self.remembered(device)),
                None => {
                    info!("{host} not discovered, addressing it directly");
                    Ok(Device::from_host(host))
                }
            },
            None => self.pick(found),
        }
    }

    fn pick(&self, found: Vec<Device>) -> Result<Device> {
        let mut candidates: Vec<Device> = if found.is_empty() {
            info!("No device answered discovery, trying known devices");
            self.store.devices().to_vec()
        } else {
            found.into_iter().map(|d| self.remembered(d)).collect()
        };

        match candidates.len() {
            0 => Err(AppError::DeviceUnavailable("no device answered discovery".to_string())),
            1 => Ok(candidates.remove(0)),
            _ => {
                if let Some(last) = self.store.last() {
                    if let Some(device) = candidates.iter().find(|d| d.id == last.id) {
                        info!("Several devices found, using last target {device}");
                        return Ok(device.clone());
                    }
                }
                let names: Vec<String> = candidates.iter().map(Device::to_string).collect();
                Err(AppError::validation(format!(
                    "several devices found, choose one with --host: {}",
                    names.join(", ")
                )))
            }
        }
    }

    /// `device` carrying the token stored for the same identity, if any.
    fn remembered(&self, mut device: Device) -> Device {
        if !device.token.is_empty() {
            return device;
        }
        let key = if device.id.is_empty() { &device.ip } else { &device.id };
        if let Some(stored) = self.store.find(key) {
            if stored.id == device.id {
                device.token = stored.token;
            }
        }
        device
    }

    /// Upload `paths` in order to the device named by `host`.
    ///
    /// Stops at the first failure; the device record is stored either way.
    pub async fn upload_files(
        &mut self,
        host: Option<&str>,
        paths: &[PathBuf],
        cancel: &CancellationToken,
    ) -> Result<Vec<UploadReport>> {
        let mut device = self.resolve(host).await?;
        info!("Target device: {device}");

        let mut reports = Vec::with_capacity(paths.len());
        let mut outcome = Ok(());
        for path in paths {
            match self.upload_one(&mut device, path, cancel).await {
                Ok(report) => {
                    info!("{}", report.summary());
                    reports.push(report);
                }
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }

        self.store.add(&device);
        if outcome.is_ok() && !device.id.is_empty() {
            self.store.set_last(&device.id);
        }
        if let Err(e) = self.store.save() {
            warn!("Failed to save known devices: {e}");
        }

        outcome.map(|()| reports)
    }

    async fn upload_one(&mut self, device: &mut Device, path: &Path, cancel: &CancellationToken) -> Result<UploadReport> {
        let payload = match &self.fixer {
            Some(fixer) => Payload::from_path_fixed(path, fixer.as_ref())?,
            None => Payload::from_path(path)?,
        };

        let start = Instant::now();
        let protocol = self.registry.upload(device, &payload, cancel).await?;

        Ok(UploadReport {
            name: payload.name().to_string(),
            size: payload.size(),
            device: device.to_string(),
            protocol,
            duration_secs: start.elapsed().as_secs_f64(),
        })
    }
}
