//! Upload payloads and the pre-upload content hook.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{AppError, Result};

/// Largest accepted payload (2 GiB).
pub const MAX_PAYLOAD_SIZE: u64 = 1 << 31;

/// File extensions the content fixer is applied to.
const FIXABLE_EXTENSIONS: [&str; 3] = ["gcode", "gco", "g"];

/// Transform applied to G-code before upload.
pub trait ContentFixer: Send + Sync {
    /// Return the transformed content.
    fn fix(&self, content: &[u8], filename: &str) -> Result<Vec<u8>>;
}

/// Where payload bytes come from. Both variants can be read repeatedly.
#[derive(Debug, Clone)]
enum ContentSource {
    Memory(Arc<[u8]>),
    File(PathBuf),
}

/// A pending upload unit.
#[derive(Debug, Clone)]
pub struct Payload {
    name: String,
    size: u64,
    source: ContentSource,
}

impl Payload {
    /// Payload backed by an in-memory buffer.
    pub fn from_bytes(name: &str, content: impl Into<Arc<[u8]>>) -> Self {
        let content = content.into();
        Self {
            name: normalize_filename(name),
            size: content.len() as u64,
            source: ContentSource::Memory(content),
        }
    }

    /// Payload read lazily from `path`; only the size is taken up front.
    pub fn from_path(path: &Path) -> Result<Self> {
        let size = std::fs::metadata(path)?.len();
        Ok(Self {
            name: file_name(path),
            size,
            source: ContentSource::File(path.to_path_buf()),
        })
    }

    /// Read `path` and, for G-code files, run it through `fixer`.
    ///
    /// A fixer failure is logged and the file is used unmodified.
    pub fn from_path_fixed(path: &Path, fixer: &dyn ContentFixer) -> Result<Self> {
        let name = file_name(path);
        if !is_fixable(&name) {
            return Self::from_path(path);
        }

        let content = std::fs::read(path)?;
        let content = match fixer.fix(&content, &name) {
            Ok(fixed) => {
                debug!("Content fixer: {} -> {} bytes", content.len(), fixed.len());
                fixed
            }
            Err(e) => {
                warn!("Content fixer failed for '{name}', uploading unmodified: {e}");
                content
            }
        };
        Ok(Self::from_bytes(&name, content))
    }

    /// Normalized filename sent to the device.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Check the size bounds.
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(AppError::PayloadEmpty);
        }
        if self.size > MAX_PAYLOAD_SIZE {
            return Err(AppError::PayloadTooLarge(self.size));
        }
        Ok(())
    }

    /// Load the full content.
    pub async fn content(&self) -> Result<Arc<[u8]>> {
        match &self.source {
            ContentSource::Memory(content) => Ok(content.clone()),
            ContentSource::File(path) => {
                let content = tokio::fs::read(path).await?;
                if content.len() as u64 != self.size {
                    return Err(AppError::validation(format!(
                        "{} changed size: {} -> {} bytes",
                        path.display(),
                        self.size,
                        content.len()
                    )));
                }
                Ok(content.into())
            }
        }
    }
}

/// Strip leading path, drive and home markers (`.`, `/`, `\`, `~`).
pub fn normalize_filename(name: &str) -> String {
    name.trim_start_matches(['.', '/', '\\', '~']).to_string()
}

fn file_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned());
    normalize_filename(&name)
}

fn is_fixable(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| FIXABLE_EXTENSIONS.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

/// Human-readable size in 1024 units, e.g. `1.5 MiB`.
pub fn human_size(size: u64) -> String {
    const UNIT: u64 = 1024;
    if size < UNIT {
        return format!("{size} B");
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = size / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    let prefix = ['K', 'M', 'G', 'T', 'P', 'E'][exp];
    format!("{:.1} {prefix}iB", size as f64 / div as f64)
}
