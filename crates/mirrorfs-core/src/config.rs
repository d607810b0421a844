//! Mirror configuration.
//!
//! Loaded from TOML. Only `root` is required:
//!
//! ```toml
//! root = "/srv/mirror"
//!
//! [volume]
//! label = "MIRROR"
//! file_system_name = "NTFS"
//! serial_number = 0x19831116
//! features = "CASE_PRESERVED_NAMES | CASE_SENSITIVE_SEARCH | PERSISTENT_ACLS | SUPPORTS_REMOTE_STORAGE | UNICODE_ON_DISK"
//!
//! [audit]
//! collapse_repeats = true
//! max_repeat = 0
//! event_capacity = 1024
//! denied_extensions = ["lnk"]
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::events::DEFAULT_EVENT_CAPACITY;
use crate::flags::FileSystemFeatures;

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Real directory every request path resolves under.
    pub root: PathBuf,
    #[serde(default)]
    pub volume: VolumeConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

impl MirrorConfig {
    /// Defaults for everything but the root.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            volume: VolumeConfig::default(),
            audit: AuditConfig::default(),
        }
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("root must not be empty".into()));
        }
        if self.audit.event_capacity == 0 {
            return Err(ConfigError::Invalid("audit.event_capacity must be positive".into()));
        }
        Ok(())
    }
}

/// Fixed volume metadata reported to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeConfig {
    pub label: String,
    pub file_system_name: String,
    pub serial_number: u32,
    pub features: FileSystemFeatures,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            label: "MIRROR".into(),
            file_system_name: "NTFS".into(),
            serial_number: 0x1983_1116,
            features: FileSystemFeatures::CASE_PRESERVED_NAMES
                | FileSystemFeatures::CASE_SENSITIVE_SEARCH
                | FileSystemFeatures::PERSISTENT_ACLS
                | FileSystemFeatures::SUPPORTS_REMOTE_STORAGE
                | FileSystemFeatures::UNICODE_ON_DISK,
        }
    }
}

/// Audit trail behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Fold consecutive identical calls into one record.
    pub collapse_repeats: bool,
    /// Cap on a folded record's counter; 0 means unbounded.
    pub max_repeat: u32,
    /// Broadcast capacity of the audit bus.
    pub event_capacity: usize,
    /// File extensions (without the dot, case-insensitive) that opens refuse.
    pub denied_extensions: Vec<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            collapse_repeats: true,
            max_repeat: 0,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            denied_extensions: Vec::new(),
        }
    }
}

impl AuditConfig {
    /// True when `path` ends in one of the denied extensions.
    pub fn denies(&self, path: &str) -> bool {
        let name = path.rsplit(['\\', '/']).next().unwrap_or(path);
        let Some((_, ext)) = name.rsplit_once('.') else {
            return false;
        };
        self.denied_extensions
            .iter()
            .any(|denied| denied.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }
}
