//! Payload types exchanged with the host.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::flags::{FileAccess, FileAttributes, FileMode, FileShare, FileSystemFeatures};
use crate::ids::ContextId;

/// Per-call host state.
///
/// The host keeps one of these per open handle and passes it to every verb.
/// `create_file` fills in `context` and `is_directory`; later verbs echo them
/// back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostFileInfo {
    /// Context generated by the open, if any.
    pub context: Option<ContextId>,
    /// Caller process id.
    pub process_id: u32,
    /// Caller identity name, when the host resolved one.
    pub requestor: Option<String>,
    pub is_directory: bool,
    /// Remove the target when the handle is cleaned up.
    pub delete_on_close: bool,
}

impl HostFileInfo {
    pub fn new(process_id: u32) -> Self {
        Self {
            process_id,
            ..Default::default()
        }
    }
}

/// Open intent, fixed when the context is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenIntent {
    pub access: FileAccess,
    pub share: FileShare,
    pub mode: FileMode,
    /// Attributes requested for a newly created file.
    pub attributes: FileAttributes,
}

impl Default for OpenIntent {
    fn default() -> Self {
        Self {
            access: FileAccess::empty(),
            share: FileShare::READ | FileShare::WRITE | FileShare::DELETE,
            mode: FileMode::Open,
            attributes: FileAttributes::empty(),
        }
    }
}

/// Metadata for one entry, as returned by get-info and enumeration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInformation {
    /// Entry name: the last path component for listings, the request path
    /// for get-info.
    pub file_name: String,
    pub attributes: FileAttributes,
    pub creation_time: Option<SystemTime>,
    pub last_access_time: Option<SystemTime>,
    pub last_write_time: Option<SystemTime>,
    pub length: u64,
}

/// Timestamps to apply; `None` leaves that time unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTimestamps {
    pub creation: Option<SystemTime>,
    pub last_access: Option<SystemTime>,
    pub last_write: Option<SystemTime>,
}

impl FileTimestamps {
    pub fn is_empty(&self) -> bool {
        self.creation.is_none() && self.last_access.is_none() && self.last_write.is_none()
    }
}

/// Security descriptor rendition for a POSIX backing store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSecurity {
    pub owner: Option<u32>,
    pub group: Option<u32>,
    /// Permission bits (`0o7777` range).
    pub mode: Option<u32>,
}

/// Space figures for the volume holding the mirrored root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskSpace {
    /// Free bytes available to the caller.
    pub free_bytes_available: u64,
    pub total_bytes: u64,
    pub total_free_bytes: u64,
}

/// Fixed volume metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeInformation {
    pub label: String,
    pub serial_number: u32,
    pub max_component_length: u32,
    pub features: FileSystemFeatures,
    pub file_system_name: String,
}
