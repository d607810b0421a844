//! # mirrorfs-core
//!
//! Passthrough mirror filesystem with a per-handle audit trail.
//!
//! A user-mode filesystem host forwards each verb (open, read, write,
//! rename, ...) to [`MirrorGateway`], which performs it against a real local
//! directory and returns a Windows-style [`NtStatus`]. Every handle the host
//! opens gets a [`RequestContext`] that keeps:
//! - the open intent (access, share, disposition)
//! - the real file handle, when the open needed one
//! - an ordered history of [`CallRecord`]s, one per verb
//!
//! Lifecycle changes and recorded calls are published on an [`AuditBus`] for
//! live observers.

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod flags;
pub mod gateway;
pub mod ids;
pub mod local;
pub mod ops;
pub mod pattern;
pub mod record;
pub mod share;
pub mod status;
pub mod types;

pub use config::{AuditConfig, ConfigError, MirrorConfig, VolumeConfig};
pub use context::{ContextTable, RepeatPolicy, RequestContext};
pub use error::{CapturedError, FsError, FsResult, translate};
pub use events::{AuditBus, AuditEvent, AuditMessage, ContextSummary, Subscription, matches_pattern};
pub use flags::{AccessControlSections, FileAccess, FileAttributes, FileMode, FileShare, FileSystemFeatures};
pub use gateway::{MirrorGateway, instrument};
pub use ids::ContextId;
pub use local::LocalFs;
pub use ops::FsOperations;
pub use record::{CallRecord, Operation};
pub use status::{HasStatus, NtStatus, Reply};
pub use types::{
    DiskSpace, FileInformation, FileSecurity, FileTimestamps, HostFileInfo, OpenIntent, VolumeInformation,
};
