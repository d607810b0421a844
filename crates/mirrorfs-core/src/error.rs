//! Failure taxonomy and native status translation.
//!
//! [`translate`] turns a native error code (an errno value on this platform)
//! plus the path it concerned into a structured [`FsError`]. It is a pure
//! function: the same `(code, path)` always yields the same variant.
//! [`FsError::status`] then picks the host outcome for that failure, so a
//! failed create that reports "file not found" reaches the host as a
//! different [`NtStatus`] than one reporting "access denied".

use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;
use thiserror::Error;

use crate::status::NtStatus;

/// Structured filesystem failure.
#[derive(Debug, Error, IntoStaticStr)]
pub enum FsError {
    /// File not found.
    #[error("file not found: {0}")]
    NotFound(String),

    /// A directory on the way to the target does not exist.
    #[error("path not found: {0}")]
    PathNotFound(String),

    /// Permission denied.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Target already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// File name or path too long.
    #[error("name too long: {0}")]
    NameTooLong(String),

    /// The device backing the path is gone.
    #[error("drive not found: {0}")]
    DriveNotFound(String),

    /// The native call rejected an argument.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Another open holds the target with an incompatible share mode.
    #[error("sharing violation: {0}")]
    SharingViolation(String),

    /// The native call was aborted before it completed.
    #[error("operation aborted")]
    OperationAborted,

    /// Directory not empty.
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// Expected a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// The verb needs an owned resource and the context holds none.
    #[error("no open handle for {0}")]
    InvalidHandle(String),

    /// Any native failure without a specific mapping.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        code: Option<i32>,
        #[source]
        source: io::Error,
    },
}

impl FsError {
    /// Build from an `io::Error` raised while operating on `path`.
    ///
    /// Errors carrying a raw OS code go through [`translate`]; the rest are
    /// classified by their `ErrorKind`.
    pub fn from_io(err: io::Error, path: &Path) -> Self {
        let path = path.display().to_string();
        if let Some(code) = err.raw_os_error() {
            return translate(code, &path);
        }
        match err.kind() {
            io::ErrorKind::NotFound => FsError::NotFound(path),
            io::ErrorKind::PermissionDenied => FsError::AccessDenied(path),
            io::ErrorKind::AlreadyExists => FsError::AlreadyExists(path),
            io::ErrorKind::InvalidInput => FsError::InvalidParameter(path),
            io::ErrorKind::DirectoryNotEmpty => FsError::DirectoryNotEmpty(path),
            io::ErrorKind::NotADirectory => FsError::NotADirectory(path),
            _ => FsError::Io {
                path,
                code: None,
                source: err,
            },
        }
    }

    /// The host outcome this failure maps to.
    pub fn status(&self) -> NtStatus {
        match self {
            FsError::NotFound(_) => NtStatus::FileNotFound,
            FsError::PathNotFound(_) => NtStatus::PathNotFound,
            FsError::AccessDenied(_) => NtStatus::AccessDenied,
            FsError::AlreadyExists(_) => NtStatus::FileExists,
            FsError::NameTooLong(_) => NtStatus::NameTooLong,
            FsError::DriveNotFound(_) => NtStatus::DriveNotFound,
            FsError::InvalidParameter(_) => NtStatus::InvalidParameter,
            FsError::SharingViolation(_) => NtStatus::SharingViolation,
            FsError::OperationAborted => NtStatus::Cancelled,
            FsError::DirectoryNotEmpty(_) => NtStatus::DirectoryNotEmpty,
            FsError::NotADirectory(_) => NtStatus::NotADirectory,
            FsError::InvalidHandle(_) => NtStatus::InvalidHandle,
            FsError::Io { code: Some(code), .. } => NtStatus::IoFailure(*code),
            FsError::Io { code: None, .. } => NtStatus::Unsuccessful,
        }
    }

    /// The variant name, used to compare failures by kind.
    pub fn kind(&self) -> &'static str {
        self.into()
    }

    /// The native error code, when the failure carries one.
    pub fn code(&self) -> Option<i32> {
        match self {
            FsError::Io { code, .. } => *code,
            _ => None,
        }
    }
}

/// Map a native error code and the path it concerned to a structured failure.
///
/// Unmapped codes produce [`FsError::Io`] carrying the original code. An
/// "exists" code without a path is reported generically, since there is no
/// name to attach the collision to.
pub fn translate(code: i32, path: &str) -> FsError {
    let owned = || path.to_string();
    match code {
        libc::ENOENT => FsError::NotFound(owned()),
        libc::ENOTDIR => FsError::PathNotFound(owned()),
        libc::EACCES | libc::EPERM => FsError::AccessDenied(owned()),
        libc::EEXIST if !path.is_empty() => FsError::AlreadyExists(owned()),
        libc::ENAMETOOLONG => FsError::NameTooLong(owned()),
        libc::ENODEV | libc::ENXIO => FsError::DriveNotFound(owned()),
        libc::EINVAL => FsError::InvalidParameter(owned()),
        libc::EBUSY | libc::ETXTBSY => FsError::SharingViolation(owned()),
        libc::ECANCELED => FsError::OperationAborted,
        libc::ENOTEMPTY => FsError::DirectoryNotEmpty(owned()),
        _ => FsError::Io {
            path: owned(),
            code: Some(code),
            source: io::Error::from_raw_os_error(code),
        },
    }
}

/// Snapshot of a failure as stored in a call record.
///
/// `FsError` owns an `io::Error` and cannot be cloned; the audit trail keeps
/// the kind and rendered message instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedError {
    /// Failure kind, e.g. `"NotFound"` or `"Io"`; `"Panic"` for a verb that
    /// unwound.
    pub kind: String,
    pub message: String,
    pub code: Option<i32>,
}

impl CapturedError {
    /// Kind recorded for a verb that panicked instead of returning.
    pub const PANIC: &'static str = "Panic";

    pub fn panicked(method: &str) -> Self {
        Self {
            kind: Self::PANIC.to_string(),
            message: format!("{method} panicked"),
            code: None,
        }
    }
}

impl From<&FsError> for CapturedError {
    fn from(err: &FsError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
            code: err.code(),
        }
    }
}

/// Result type for verbs: `Err` is the unhandled-propagation channel.
pub type FsResult<T> = Result<T, FsError>;
