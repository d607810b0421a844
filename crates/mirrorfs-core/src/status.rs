//! Host-visible outcome codes.
//!
//! `NtStatus` is the vocabulary every verb answers the host with. The numeric
//! values are the NTSTATUS codes a Dokan-style host expects, so an adapter can
//! forward them unchanged.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

/// Structured outcome of one verb invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
pub enum NtStatus {
    /// The verb completed.
    Success,
    /// Informational: an open-or-create/overwrite found an existing file.
    /// The open itself succeeded.
    AlreadyExists,
    /// The target already exists and the disposition forbids that.
    FileExists,
    FileNotFound,
    PathNotFound,
    AccessDenied,
    SharingViolation,
    NotADirectory,
    DirectoryNotEmpty,
    DiskFull,
    NotImplemented,
    InvalidParameter,
    InvalidHandle,
    NameTooLong,
    DriveNotFound,
    /// The native call reported that the operation was aborted.
    Cancelled,
    /// Generic failure with no native code attached.
    Unsuccessful,
    /// Generic I/O failure carrying the native error code.
    IoFailure(i32),
}

impl NtStatus {
    /// True for outcomes the host treats as a completed call.
    pub fn is_success(&self) -> bool {
        matches!(self, NtStatus::Success | NtStatus::AlreadyExists)
    }

    /// The NTSTATUS value for this outcome.
    pub fn code(&self) -> u32 {
        match self {
            NtStatus::Success => 0x0000_0000,
            NtStatus::AlreadyExists => 0x4000_0000,
            NtStatus::FileExists => 0xC000_0035,
            NtStatus::FileNotFound => 0xC000_0034,
            NtStatus::PathNotFound => 0xC000_003A,
            NtStatus::AccessDenied => 0xC000_0022,
            NtStatus::SharingViolation => 0xC000_0043,
            NtStatus::NotADirectory => 0xC000_0103,
            NtStatus::DirectoryNotEmpty => 0xC000_0101,
            NtStatus::DiskFull => 0xC000_007F,
            NtStatus::NotImplemented => 0xC000_0002,
            NtStatus::InvalidParameter => 0xC000_000D,
            NtStatus::InvalidHandle => 0xC000_0008,
            NtStatus::NameTooLong => 0xC000_0106,
            NtStatus::DriveNotFound => 0xC000_000E,
            NtStatus::Cancelled => 0xC000_0120,
            NtStatus::Unsuccessful => 0xC000_0001,
            NtStatus::IoFailure(_) => 0xC000_00E9,
        }
    }
}

/// Anything a verb returns that carries an outcome.
///
/// The instrumentation layer reads the status through this trait so it can
/// wrap verbs with and without a payload alike.
pub trait HasStatus {
    fn status(&self) -> NtStatus;
}

impl HasStatus for NtStatus {
    fn status(&self) -> NtStatus {
        *self
    }
}

/// Outcome plus payload for verbs that produce data.
///
/// On a failure outcome the payload is the type's default (empty listing,
/// zero bytes, `None`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply<T> {
    pub status: NtStatus,
    pub data: T,
}

impl<T> Reply<T> {
    /// A successful reply carrying `data`.
    pub fn ok(data: T) -> Self {
        Self {
            status: NtStatus::Success,
            data,
        }
    }

    /// A reply with an explicit status and payload.
    pub fn with_status(status: NtStatus, data: T) -> Self {
        Self { status, data }
    }
}

impl<T: Default> Reply<T> {
    /// A reply with no payload, typically a failure outcome.
    pub fn empty(status: NtStatus) -> Self {
        Self {
            status,
            data: T::default(),
        }
    }
}

impl<T> HasStatus for Reply<T> {
    fn status(&self) -> NtStatus {
        self.status
    }
}
