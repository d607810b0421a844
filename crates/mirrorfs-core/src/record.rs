//! Call records: one entry in a context's audit history.

use std::time::{Instant, SystemTime};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoStaticStr};

use crate::error::CapturedError;
use crate::status::NtStatus;

/// Which contract verb a record describes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, IntoStaticStr, EnumIter,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    CreateFile,
    Cleanup,
    CloseFile,
    ReadFile,
    WriteFile,
    FlushFileBuffers,
    GetFileInformation,
    FindFiles,
    FindFilesWithPattern,
    FindStreams,
    SetFileAttributes,
    SetFileTime,
    DeleteFile,
    DeleteDirectory,
    MoveFile,
    SetEndOfFile,
    SetAllocationSize,
    LockFile,
    UnlockFile,
    GetDiskFreeSpace,
    GetVolumeInformation,
    GetFileSecurity,
    SetFileSecurity,
    Mounted,
    Unmounted,
}

impl Operation {
    /// Name as logged and published.
    pub fn name(&self) -> &'static str {
        self.into()
    }
}

/// One finalized operation attempt.
///
/// `status` is `None` when the verb propagated an error or panicked before
/// producing an outcome; `error` then describes what happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    pub operation: Operation,
    pub started_at: SystemTime,
    pub ended_at: SystemTime,
    pub status: Option<NtStatus>,
    pub error: Option<CapturedError>,
    /// Number of consecutive identical calls folded into this record.
    pub repeat: u32,
}

impl CallRecord {
    /// Start timing a call.
    pub fn begin(operation: Operation) -> PendingCall {
        PendingCall {
            operation,
            started_at: SystemTime::now(),
            clock: Instant::now(),
        }
    }

    /// Same operation, same outcome and same failure kind.
    pub fn is_repeat_of(&self, other: &CallRecord) -> bool {
        self.operation == other.operation
            && self.status == other.status
            && self.error.as_ref().map(|e| e.kind.as_str())
                == other.error.as_ref().map(|e| e.kind.as_str())
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.ended_at
            .duration_since(self.started_at)
            .unwrap_or_default()
    }

    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// A call in progress.
#[derive(Debug)]
pub struct PendingCall {
    operation: Operation,
    started_at: SystemTime,
    clock: Instant,
}

impl PendingCall {
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Finalize with the outcome and captured failure.
    ///
    /// The end time is derived from the monotonic clock, so it never precedes
    /// the start even if the wall clock steps backwards mid-call.
    pub fn finish(self, status: Option<NtStatus>, error: Option<CapturedError>) -> CallRecord {
        CallRecord {
            operation: self.operation,
            started_at: self.started_at,
            ended_at: self.started_at + self.clock.elapsed(),
            status,
            error,
            repeat: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    fn record(status: Option<NtStatus>, error: Option<&str>) -> CallRecord {
        CallRecord::begin(Operation::ReadFile).finish(
            status,
            error.map(|kind| CapturedError {
                kind: kind.to_string(),
                message: String::new(),
                code: None,
            }),
        )
    }

    #[test]
    fn test_finish_orders_timestamps() {
        let rec = record(Some(NtStatus::Success), None);
        assert!(rec.ended_at >= rec.started_at);
        assert_eq!(rec.repeat, 1);
    }

    #[test]
    fn test_repeat_identity() {
        let ok = record(Some(NtStatus::Success), None);
        assert!(ok.is_repeat_of(&record(Some(NtStatus::Success), None)));
        assert!(!ok.is_repeat_of(&record(Some(NtStatus::AccessDenied), None)));

        let io = record(None, Some("Io"));
        assert!(io.is_repeat_of(&record(None, Some("Io"))));
        assert!(!io.is_repeat_of(&record(None, Some("NotFound"))));

        let other_op = CallRecord::begin(Operation::WriteFile).finish(Some(NtStatus::Success), None);
        assert!(!ok.is_repeat_of(&other_op));
    }

    #[test]
    fn test_operation_names_are_snake_case() {
        assert_eq!(Operation::FindFilesWithPattern.name(), "find_files_with_pattern");
        assert_eq!(Operation::iter().count(), 25);
    }
}
