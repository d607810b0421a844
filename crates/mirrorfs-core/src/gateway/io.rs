//! Data verbs: read, write, flush, size changes and range locks.
//!
//! With an owned handle the native call runs under the context's handle
//! lock, so one positioned transfer happens at a time per handle. Without
//! one, the verb opens the path for this call only.

use std::io;

use super::{MirrorGateway, settle_reply};
use crate::error::{FsError, FsResult};
use crate::record::Operation;
use crate::status::{NtStatus, Reply};
use crate::types::HostFileInfo;

impl MirrorGateway {
    /// Read into `buffer` from `offset`. Replies with the byte count.
    pub fn read_file(
        &self,
        file_name: &str,
        buffer: &mut [u8],
        offset: u64,
        info: &HostFileInfo,
    ) -> FsResult<Reply<usize>> {
        let path = self.fs.resolve(file_name);
        self.run(info, file_name, Operation::ReadFile, |ctx| {
            let owned = ctx.with_handle(|handle| {
                handle
                    .is_readable()
                    .then(|| handle.read_at(offset, buffer))
            });
            let read = match owned.flatten() {
                Some(result) => result.map_err(|e| FsError::from_io(e, &path)),
                None => self.fs.read_at_path(&path, offset, buffer),
            };
            match read {
                Ok(count) => {
                    ctx.mark_read();
                    Ok(Reply::ok(count))
                }
                Err(err) => settle_reply(err),
            }
        })
    }

    /// Write `data` at `offset`. Replies with the byte count.
    pub fn write_file(
        &self,
        file_name: &str,
        data: &[u8],
        offset: u64,
        info: &HostFileInfo,
    ) -> FsResult<Reply<usize>> {
        let path = self.fs.resolve(file_name);
        self.run(info, file_name, Operation::WriteFile, |ctx| {
            let owned = ctx.with_handle(|handle| {
                handle
                    .is_writable()
                    .then(|| handle.write_at(offset, data))
            });
            let written = match owned.flatten() {
                Some(result) => result.map_err(|e| FsError::from_io(e, &path)),
                None => self.fs.write_at_path(&path, offset, data),
            };
            match written {
                Ok(count) => {
                    ctx.mark_written();
                    Ok(Reply::ok(count))
                }
                Err(err) => settle_reply(err),
            }
        })
    }

    /// Flush the owned handle. Without one there is nothing buffered.
    pub fn flush_file_buffers(&self, file_name: &str, info: &HostFileInfo) -> FsResult<NtStatus> {
        self.run(info, file_name, Operation::FlushFileBuffers, |ctx| {
            match ctx.with_handle(|handle| handle.flush()) {
                None | Some(Ok(())) => Ok(NtStatus::Success),
                Some(Err(err)) => Ok(size_failure(&err)),
            }
        })
    }

    pub fn set_end_of_file(&self, file_name: &str, length: u64, info: &HostFileInfo) -> FsResult<NtStatus> {
        let path = self.fs.resolve(file_name);
        self.run(info, file_name, Operation::SetEndOfFile, |ctx| {
            let result = ctx
                .with_handle(|handle| handle.set_len(length))
                .unwrap_or_else(|| self.fs.set_len_at_path(&path, length));
            Ok(result.map_or_else(|err| size_failure(&err), |()| NtStatus::Success))
        })
    }

    /// Shrink to `length`. Growing the allocation is a no-op.
    pub fn set_allocation_size(&self, file_name: &str, length: u64, info: &HostFileInfo) -> FsResult<NtStatus> {
        let path = self.fs.resolve(file_name);
        self.run(info, file_name, Operation::SetAllocationSize, |ctx| {
            let path = path.as_path();
            let result = ctx
                .with_handle(|handle| shrink_to(handle.len()?, length, |len| handle.set_len(len)))
                .unwrap_or_else(|| {
                    let current = self.fs.len_at_path(path)?;
                    shrink_to(current, length, |len| self.fs.set_len_at_path(path, len))
                });
            Ok(result.map_or_else(|err| size_failure(&err), |()| NtStatus::Success))
        })
    }

    /// Take a range lock on the owned handle.
    pub fn lock_file(&self, file_name: &str, offset: u64, length: u64, info: &HostFileInfo) -> FsResult<NtStatus> {
        self.run(info, file_name, Operation::LockFile, |ctx| {
            Ok(range_lock(file_name, ctx.with_handle(|h| h.lock_range(offset, length))))
        })
    }

    pub fn unlock_file(&self, file_name: &str, offset: u64, length: u64, info: &HostFileInfo) -> FsResult<NtStatus> {
        self.run(info, file_name, Operation::UnlockFile, |ctx| {
            Ok(range_lock(file_name, ctx.with_handle(|h| h.unlock_range(offset, length))))
        })
    }
}

fn shrink_to(current: u64, length: u64, set_len: impl FnOnce(u64) -> io::Result<()>) -> io::Result<()> {
    if length < current { set_len(length) } else { Ok(()) }
}

/// Outcome for a failed flush or size change.
fn size_failure(err: &io::Error) -> NtStatus {
    match err.kind() {
        io::ErrorKind::PermissionDenied => NtStatus::AccessDenied,
        io::ErrorKind::NotFound => NtStatus::FileNotFound,
        _ => NtStatus::DiskFull,
    }
}

fn range_lock(file_name: &str, result: Option<io::Result<()>>) -> NtStatus {
    match result {
        None => NtStatus::InvalidHandle,
        Some(Ok(())) => NtStatus::Success,
        Some(Err(err)) => {
            tracing::debug!(path = file_name, error = %err, "range lock refused");
            NtStatus::AccessDenied
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MirrorConfig;
    use crate::flags::{FileAccess, FileAttributes, FileMode, FileShare};
    use tempfile::TempDir;

    fn setup() -> (MirrorGateway, TempDir) {
        let dir = TempDir::new().unwrap();
        let gw = MirrorGateway::new(&MirrorConfig::with_root(dir.path())).unwrap();
        (gw, dir)
    }

    fn create(gw: &MirrorGateway, name: &str, access: FileAccess) -> HostFileInfo {
        let mut info = HostFileInfo::new(1);
        let status = gw
            .create_file(
                name,
                access,
                FileShare::READ | FileShare::WRITE,
                FileMode::OpenOrCreate,
                FileAttributes::empty(),
                &mut info,
            )
            .unwrap();
        assert!(status.is_success());
        info
    }

    #[test]
    fn test_write_then_read_through_handle() {
        let (gw, _dir) = setup();
        let info = create(&gw, "\\rw.bin", FileAccess::GENERIC_READ | FileAccess::GENERIC_WRITE);
        let written = gw.write_file("\\rw.bin", b"abcdef", 0, &info).unwrap();
        assert_eq!(written, Reply::ok(6));
        let mut buf = [0u8; 3];
        let read = gw.read_file("\\rw.bin", &mut buf, 2, &info).unwrap();
        assert_eq!(read.data, 3);
        assert_eq!(&buf, b"cde");

        let ctx = gw.context(&info.context.unwrap()).unwrap();
        assert!(ctx.been_read() && ctx.been_written());
    }

    #[test]
    fn test_read_without_handle_reopens_path() {
        let (gw, dir) = setup();
        std::fs::write(dir.path().join("meta.txt"), b"hello").unwrap();
        let mut info = HostFileInfo::new(1);
        gw.create_file(
            "\\meta.txt",
            FileAccess::READ_ATTRIBUTES,
            FileShare::READ,
            FileMode::Open,
            FileAttributes::empty(),
            &mut info,
        )
        .unwrap();
        let mut buf = [0u8; 5];
        let read = gw.read_file("\\meta.txt", &mut buf, 0, &info).unwrap();
        assert_eq!(read.data, 5);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn test_read_missing_without_context() {
        let (gw, _dir) = setup();
        let mut buf = [0u8; 4];
        let read = gw
            .read_file("\\absent", &mut buf, 0, &HostFileInfo::new(1))
            .unwrap();
        assert_eq!(read.status, NtStatus::FileNotFound);
        assert_eq!(read.data, 0);
    }

    #[test]
    fn test_flush_without_handle_succeeds() {
        let (gw, _dir) = setup();
        let status = gw.flush_file_buffers("\\x", &HostFileInfo::new(1)).unwrap();
        assert_eq!(status, NtStatus::Success);
    }

    #[test]
    fn test_end_of_file_and_allocation() {
        let (gw, dir) = setup();
        let info = create(&gw, "\\len.bin", FileAccess::GENERIC_WRITE);
        let path = dir.path().join("len.bin");
        assert_eq!(gw.set_end_of_file("\\len.bin", 100, &info).unwrap(), NtStatus::Success);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 100);

        // Growth is ignored, shrink applies
        gw.set_allocation_size("\\len.bin", 500, &info).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 100);
        gw.set_allocation_size("\\len.bin", 10, &info).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 10);
    }

    #[test]
    fn test_end_of_file_missing_path() {
        let (gw, _dir) = setup();
        let status = gw.set_end_of_file("\\none", 1, &HostFileInfo::new(1)).unwrap();
        assert_eq!(status, NtStatus::FileNotFound);
    }

    #[test]
    fn test_lock_requires_handle() {
        let (gw, _dir) = setup();
        let status = gw.lock_file("\\x", 0, 10, &HostFileInfo::new(1)).unwrap();
        assert_eq!(status, NtStatus::InvalidHandle);

        let info = create(&gw, "\\locked", FileAccess::GENERIC_READ | FileAccess::GENERIC_WRITE);
        assert_eq!(gw.lock_file("\\locked", 0, 10, &info).unwrap(), NtStatus::Success);
        assert_eq!(gw.unlock_file("\\locked", 0, 10, &info).unwrap(), NtStatus::Success);
    }

    #[test]
    fn test_overlapping_lock_from_another_context_is_denied() {
        let (gw, _dir) = setup();
        let rw = FileAccess::GENERIC_READ | FileAccess::GENERIC_WRITE;
        let first = create(&gw, "\\l.bin", rw);
        let second = create(&gw, "\\l.bin", rw);

        assert_eq!(gw.lock_file("\\l.bin", 0, 16, &first).unwrap(), NtStatus::Success);
        assert_eq!(gw.lock_file("\\l.bin", 0, 16, &second).unwrap(), NtStatus::AccessDenied);

        // Data verbs without a handle open and close the file; the lock survives
        let mut buf = [0u8; 1];
        gw.read_file("\\l.bin", &mut buf, 0, &HostFileInfo::new(2)).unwrap();
        assert_eq!(gw.lock_file("\\l.bin", 4, 4, &second).unwrap(), NtStatus::AccessDenied);

        assert_eq!(gw.unlock_file("\\l.bin", 0, 16, &first).unwrap(), NtStatus::Success);
        assert_eq!(gw.lock_file("\\l.bin", 0, 16, &second).unwrap(), NtStatus::Success);
    }
}
