//! Namespace verbs: delete checks and move.
//!
//! Deletes only validate here. The real removal happens in `cleanup` when
//! the host sets delete-on-close.

use super::{MirrorGateway, settle};
use crate::error::{FsError, FsResult};
use crate::flags::FileAttributes;
use crate::record::Operation;
use crate::status::NtStatus;
use crate::types::HostFileInfo;

impl MirrorGateway {
    /// Check that `file_name` is a deletable file.
    pub fn delete_file(&self, file_name: &str, info: &HostFileInfo) -> FsResult<NtStatus> {
        let path = self.fs.resolve(file_name);
        self.run(info, file_name, Operation::DeleteFile, |_| {
            let probe = self.fs.probe(&path);
            if probe.is_dir {
                return Ok(NtStatus::AccessDenied);
            }
            if !probe.exists {
                return Ok(NtStatus::FileNotFound);
            }
            match self.fs.attributes(&path) {
                Ok(attrs) if attrs.contains(FileAttributes::DIRECTORY) => Ok(NtStatus::AccessDenied),
                Ok(_) => Ok(NtStatus::Success),
                Err(err) => settle(err),
            }
        })
    }

    /// Check that `file_name` is an empty directory.
    pub fn delete_directory(&self, file_name: &str, info: &HostFileInfo) -> FsResult<NtStatus> {
        let path = self.fs.resolve(file_name);
        self.run(info, file_name, Operation::DeleteDirectory, |_| {
            match self.fs.is_dir_empty(&path) {
                Ok(true) => Ok(NtStatus::Success),
                Ok(false) => Ok(NtStatus::DirectoryNotEmpty),
                Err(err) => settle(err),
            }
        })
    }

    /// Rename `old_name` to `new_name`.
    ///
    /// The owned handle is released first. An existing destination is
    /// replaced only when `replace` is set and neither side is a directory.
    pub fn move_file(
        &self,
        old_name: &str,
        new_name: &str,
        replace: bool,
        info: &HostFileInfo,
    ) -> FsResult<NtStatus> {
        let old_path = self.fs.resolve(old_name);
        let new_path = self.fs.resolve(new_name);
        self.run(info, old_name, Operation::MoveFile, |ctx| {
            ctx.release();
            let target = self.fs.probe(&new_path);

            let moved = if !target.exists {
                self.fs.rename(&old_path, &new_path)
            } else if replace {
                if info.is_directory || target.is_dir {
                    return Ok(NtStatus::AccessDenied);
                }
                self.fs
                    .remove_file(&new_path)
                    .and_then(|()| self.fs.rename(&old_path, &new_path))
            } else {
                return Ok(NtStatus::FileExists);
            };

            match moved {
                Ok(()) => Ok(NtStatus::Success),
                Err(err @ (FsError::AccessDenied(_) | FsError::NotFound(_) | FsError::PathNotFound(_))) => {
                    settle(err)
                }
                Err(err) => Err(err),
            }
        })
    }
}
