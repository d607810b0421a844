//! Host verb trait.
//!
//! A host adapter drives the filesystem through this trait. Every verb takes
//! the caller's [`HostFileInfo`]; paths are host paths (`\dir\file.txt`)
//! relative to the mirrored root.
//!
//! Verbs return `Ok(status)` for outcomes the host should see as an
//! `NTSTATUS`, and `Err` only for failures the adapter should surface as a
//! hard error.

use crate::error::FsResult;
use crate::flags::{AccessControlSections, FileAccess, FileAttributes, FileMode, FileShare};
use crate::gateway::MirrorGateway;
use crate::status::{NtStatus, Reply};
use crate::types::{
    DiskSpace, FileInformation, FileSecurity, FileTimestamps, HostFileInfo, VolumeInformation,
};

/// The full set of verbs a user-mode filesystem host issues.
pub trait FsOperations: Send + Sync {
    // ========================================================================
    // Handle lifecycle
    // ========================================================================

    /// Open or create `file_name`.
    ///
    /// On success `info.context` names the new request context and
    /// `info.is_directory` is set when the target is a directory.
    fn create_file(
        &self,
        file_name: &str,
        access: FileAccess,
        share: FileShare,
        mode: FileMode,
        attributes: FileAttributes,
        info: &mut HostFileInfo,
    ) -> FsResult<NtStatus>;

    /// Last user handle closed. Performs delete-on-close.
    fn cleanup(&self, file_name: &str, info: &HostFileInfo) -> FsResult<NtStatus>;

    /// Handle fully closed. The context is finished after this.
    fn close_file(&self, file_name: &str, info: &HostFileInfo) -> FsResult<NtStatus>;

    // ========================================================================
    // Data
    // ========================================================================

    fn read_file(&self, file_name: &str, buffer: &mut [u8], offset: u64, info: &HostFileInfo)
    -> FsResult<Reply<usize>>;

    fn write_file(&self, file_name: &str, data: &[u8], offset: u64, info: &HostFileInfo) -> FsResult<Reply<usize>>;

    fn flush_file_buffers(&self, file_name: &str, info: &HostFileInfo) -> FsResult<NtStatus>;

    fn set_end_of_file(&self, file_name: &str, length: u64, info: &HostFileInfo) -> FsResult<NtStatus>;

    fn set_allocation_size(&self, file_name: &str, length: u64, info: &HostFileInfo) -> FsResult<NtStatus>;

    fn lock_file(&self, file_name: &str, offset: u64, length: u64, info: &HostFileInfo) -> FsResult<NtStatus>;

    fn unlock_file(&self, file_name: &str, offset: u64, length: u64, info: &HostFileInfo) -> FsResult<NtStatus>;

    // ========================================================================
    // Metadata
    // ========================================================================

    fn get_file_information(&self, file_name: &str, info: &HostFileInfo) -> FsResult<Reply<FileInformation>>;

    fn find_files(&self, file_name: &str, info: &HostFileInfo) -> FsResult<Reply<Vec<FileInformation>>>;

    /// Listing filtered by a DOS wildcard expression.
    fn find_files_with_pattern(
        &self,
        file_name: &str,
        pattern: &str,
        info: &HostFileInfo,
    ) -> FsResult<Reply<Vec<FileInformation>>>;

    fn find_streams(&self, file_name: &str, info: &HostFileInfo) -> FsResult<Reply<Vec<FileInformation>>>;

    fn set_file_attributes(&self, file_name: &str, attributes: FileAttributes, info: &HostFileInfo)
    -> FsResult<NtStatus>;

    fn set_file_time(&self, file_name: &str, times: FileTimestamps, info: &HostFileInfo) -> FsResult<NtStatus>;

    fn get_file_security(
        &self,
        file_name: &str,
        sections: AccessControlSections,
        info: &HostFileInfo,
    ) -> FsResult<Reply<FileSecurity>>;

    fn set_file_security(
        &self,
        file_name: &str,
        security: &FileSecurity,
        sections: AccessControlSections,
        info: &HostFileInfo,
    ) -> FsResult<NtStatus>;

    // ========================================================================
    // Namespace
    // ========================================================================

    /// Validate a file delete. Removal happens at cleanup.
    fn delete_file(&self, file_name: &str, info: &HostFileInfo) -> FsResult<NtStatus>;

    /// Validate a directory delete. Removal happens at cleanup.
    fn delete_directory(&self, file_name: &str, info: &HostFileInfo) -> FsResult<NtStatus>;

    fn move_file(&self, old_name: &str, new_name: &str, replace: bool, info: &HostFileInfo) -> FsResult<NtStatus>;

    // ========================================================================
    // Volume
    // ========================================================================

    fn get_disk_free_space(&self, info: &HostFileInfo) -> FsResult<Reply<DiskSpace>>;

    fn get_volume_information(&self, info: &HostFileInfo) -> FsResult<Reply<VolumeInformation>>;

    fn mounted(&self, info: &HostFileInfo) -> FsResult<NtStatus>;

    fn unmounted(&self, info: &HostFileInfo) -> FsResult<NtStatus>;
}

impl FsOperations for MirrorGateway {
    fn create_file(
        &self,
        file_name: &str,
        access: FileAccess,
        share: FileShare,
        mode: FileMode,
        attributes: FileAttributes,
        info: &mut HostFileInfo,
    ) -> FsResult<NtStatus> {
        MirrorGateway::create_file(self, file_name, access, share, mode, attributes, info)
    }

    fn cleanup(&self, file_name: &str, info: &HostFileInfo) -> FsResult<NtStatus> {
        MirrorGateway::cleanup(self, file_name, info)
    }

    fn close_file(&self, file_name: &str, info: &HostFileInfo) -> FsResult<NtStatus> {
        MirrorGateway::close_file(self, file_name, info)
    }

    fn read_file(
        &self,
        file_name: &str,
        buffer: &mut [u8],
        offset: u64,
        info: &HostFileInfo,
    ) -> FsResult<Reply<usize>> {
        MirrorGateway::read_file(self, file_name, buffer, offset, info)
    }

    fn write_file(&self, file_name: &str, data: &[u8], offset: u64, info: &HostFileInfo) -> FsResult<Reply<usize>> {
        MirrorGateway::write_file(self, file_name, data, offset, info)
    }

    fn flush_file_buffers(&self, file_name: &str, info: &HostFileInfo) -> FsResult<NtStatus> {
        MirrorGateway::flush_file_buffers(self, file_name, info)
    }

    fn set_end_of_file(&self, file_name: &str, length: u64, info: &HostFileInfo) -> FsResult<NtStatus> {
        MirrorGateway::set_end_of_file(self, file_name, length, info)
    }

    fn set_allocation_size(&self, file_name: &str, length: u64, info: &HostFileInfo) -> FsResult<NtStatus> {
        MirrorGateway::set_allocation_size(self, file_name, length, info)
    }

    fn lock_file(&self, file_name: &str, offset: u64, length: u64, info: &HostFileInfo) -> FsResult<NtStatus> {
        MirrorGateway::lock_file(self, file_name, offset, length, info)
    }

    fn unlock_file(&self, file_name: &str, offset: u64, length: u64, info: &HostFileInfo) -> FsResult<NtStatus> {
        MirrorGateway::unlock_file(self, file_name, offset, length, info)
    }

    fn get_file_information(&self, file_name: &str, info: &HostFileInfo) -> FsResult<Reply<FileInformation>> {
        MirrorGateway::get_file_information(self, file_name, info)
    }

    fn find_files(&self, file_name: &str, info: &HostFileInfo) -> FsResult<Reply<Vec<FileInformation>>> {
        MirrorGateway::find_files(self, file_name, info)
    }

    fn find_files_with_pattern(
        &self,
        file_name: &str,
        pattern: &str,
        info: &HostFileInfo,
    ) -> FsResult<Reply<Vec<FileInformation>>> {
        MirrorGateway::find_files_with_pattern(self, file_name, pattern, info)
    }

    fn find_streams(&self, file_name: &str, info: &HostFileInfo) -> FsResult<Reply<Vec<FileInformation>>> {
        MirrorGateway::find_streams(self, file_name, info)
    }

    fn set_file_attributes(
        &self,
        file_name: &str,
        attributes: FileAttributes,
        info: &HostFileInfo,
    ) -> FsResult<NtStatus> {
        MirrorGateway::set_file_attributes(self, file_name, attributes, info)
    }

    fn set_file_time(&self, file_name: &str, times: FileTimestamps, info: &HostFileInfo) -> FsResult<NtStatus> {
        MirrorGateway::set_file_time(self, file_name, times, info)
    }

    fn get_file_security(
        &self,
        file_name: &str,
        sections: AccessControlSections,
        info: &HostFileInfo,
    ) -> FsResult<Reply<FileSecurity>> {
        MirrorGateway::get_file_security(self, file_name, sections, info)
    }

    fn set_file_security(
        &self,
        file_name: &str,
        security: &FileSecurity,
        sections: AccessControlSections,
        info: &HostFileInfo,
    ) -> FsResult<NtStatus> {
        MirrorGateway::set_file_security(self, file_name, security, sections, info)
    }

    fn delete_file(&self, file_name: &str, info: &HostFileInfo) -> FsResult<NtStatus> {
        MirrorGateway::delete_file(self, file_name, info)
    }

    fn delete_directory(&self, file_name: &str, info: &HostFileInfo) -> FsResult<NtStatus> {
        MirrorGateway::delete_directory(self, file_name, info)
    }

    fn move_file(&self, old_name: &str, new_name: &str, replace: bool, info: &HostFileInfo) -> FsResult<NtStatus> {
        MirrorGateway::move_file(self, old_name, new_name, replace, info)
    }

    fn get_disk_free_space(&self, info: &HostFileInfo) -> FsResult<Reply<DiskSpace>> {
        MirrorGateway::get_disk_free_space(self, info)
    }

    fn get_volume_information(&self, info: &HostFileInfo) -> FsResult<Reply<VolumeInformation>> {
        MirrorGateway::get_volume_information(self, info)
    }

    fn mounted(&self, info: &HostFileInfo) -> FsResult<NtStatus> {
        MirrorGateway::mounted(self, info)
    }

    fn unmounted(&self, info: &HostFileInfo) -> FsResult<NtStatus> {
        MirrorGateway::unmounted(self, info)
    }
}
