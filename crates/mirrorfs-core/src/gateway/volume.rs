//! Volume verbs. None of them carry a path, so they are audited on the
//! gateway's volume context.

use super::{MirrorGateway, settle_reply};
use crate::error::FsResult;
use crate::record::Operation;
use crate::status::{NtStatus, Reply};
use crate::types::{DiskSpace, HostFileInfo, VolumeInformation};

impl MirrorGateway {
    pub fn get_disk_free_space(&self, _info: &HostFileInfo) -> FsResult<Reply<DiskSpace>> {
        self.run_volume(Operation::GetDiskFreeSpace, || match self.fs.disk_space() {
            Ok(space) => Ok(Reply::ok(space)),
            Err(err) => settle_reply(err),
        })
    }

    /// Label, serial and features come from configuration. The component
    /// length limit is read from the backing volume.
    pub fn get_volume_information(&self, _info: &HostFileInfo) -> FsResult<Reply<VolumeInformation>> {
        self.run_volume(Operation::GetVolumeInformation, || {
            let max_component_length = match self.fs.max_component_length() {
                Ok(len) => len,
                Err(err) => return settle_reply(err),
            };
            Ok(Reply::ok(VolumeInformation {
                label: self.volume.label.clone(),
                serial_number: self.volume.serial_number,
                max_component_length,
                features: self.volume.features,
                file_system_name: self.volume.file_system_name.clone(),
            }))
        })
    }

    pub fn mounted(&self, info: &HostFileInfo) -> FsResult<NtStatus> {
        self.run_volume(Operation::Mounted, || {
            tracing::info!(
                root = %self.fs.root().display(),
                process_id = info.process_id,
                label = %self.volume.label,
                "volume mounted"
            );
            Ok(NtStatus::Success)
        })
    }

    /// Close every context still open. Handles are released and each
    /// context publishes its closed event.
    pub fn unmounted(&self, info: &HostFileInfo) -> FsResult<NtStatus> {
        self.run_volume(Operation::Unmounted, || {
            let open = self.contexts.drain();
            for ctx in &open {
                ctx.release();
                ctx.mark_closed();
            }
            tracing::info!(
                root = %self.fs.root().display(),
                process_id = info.process_id,
                closed = open.len(),
                "volume unmounted"
            );
            Ok(NtStatus::Success)
        })
    }
}
