//! Flag words of the host contract.
//!
//! Bit values match the Windows definitions so a host adapter can pass its
//! native words straight through with `from_bits_truncate`.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

bitflags! {
    /// Requested access rights for an open.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct FileAccess: u32 {
        const READ_DATA = 0x0000_0001;
        const WRITE_DATA = 0x0000_0002;
        const APPEND_DATA = 0x0000_0004;
        const READ_EXTENDED_ATTRIBUTES = 0x0000_0008;
        const WRITE_EXTENDED_ATTRIBUTES = 0x0000_0010;
        const EXECUTE = 0x0000_0020;
        const DELETE_CHILD = 0x0000_0040;
        const READ_ATTRIBUTES = 0x0000_0080;
        const WRITE_ATTRIBUTES = 0x0000_0100;
        const DELETE = 0x0001_0000;
        const READ_PERMISSIONS = 0x0002_0000;
        const CHANGE_PERMISSIONS = 0x0004_0000;
        const SET_OWNERSHIP = 0x0008_0000;
        const SYNCHRONIZE = 0x0010_0000;
        const GENERIC_ALL = 0x1000_0000;
        const GENERIC_EXECUTE = 0x2000_0000;
        const GENERIC_WRITE = 0x4000_0000;
        const GENERIC_READ = 0x8000_0000;
    }
}

impl FileAccess {
    /// Rights that need a data stream.
    pub const DATA_ACCESS: Self = Self::READ_DATA
        .union(Self::WRITE_DATA)
        .union(Self::APPEND_DATA)
        .union(Self::EXECUTE)
        .union(Self::GENERIC_EXECUTE)
        .union(Self::GENERIC_WRITE)
        .union(Self::GENERIC_READ);

    /// Rights that modify the data stream or the entry itself.
    pub const DATA_WRITE_ACCESS: Self = Self::WRITE_DATA
        .union(Self::APPEND_DATA)
        .union(Self::DELETE)
        .union(Self::GENERIC_WRITE);

    /// True when the open needs a real data stream.
    pub fn needs_data(&self) -> bool {
        self.intersects(Self::DATA_ACCESS) || self.contains(Self::GENERIC_ALL)
    }

    /// True when an open must hand back a real data stream.
    ///
    /// Generic rights count as the data rights they imply.
    pub fn opens_stream(&self) -> bool {
        self.intersects(
            Self::READ_DATA
                | Self::WRITE_DATA
                | Self::APPEND_DATA
                | Self::GENERIC_READ
                | Self::GENERIC_WRITE
                | Self::GENERIC_ALL,
        )
    }

    pub fn wants_read(&self) -> bool {
        self.intersects(
            Self::READ_DATA | Self::EXECUTE | Self::GENERIC_READ | Self::GENERIC_EXECUTE | Self::GENERIC_ALL,
        )
    }

    pub fn wants_write(&self) -> bool {
        self.intersects(Self::DATA_WRITE_ACCESS | Self::GENERIC_ALL)
    }

    /// Delete requested without synchronize: a directory delete.
    pub fn is_directory_delete(&self) -> bool {
        self.contains(Self::DELETE) && !self.contains(Self::SYNCHRONIZE)
    }
}

bitflags! {
    /// Sharing the opener grants to later opens of the same file.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct FileShare: u32 {
        const READ = 0x01;
        const WRITE = 0x02;
        const DELETE = 0x04;
        const INHERITABLE = 0x10;
    }
}

bitflags! {
    /// Host file attribute bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct FileAttributes: u32 {
        const READONLY = 0x0000_0001;
        const HIDDEN = 0x0000_0002;
        const SYSTEM = 0x0000_0004;
        const DIRECTORY = 0x0000_0010;
        const ARCHIVE = 0x0000_0020;
        const NORMAL = 0x0000_0080;
        const TEMPORARY = 0x0000_0100;
        const SPARSE_FILE = 0x0000_0200;
        const REPARSE_POINT = 0x0000_0400;
        const COMPRESSED = 0x0000_0800;
        const OFFLINE = 0x0000_1000;
        const NOT_CONTENT_INDEXED = 0x0000_2000;
        const ENCRYPTED = 0x0000_4000;
    }
}

impl FileAttributes {
    /// Bits derived from real metadata rather than stored.
    pub const DERIVED: Self = Self::READONLY.union(Self::DIRECTORY);
}

bitflags! {
    /// Capabilities advertised in the volume information.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct FileSystemFeatures: u32 {
        const CASE_SENSITIVE_SEARCH = 0x0000_0001;
        const CASE_PRESERVED_NAMES = 0x0000_0002;
        const UNICODE_ON_DISK = 0x0000_0004;
        const PERSISTENT_ACLS = 0x0000_0008;
        const SUPPORTS_REMOTE_STORAGE = 0x0000_0100;
    }
}

bitflags! {
    /// Parts of a security descriptor a query or update touches.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct AccessControlSections: u32 {
        const OWNER = 0x01;
        const GROUP = 0x02;
        const ACCESS = 0x04;
    }
}

/// Open disposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, IntoStaticStr)]
pub enum FileMode {
    /// Create; fail if the target exists.
    CreateNew = 1,
    /// Create, or truncate an existing target.
    Create = 2,
    /// Open; fail if the target is missing.
    Open = 3,
    OpenOrCreate = 4,
    /// Open and truncate; fail if the target is missing.
    Truncate = 5,
    Append = 6,
}

impl FileMode {
    /// Dispositions that may bring a new file into existence.
    pub fn may_create(&self) -> bool {
        matches!(
            self,
            FileMode::CreateNew | FileMode::Create | FileMode::OpenOrCreate | FileMode::Append
        )
    }

    /// Dispositions that reset an existing file to zero length.
    pub fn truncates(&self) -> bool {
        matches!(self, FileMode::Create | FileMode::Truncate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_access_detection() {
        assert!(FileAccess::READ_DATA.needs_data());
        assert!(FileAccess::GENERIC_WRITE.needs_data());
        assert!(FileAccess::GENERIC_ALL.needs_data());
        assert!(!(FileAccess::READ_ATTRIBUTES | FileAccess::WRITE_ATTRIBUTES).needs_data());
        assert!(!FileAccess::SYNCHRONIZE.needs_data());
        assert!(FileAccess::GENERIC_READ.opens_stream());
        assert!(!FileAccess::EXECUTE.opens_stream());
    }

    #[test]
    fn test_directory_delete_requires_missing_synchronize() {
        assert!(FileAccess::DELETE.is_directory_delete());
        assert!(!(FileAccess::DELETE | FileAccess::SYNCHRONIZE).is_directory_delete());
        assert!(!FileAccess::READ_ATTRIBUTES.is_directory_delete());
    }

    #[test]
    fn test_read_write_intent() {
        let rw = FileAccess::GENERIC_READ | FileAccess::GENERIC_WRITE;
        assert!(rw.wants_read() && rw.wants_write());
        assert!(FileAccess::APPEND_DATA.wants_write());
        assert!(!FileAccess::APPEND_DATA.wants_read());
    }

    #[test]
    fn test_mode_helpers() {
        assert!(FileMode::OpenOrCreate.may_create());
        assert!(!FileMode::Truncate.may_create());
        assert!(FileMode::Truncate.truncates());
        assert!(!FileMode::CreateNew.truncates());
        assert_eq!(FileMode::CreateNew.to_string(), "CreateNew");
    }
}
