//! Real filesystem collaborator.
//!
//! `LocalFs` performs the native side of every verb against a mirror root on
//! the local filesystem. Request paths are appended to the root as given,
//! with host `\` separators turned into `/`; nothing else is normalized, so
//! the real filesystem's own path rules apply.

use std::fs::{self, File, FileTimes, Metadata, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use crate::error::{FsError, FsResult};
use crate::flags::{AccessControlSections, FileAttributes, FileMode};
use crate::share::{ShareClaim, ShareGuard, ShareTable};
use crate::types::{DiskSpace, FileInformation, FileSecurity, FileTimestamps, OpenIntent};

/// Extended attribute holding the attribute bits POSIX cannot express.
const ATTRIBUTE_XATTR: &str = "user.mirrorfs.attributes";

/// Result of an existence probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Probe {
    pub exists: bool,
    pub is_dir: bool,
}

/// An open real file, exclusively owned by one request context.
#[derive(Debug)]
pub struct RealHandle {
    file: File,
    path: PathBuf,
    readable: bool,
    writable: bool,
    _share: ShareGuard,
}

impl RealHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn is_readable(&self) -> bool {
        self.readable
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Seek then read once. A short read is returned as is.
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read(buf)
    }

    /// Seek then write once. A short write is returned as is.
    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<usize> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write(data)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.sync_data()
    }

    pub fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.file.set_len(len)
    }

    /// Lock `[offset, offset + length)`, exclusive when the handle can write.
    ///
    /// Fails at once with the native error when another handle holds an
    /// overlapping range.
    pub fn lock_range(&self, offset: u64, length: u64) -> io::Result<()> {
        let kind = if self.writable { libc::F_WRLCK } else { libc::F_RDLCK };
        self.set_range_lock(kind, offset, length)
    }

    pub fn unlock_range(&self, offset: u64, length: u64) -> io::Result<()> {
        self.set_range_lock(libc::F_UNLCK, offset, length)
    }

    /// Open file description locks belong to this handle's open file, not
    /// the process, so two handles in one gateway contend with each other
    /// and closing an unrelated fd on the same file keeps them.
    fn set_range_lock(&self, kind: libc::c_int, offset: u64, length: u64) -> io::Result<()> {
        use std::os::fd::AsRawFd;

        let start = libc::off_t::try_from(offset).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
        let len = libc::off_t::try_from(length).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;

        // SAFETY: flock is plain old data. l_pid must stay zero for OFD locks.
        let mut request: libc::flock = unsafe { std::mem::zeroed() };
        request.l_type = kind as libc::c_short;
        request.l_whence = libc::SEEK_SET as libc::c_short;
        request.l_start = start;
        request.l_len = len;

        // SAFETY: the fd is owned by `self.file`, which outlives the call,
        // and `request` is a valid flock for F_OFD_SETLK.
        let rc = unsafe { libc::fcntl(self.file.as_raw_fd(), libc::F_OFD_SETLK, &request as *const libc::flock) };
        if rc == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

/// Local filesystem rooted at the mirror directory.
#[derive(Debug)]
pub struct LocalFs {
    root: PathBuf,
    shares: ShareTable,
}

impl LocalFs {
    /// The root must be an existing directory.
    pub fn new(root: impl Into<PathBuf>) -> FsResult<Self> {
        let root = root.into();
        let meta = fs::metadata(&root).map_err(|e| FsError::from_io(e, &root))?;
        if !meta.is_dir() {
            return Err(FsError::NotADirectory(root.display().to_string()));
        }
        Ok(Self {
            root,
            shares: ShareTable::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn shares(&self) -> &ShareTable {
        &self.shares
    }

    /// Real path for a request path.
    pub fn resolve(&self, file_name: &str) -> PathBuf {
        let mut real = self.root.as_os_str().to_os_string();
        real.push(file_name.replace('\\', "/"));
        PathBuf::from(real)
    }

    /// Existence probe. A failed probe reads as "does not exist".
    pub fn probe(&self, path: &Path) -> Probe {
        match fs::metadata(path) {
            Ok(meta) => Probe {
                exists: true,
                is_dir: meta.is_dir(),
            },
            Err(_) => Probe::default(),
        }
    }

    /// Open a data stream honouring the intent's access, share and mode.
    pub fn open(&self, path: &Path, intent: &OpenIntent) -> FsResult<RealHandle> {
        let share = self
            .shares
            .acquire(path, ShareClaim::new(intent.access, intent.share))
            .ok_or_else(|| FsError::SharingViolation(path.display().to_string()))?;

        let writable = intent.access.wants_write() || intent.mode.may_create() || intent.mode.truncates();
        let readable = intent.access.wants_read() || !writable;

        let mut options = OpenOptions::new();
        options.read(readable).write(writable);
        match intent.mode {
            FileMode::CreateNew => {
                options.create_new(true);
            }
            FileMode::Create => {
                options.create(true).truncate(true);
            }
            FileMode::Open => {}
            FileMode::OpenOrCreate | FileMode::Append => {
                options.create(true);
            }
            FileMode::Truncate => {
                options.truncate(true);
            }
        }

        let file = options
            .open(path)
            .map_err(|e| self.open_error(e, path))?;

        Ok(RealHandle {
            file,
            path: path.to_path_buf(),
            readable,
            writable,
            _share: share,
        })
    }

    /// A missing parent surfaces as path-not-found rather than not-found.
    fn open_error(&self, err: io::Error, path: &Path) -> FsError {
        let missing_parent = err.kind() == io::ErrorKind::NotFound
            && path.parent().is_some_and(|parent| !parent.exists());
        if missing_parent {
            FsError::PathNotFound(path.display().to_string())
        } else {
            FsError::from_io(err, path)
        }
    }

    /// Short-lived read for contexts without an owned handle.
    pub fn read_at_path(&self, path: &Path, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        read_once(path, offset, buf).map_err(|e| FsError::from_io(e, path))
    }

    /// Short-lived write for contexts without an owned handle.
    pub fn write_at_path(&self, path: &Path, offset: u64, data: &[u8]) -> FsResult<usize> {
        write_once(path, offset, data).map_err(|e| FsError::from_io(e, path))
    }

    pub fn set_len_at_path(&self, path: &Path, len: u64) -> io::Result<()> {
        OpenOptions::new().write(true).open(path)?.set_len(len)
    }

    pub fn len_at_path(&self, path: &Path) -> io::Result<u64> {
        Ok(fs::metadata(path)?.len())
    }

    /// Metadata for one entry, reported under `file_name`.
    pub fn file_information(&self, path: &Path, file_name: &str) -> FsResult<FileInformation> {
        let meta = fs::metadata(path).map_err(|e| FsError::from_io(e, path))?;
        Ok(self.describe(path, &meta, file_name.to_string()))
    }

    /// Immediate children of a directory.
    pub fn list(&self, path: &Path) -> FsResult<Vec<FileInformation>> {
        let entries = fs::read_dir(path).map_err(|e| FsError::from_io(e, path))?;
        let mut infos = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| FsError::from_io(e, path))?;
            let entry_path = entry.path();
            // Dangling symlinks fall back to the link's own metadata
            let meta = match fs::metadata(&entry_path) {
                Ok(meta) => meta,
                Err(_) => entry.metadata().map_err(|e| FsError::from_io(e, &entry_path))?,
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            infos.push(self.describe(&entry_path, &meta, name));
        }
        Ok(infos)
    }

    pub fn is_dir_empty(&self, path: &Path) -> FsResult<bool> {
        let mut entries = fs::read_dir(path).map_err(|e| FsError::from_io(e, path))?;
        Ok(entries.next().is_none())
    }

    fn describe(&self, path: &Path, meta: &Metadata, file_name: String) -> FileInformation {
        FileInformation {
            file_name,
            attributes: Self::attributes_of(path, meta),
            creation_time: meta.created().ok(),
            last_access_time: meta.accessed().ok(),
            last_write_time: meta.modified().ok(),
            length: if meta.is_dir() { 0 } else { meta.len() },
        }
    }

    fn attributes_of(path: &Path, meta: &Metadata) -> FileAttributes {
        let mut attrs = stored_attributes(path);
        if meta.is_dir() {
            attrs |= FileAttributes::DIRECTORY;
        }
        if meta.permissions().readonly() {
            attrs |= FileAttributes::READONLY;
        }
        if attrs.is_empty() {
            attrs = FileAttributes::NORMAL;
        }
        attrs
    }

    pub fn attributes(&self, path: &Path) -> FsResult<FileAttributes> {
        let meta = fs::metadata(path).map_err(|e| FsError::from_io(e, path))?;
        Ok(Self::attributes_of(path, &meta))
    }

    /// Apply attribute bits.
    ///
    /// `READONLY` toggles the write permission bits; `DIRECTORY` is derived
    /// and ignored; the rest go to an extended attribute when the filesystem
    /// supports one.
    pub fn set_attributes(&self, path: &Path, attributes: FileAttributes) -> FsResult<()> {
        let meta = fs::metadata(path).map_err(|e| FsError::from_io(e, path))?;
        let mode = meta.permissions().mode();
        let new_mode = if attributes.contains(FileAttributes::READONLY) {
            mode & !0o222
        } else if meta.permissions().readonly() {
            mode | 0o200
        } else {
            mode
        };
        if new_mode != mode {
            fs::set_permissions(path, fs::Permissions::from_mode(new_mode))
                .map_err(|e| FsError::from_io(e, path))?;
        }

        let stored = attributes - FileAttributes::DERIVED - FileAttributes::NORMAL;
        store_attributes(path, stored).map_err(|e| FsError::from_io(e, path))
    }

    /// Owner, group and permission bits selected by `sections`.
    pub fn security(&self, path: &Path, sections: AccessControlSections) -> FsResult<FileSecurity> {
        let meta = fs::metadata(path).map_err(|e| FsError::from_io(e, path))?;
        let pick = |section, value| sections.contains(section).then_some(value);
        Ok(FileSecurity {
            owner: pick(AccessControlSections::OWNER, meta.uid()),
            group: pick(AccessControlSections::GROUP, meta.gid()),
            mode: pick(AccessControlSections::ACCESS, meta.mode() & 0o7777),
        })
    }

    pub fn set_security(
        &self,
        path: &Path,
        sections: AccessControlSections,
        security: &FileSecurity,
    ) -> FsResult<()> {
        let owner = security.owner.filter(|_| sections.contains(AccessControlSections::OWNER));
        let group = security.group.filter(|_| sections.contains(AccessControlSections::GROUP));
        if owner.is_some() || group.is_some() {
            std::os::unix::fs::chown(path, owner, group).map_err(|e| FsError::from_io(e, path))?;
        }
        if let Some(mode) = security.mode.filter(|_| sections.contains(AccessControlSections::ACCESS)) {
            fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
                .map_err(|e| FsError::from_io(e, path))?;
        }
        Ok(())
    }

    /// Set times by path, for contexts without an owned handle.
    pub fn set_times_at_path(&self, path: &Path, times: &FileTimestamps) -> FsResult<()> {
        let file = File::open(path).map_err(|e| FsError::from_io(e, path))?;
        set_file_times(&file, times).map_err(|e| FsError::from_io(e, path))
    }

    pub fn create_dir(&self, path: &Path) -> FsResult<()> {
        fs::create_dir(path).map_err(|e| self.open_error(e, path))
    }

    pub fn remove_file(&self, path: &Path) -> FsResult<()> {
        fs::remove_file(path).map_err(|e| FsError::from_io(e, path))
    }

    pub fn remove_dir(&self, path: &Path) -> FsResult<()> {
        fs::remove_dir(path).map_err(|e| FsError::from_io(e, path))
    }

    pub fn rename(&self, from: &Path, to: &Path) -> FsResult<()> {
        fs::rename(from, to).map_err(|e| FsError::from_io(e, from))
    }

    /// Free and total space of the volume holding the root.
    pub fn disk_space(&self) -> FsResult<DiskSpace> {
        let stat = rustix::fs::statvfs(&self.root).map_err(|e| FsError::from_io(e.into(), &self.root))?;
        let unit = stat.f_frsize.max(1);
        Ok(DiskSpace {
            free_bytes_available: stat.f_bavail.saturating_mul(unit),
            total_bytes: stat.f_blocks.saturating_mul(unit),
            total_free_bytes: stat.f_bfree.saturating_mul(unit),
        })
    }

    /// Longest file name component the volume accepts.
    pub fn max_component_length(&self) -> FsResult<u32> {
        let stat = rustix::fs::statvfs(&self.root).map_err(|e| FsError::from_io(e.into(), &self.root))?;
        Ok(u32::try_from(stat.f_namemax).unwrap_or(u32::MAX))
    }
}

fn read_once(path: &Path, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    file.read(buf)
}

fn write_once(path: &Path, offset: u64, data: &[u8]) -> io::Result<usize> {
    let mut file = OpenOptions::new().write(true).open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    file.write(data)
}

/// Apply access and write times through an open file.
///
/// Creation time cannot be set on this platform and is skipped.
pub fn set_file_times(file: &File, times: &FileTimestamps) -> io::Result<()> {
    if times.creation.is_some() {
        tracing::debug!("creation time is not settable here, ignoring");
    }
    let mut native = FileTimes::new();
    if let Some(accessed) = times.last_access {
        native = native.set_accessed(accessed);
    }
    if let Some(modified) = times.last_write {
        native = native.set_modified(modified);
    }
    file.set_times(native)
}

fn stored_attributes(path: &Path) -> FileAttributes {
    let mut buf = [0u8; 4];
    match rustix::fs::getxattr(path, ATTRIBUTE_XATTR, &mut buf) {
        Ok(4) => FileAttributes::from_bits_truncate(u32::from_le_bytes(buf)),
        _ => FileAttributes::empty(),
    }
}

fn store_attributes(path: &Path, attributes: FileAttributes) -> io::Result<()> {
    use rustix::io::Errno;

    let result = if attributes.is_empty() {
        rustix::fs::removexattr(path, ATTRIBUTE_XATTR)
    } else {
        rustix::fs::setxattr(
            path,
            ATTRIBUTE_XATTR,
            &attributes.bits().to_le_bytes(),
            rustix::fs::XattrFlags::empty(),
        )
    };
    match result {
        Ok(()) => Ok(()),
        Err(e) if e == Errno::NOTSUP || e == Errno::NODATA => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// True when the filesystem under `dir` keeps `user.` extended attributes.
pub fn supports_xattrs(dir: &Path) -> bool {
    rustix::fs::setxattr(dir, "user.mirrorfs.probe", b"1", rustix::fs::XattrFlags::empty())
        .and_then(|()| rustix::fs::removexattr(dir, "user.mirrorfs.probe"))
        .is_ok()
}
