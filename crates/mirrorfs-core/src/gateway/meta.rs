//! Metadata verbs: information, listings, attributes, times and security.

use super::{MirrorGateway, settle, settle_reply};
use crate::error::{FsError, FsResult};
use crate::flags::{AccessControlSections, FileAttributes};
use crate::local::set_file_times;
use crate::pattern::is_name_in_expression;
use crate::record::Operation;
use crate::status::{NtStatus, Reply};
use crate::types::{FileInformation, FileSecurity, FileTimestamps, HostFileInfo};

impl MirrorGateway {
    pub fn get_file_information(&self, file_name: &str, info: &HostFileInfo) -> FsResult<Reply<FileInformation>> {
        let path = self.fs.resolve(file_name);
        self.run(info, file_name, Operation::GetFileInformation, |_| {
            match self.fs.file_information(&path, file_name) {
                Ok(found) => Ok(Reply::ok(found)),
                Err(err) => settle_reply(err),
            }
        })
    }

    /// List a directory's immediate children.
    pub fn find_files(&self, file_name: &str, info: &HostFileInfo) -> FsResult<Reply<Vec<FileInformation>>> {
        let path = self.fs.resolve(file_name);
        self.run(info, file_name, Operation::FindFiles, |_| {
            self.list_matching(&path, "*")
        })
    }

    /// List a directory's children whose names match `pattern`.
    pub fn find_files_with_pattern(
        &self,
        file_name: &str,
        pattern: &str,
        info: &HostFileInfo,
    ) -> FsResult<Reply<Vec<FileInformation>>> {
        let path = self.fs.resolve(file_name);
        self.run(info, file_name, Operation::FindFilesWithPattern, |_| {
            self.list_matching(&path, pattern)
        })
    }

    /// Alternate data streams are not mirrored; the host falls back to
    /// the plain listing.
    pub fn find_streams(&self, file_name: &str, info: &HostFileInfo) -> FsResult<Reply<Vec<FileInformation>>> {
        self.run(info, file_name, Operation::FindStreams, |_| {
            Ok(Reply::empty(NtStatus::NotImplemented))
        })
    }

    fn list_matching(&self, dir: &std::path::Path, pattern: &str) -> FsResult<Reply<Vec<FileInformation>>> {
        match self.fs.list(dir) {
            Ok(entries) => Ok(Reply::ok(
                entries
                    .into_iter()
                    .filter(|entry| is_name_in_expression(pattern, &entry.file_name))
                    .collect(),
            )),
            Err(err) => settle_reply(err),
        }
    }

    pub fn set_file_attributes(
        &self,
        file_name: &str,
        attributes: FileAttributes,
        info: &HostFileInfo,
    ) -> FsResult<NtStatus> {
        let path = self.fs.resolve(file_name);
        self.run(info, file_name, Operation::SetFileAttributes, |_| {
            match self.fs.set_attributes(&path, attributes) {
                Ok(()) => Ok(NtStatus::Success),
                Err(err) => settle(err),
            }
        })
    }

    /// Set any subset of the three timestamps.
    ///
    /// Goes through the owned handle when there is one, otherwise opens the
    /// path for this call.
    pub fn set_file_time(&self, file_name: &str, times: FileTimestamps, info: &HostFileInfo) -> FsResult<NtStatus> {
        let path = self.fs.resolve(file_name);
        self.run(info, file_name, Operation::SetFileTime, |ctx| {
            if times.is_empty() {
                return Ok(NtStatus::Success);
            }
            let result = ctx
                .with_handle(|handle| set_file_times(handle.file(), &times).map_err(|e| FsError::from_io(e, &path)))
                .unwrap_or_else(|| self.fs.set_times_at_path(&path, &times));
            match result {
                Ok(()) => Ok(NtStatus::Success),
                Err(err) => settle(err),
            }
        })
    }

    pub fn get_file_security(
        &self,
        file_name: &str,
        sections: AccessControlSections,
        info: &HostFileInfo,
    ) -> FsResult<Reply<FileSecurity>> {
        let path = self.fs.resolve(file_name);
        self.run(info, file_name, Operation::GetFileSecurity, |_| {
            match self.fs.security(&path, sections) {
                Ok(security) => Ok(Reply::ok(security)),
                Err(err) => settle_reply(err),
            }
        })
    }

    pub fn set_file_security(
        &self,
        file_name: &str,
        security: &FileSecurity,
        sections: AccessControlSections,
        info: &HostFileInfo,
    ) -> FsResult<NtStatus> {
        let path = self.fs.resolve(file_name);
        self.run(info, file_name, Operation::SetFileSecurity, |_| {
            match self.fs.set_security(&path, sections, security) {
                Ok(()) => Ok(NtStatus::Success),
                Err(err) => settle(err),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MirrorConfig;
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::TempDir;

    fn setup() -> (MirrorGateway, TempDir) {
        let dir = TempDir::new().unwrap();
        let gw = MirrorGateway::new(&MirrorConfig::with_root(dir.path())).unwrap();
        (gw, dir)
    }

    #[test]
    fn test_file_information() {
        let (gw, dir) = setup();
        std::fs::write(dir.path().join("i.txt"), b"12345").unwrap();
        let reply = gw.get_file_information("\\i.txt", &HostFileInfo::new(1)).unwrap();
        assert_eq!(reply.status, NtStatus::Success);
        assert_eq!(reply.data.file_name, "\\i.txt");
        assert_eq!(reply.data.length, 5);
        assert!(!reply.data.attributes.contains(FileAttributes::DIRECTORY));

        let reply = gw.get_file_information("\\nope", &HostFileInfo::new(1)).unwrap();
        assert_eq!(reply.status, NtStatus::FileNotFound);
    }

    #[test]
    fn test_find_files_with_pattern() {
        let (gw, dir) = setup();
        for name in ["a.txt", "b.TXT", "c.md"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let all = gw.find_files("\\", &HostFileInfo::new(1)).unwrap();
        assert_eq!(all.data.len(), 4);

        let txt = gw
            .find_files_with_pattern("\\", "*.txt", &HostFileInfo::new(1))
            .unwrap();
        let mut names: Vec<_> = txt.data.into_iter().map(|f| f.file_name).collect();
        names.sort();
        assert_eq!(names, vec!["a.txt", "b.TXT"]);
    }

    #[test]
    fn test_find_missing_directory() {
        let (gw, _dir) = setup();
        let reply = gw.find_files("\\gone", &HostFileInfo::new(1)).unwrap();
        assert_eq!(reply.status, NtStatus::FileNotFound);
        assert!(reply.data.is_empty());
    }

    #[test]
    fn test_find_streams_not_implemented() {
        let (gw, _dir) = setup();
        let reply = gw.find_streams("\\", &HostFileInfo::new(1)).unwrap();
        assert_eq!(reply.status, NtStatus::NotImplemented);
        assert!(reply.data.is_empty());
    }

    #[test]
    fn test_set_attributes_missing_file() {
        let (gw, _dir) = setup();
        let status = gw
            .set_file_attributes("\\nope", FileAttributes::HIDDEN, &HostFileInfo::new(1))
            .unwrap();
        assert_eq!(status, NtStatus::FileNotFound);
    }

    #[test]
    fn test_set_file_time_by_path() {
        let (gw, dir) = setup();
        let path = dir.path().join("t.txt");
        std::fs::write(&path, b"x").unwrap();
        let when = UNIX_EPOCH + Duration::from_secs(1_234_567_890);
        let times = FileTimestamps {
            creation: Some(when),
            last_access: None,
            last_write: Some(when),
        };
        let status = gw.set_file_time("\\t.txt", times, &HostFileInfo::new(1)).unwrap();
        assert_eq!(status, NtStatus::Success);
        assert_eq!(std::fs::metadata(&path).unwrap().modified().unwrap(), when);
    }

    #[test]
    fn test_security_round_trip() {
        let (gw, dir) = setup();
        std::fs::write(dir.path().join("s"), b"x").unwrap();
        let host = HostFileInfo::new(1);
        let wanted = FileSecurity {
            mode: Some(0o600),
            ..Default::default()
        };
        let status = gw
            .set_file_security("\\s", &wanted, AccessControlSections::ACCESS, &host)
            .unwrap();
        assert_eq!(status, NtStatus::Success);
        let reply = gw
            .get_file_security("\\s", AccessControlSections::ACCESS, &host)
            .unwrap();
        assert_eq!(reply.data.mode, Some(0o600));
    }
}
