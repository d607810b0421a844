//! Open/create and the terminal verbs.

use std::path::Path;
use std::sync::Arc;

use super::{MirrorGateway, instrument, settle};
use crate::context::RequestContext;
use crate::error::{FsError, FsResult};
use crate::flags::{FileAccess, FileAttributes, FileMode, FileShare};
use crate::record::Operation;
use crate::status::NtStatus;
use crate::types::{HostFileInfo, OpenIntent};

impl MirrorGateway {
    /// Open or create `file_name`.
    ///
    /// Always materializes a context and publishes its creation, even when
    /// the open fails. On success the context id is stored in `info` and the
    /// context joins the table; on failure the context is closed on the spot,
    /// since the host will never clean it up.
    pub fn create_file(
        &self,
        file_name: &str,
        access: FileAccess,
        share: FileShare,
        mode: FileMode,
        attributes: FileAttributes,
        info: &mut HostFileInfo,
    ) -> FsResult<NtStatus> {
        let intent = OpenIntent {
            access,
            share,
            mode,
            attributes,
        };
        let ctx = self.new_context(info, file_name, intent);
        let path = self.fs.resolve(file_name);
        self.contexts.insert(Arc::clone(&ctx));
        info.context = Some(ctx.id());

        let result = instrument(&ctx, Operation::CreateFile, || {
            if self.audit.denies(file_name) {
                return Ok(NtStatus::AccessDenied);
            }
            if info.is_directory {
                self.open_directory(&ctx, &path)
            } else {
                self.open_file(&ctx, &path, info)
            }
        });

        let opened = matches!(&result, Ok(status) if status.is_success());
        ctx.set_file_existed(!matches!(&result, Ok(NtStatus::FileNotFound)));
        if !opened {
            ctx.release();
            ctx.mark_closed();
            self.contexts.remove(&ctx.id());
            info.context = None;
        }
        result
    }

    fn open_directory(&self, ctx: &RequestContext, path: &Path) -> FsResult<NtStatus> {
        match ctx.intent().mode {
            FileMode::Open => {
                let probe = self.fs.probe(path);
                if !probe.exists {
                    return Ok(NtStatus::FileNotFound);
                }
                if !probe.is_dir {
                    return Ok(NtStatus::NotADirectory);
                }
                // A directory we cannot list is one we cannot open
                match self.fs.is_dir_empty(path) {
                    Ok(_) => Ok(NtStatus::Success),
                    Err(err) => settle(err),
                }
            }
            FileMode::CreateNew => {
                // A file or a directory in the way both collide
                if self.fs.probe(path).exists {
                    return Ok(NtStatus::FileExists);
                }
                match self.fs.create_dir(path) {
                    Ok(()) => Ok(NtStatus::Success),
                    Err(err) => settle(err),
                }
            }
            _ => Ok(NtStatus::Success),
        }
    }

    fn open_file(&self, ctx: &RequestContext, path: &Path, info: &mut HostFileInfo) -> FsResult<NtStatus> {
        let intent = *ctx.intent();
        let probe = self.fs.probe(path);
        let metadata_only = !intent.access.needs_data();

        match intent.mode {
            FileMode::Open => {
                if !probe.exists {
                    return Ok(NtStatus::FileNotFound);
                }
                if metadata_only || probe.is_dir {
                    if probe.is_dir && intent.access.is_directory_delete() {
                        return Ok(NtStatus::AccessDenied);
                    }
                    info.is_directory = probe.is_dir;
                    return Ok(NtStatus::Success);
                }
            }
            FileMode::CreateNew if probe.exists => return Ok(NtStatus::FileExists),
            FileMode::Truncate if !probe.exists => return Ok(NtStatus::FileNotFound),
            _ => {}
        }

        if !intent.access.opens_stream() {
            return Ok(NtStatus::Success);
        }

        let handle = match self.fs.open(path, &intent) {
            Ok(handle) => handle,
            Err(err) => return settle(err),
        };

        let mut status = NtStatus::Success;
        if probe.exists && matches!(intent.mode, FileMode::OpenOrCreate | FileMode::Create) {
            status = NtStatus::AlreadyExists;
        }

        let mut attributes = intent.attributes;
        if matches!(intent.mode, FileMode::CreateNew | FileMode::Create) {
            attributes |= FileAttributes::ARCHIVE;
        }
        if !attributes.is_empty() {
            match self.fs.set_attributes(path, attributes) {
                Ok(()) => {}
                Err(FsError::AccessDenied(_)) => {
                    drop(handle);
                    return Ok(NtStatus::AccessDenied);
                }
                Err(err) => return settle(err),
            }
        }

        ctx.attach(handle);
        Ok(status)
    }

    /// First terminal verb: release the handle and apply delete-on-close.
    ///
    /// The context stays open until `close_file`.
    pub fn cleanup(&self, file_name: &str, info: &HostFileInfo) -> FsResult<NtStatus> {
        let path = self.fs.resolve(file_name);
        self.run(info, file_name, Operation::Cleanup, |ctx| {
            ctx.release();
            if info.delete_on_close {
                let removed = if info.is_directory {
                    self.fs.remove_dir(&path)
                } else {
                    self.fs.remove_file(&path)
                };
                if let Err(err) = removed {
                    return settle(err);
                }
            }
            Ok(NtStatus::Success)
        })
    }

    /// Final terminal verb. Tolerates a missing or repeated cleanup.
    pub fn close_file(&self, file_name: &str, info: &HostFileInfo) -> FsResult<NtStatus> {
        let ctx = info.context.and_then(|id| self.contexts.get(&id));
        let result = self.run(info, file_name, Operation::CloseFile, |ctx| {
            ctx.release();
            Ok(NtStatus::Success)
        });
        if let Some(ctx) = ctx {
            ctx.mark_closed();
            self.contexts.remove(&ctx.id());
            tracing::debug!(context = %ctx.id(), path = ctx.path(), has_errors = ctx.has_errors(), "context closed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MirrorConfig;
    use tempfile::TempDir;

    fn setup() -> (MirrorGateway, TempDir) {
        let dir = TempDir::new().unwrap();
        let gw = MirrorGateway::new(&MirrorConfig::with_root(dir.path())).unwrap();
        (gw, dir)
    }

    const RW: FileAccess = FileAccess::GENERIC_READ.union(FileAccess::GENERIC_WRITE);
    const SHARE: FileShare = FileShare::READ.union(FileShare::WRITE);

    fn open(gw: &MirrorGateway, name: &str, access: FileAccess, mode: FileMode) -> (FsResult<NtStatus>, HostFileInfo) {
        let mut info = HostFileInfo::new(1);
        let status = gw.create_file(name, access, SHARE, mode, FileAttributes::empty(), &mut info);
        (status, info)
    }

    #[test]
    fn test_open_missing_file() {
        let (gw, _dir) = setup();
        let (status, info) = open(&gw, "\\nope.txt", RW, FileMode::Open);
        assert_eq!(status.unwrap(), NtStatus::FileNotFound);
        assert!(info.context.is_none());
        assert!(gw.contexts().is_empty());
    }

    #[test]
    fn test_failed_open_is_still_audited() {
        let (gw, _dir) = setup();
        let mut sub = gw.subscribe("context.*.created");
        let mut closed = gw.subscribe("context.*.closed");
        let _ = open(&gw, "\\nope.txt", RW, FileMode::Open);
        assert_eq!(sub.drain().len(), 1);
        assert_eq!(closed.drain().len(), 1);
    }

    #[test]
    fn test_create_new_twice() {
        let (gw, _dir) = setup();
        let (status, info) = open(&gw, "\\a.txt", RW, FileMode::CreateNew);
        assert_eq!(status.unwrap(), NtStatus::Success);
        let first = gw.context(&info.context.unwrap()).unwrap();
        assert!(first.has_handle());
        gw.cleanup("\\a.txt", &info).unwrap();
        gw.close_file("\\a.txt", &info).unwrap();
        assert!(!first.has_handle());

        let (status, info) = open(&gw, "\\a.txt", RW, FileMode::CreateNew);
        assert_eq!(status.unwrap(), NtStatus::FileExists);
        assert!(info.context.is_none());
    }

    #[test]
    fn test_open_or_create_existing_reports_already_exists() {
        let (gw, dir) = setup();
        std::fs::write(dir.path().join("e.txt"), b"x").unwrap();
        let (status, info) = open(&gw, "\\e.txt", RW, FileMode::OpenOrCreate);
        assert_eq!(status.unwrap(), NtStatus::AlreadyExists);
        assert!(gw.context(&info.context.unwrap()).unwrap().has_handle());
    }

    #[test]
    fn test_metadata_open_has_no_handle() {
        let (gw, dir) = setup();
        std::fs::write(dir.path().join("m.txt"), b"x").unwrap();
        let (status, info) = open(&gw, "\\m.txt", FileAccess::READ_ATTRIBUTES, FileMode::Open);
        assert_eq!(status.unwrap(), NtStatus::Success);
        let ctx = gw.context(&info.context.unwrap()).unwrap();
        assert!(!ctx.has_handle());
        assert!(ctx.file_existed());
    }

    #[test]
    fn test_directory_delete_request_on_directory_is_denied() {
        let (gw, dir) = setup();
        std::fs::create_dir(dir.path().join("d")).unwrap();
        let (status, _) = open(&gw, "\\d", FileAccess::DELETE, FileMode::Open);
        assert_eq!(status.unwrap(), NtStatus::AccessDenied);

        let (status, info) = open(&gw, "\\d", FileAccess::DELETE | FileAccess::SYNCHRONIZE, FileMode::Open);
        assert_eq!(status.unwrap(), NtStatus::Success);
        assert!(info.is_directory);
    }

    #[test]
    fn test_truncate_missing() {
        let (gw, _dir) = setup();
        let (status, _) = open(&gw, "\\t.txt", RW, FileMode::Truncate);
        assert_eq!(status.unwrap(), NtStatus::FileNotFound);
    }

    #[test]
    fn test_missing_parent_is_path_not_found() {
        let (gw, _dir) = setup();
        let (status, _) = open(&gw, "\\no\\such.txt", RW, FileMode::CreateNew);
        assert_eq!(status.unwrap(), NtStatus::PathNotFound);
    }

    #[test]
    fn test_sharing_violation() {
        let (gw, _dir) = setup();
        let mut first = HostFileInfo::new(1);
        let status = gw
            .create_file("\\x", RW, FileShare::empty(), FileMode::CreateNew, FileAttributes::empty(), &mut first)
            .unwrap();
        assert_eq!(status, NtStatus::Success);
        let (status, _) = open(&gw, "\\x", FileAccess::GENERIC_READ, FileMode::Open);
        assert_eq!(status.unwrap(), NtStatus::SharingViolation);
    }

    #[test]
    fn test_directory_modes() {
        let (gw, dir) = setup();
        let mut info = HostFileInfo {
            is_directory: true,
            ..HostFileInfo::new(1)
        };
        let status = gw
            .create_file("\\sub", FileAccess::empty(), SHARE, FileMode::CreateNew, FileAttributes::empty(), &mut info)
            .unwrap();
        assert_eq!(status, NtStatus::Success);
        assert!(dir.path().join("sub").is_dir());

        let mut again = HostFileInfo {
            is_directory: true,
            ..HostFileInfo::new(1)
        };
        let status = gw
            .create_file("\\sub", FileAccess::empty(), SHARE, FileMode::CreateNew, FileAttributes::empty(), &mut again)
            .unwrap();
        assert_eq!(status, NtStatus::FileExists);

        std::fs::write(dir.path().join("plain"), b"x").unwrap();
        let mut as_dir = HostFileInfo {
            is_directory: true,
            ..HostFileInfo::new(1)
        };
        let status = gw
            .create_file("\\plain", FileAccess::empty(), SHARE, FileMode::Open, FileAttributes::empty(), &mut as_dir)
            .unwrap();
        assert_eq!(status, NtStatus::NotADirectory);
    }

    #[test]
    fn test_directory_create_new_over_file_fails() {
        let (gw, dir) = setup();
        std::fs::write(dir.path().join("taken"), b"x").unwrap();
        let mut info = HostFileInfo {
            is_directory: true,
            ..HostFileInfo::new(1)
        };
        let status = gw
            .create_file("\\taken", FileAccess::empty(), SHARE, FileMode::CreateNew, FileAttributes::empty(), &mut info)
            .unwrap();
        assert_eq!(status, NtStatus::FileExists);
        assert!(info.context.is_none());
        assert!(gw.contexts().is_empty());
        assert!(dir.path().join("taken").is_file());
    }

    #[test]
    fn test_denied_extension() {
        let dir = TempDir::new().unwrap();
        let mut config = MirrorConfig::with_root(dir.path());
        config.audit.denied_extensions = vec!["slog".into()];
        let gw = MirrorGateway::new(&config).unwrap();
        let mut sub = gw.subscribe("context.*.created");
        let (status, _) = open(&gw, "\\trace.SLOG", RW, FileMode::CreateNew);
        assert_eq!(status.unwrap(), NtStatus::AccessDenied);
        assert_eq!(sub.drain().len(), 1);
        assert!(!dir.path().join("trace.SLOG").exists());
    }

    #[test]
    fn test_cleanup_then_close_is_idempotent() {
        let (gw, _dir) = setup();
        let (_, info) = open(&gw, "\\c.txt", RW, FileMode::CreateNew);
        let mut closed = gw.subscribe("context.*.closed");
        assert_eq!(gw.cleanup("\\c.txt", &info).unwrap(), NtStatus::Success);
        assert_eq!(gw.close_file("\\c.txt", &info).unwrap(), NtStatus::Success);
        // A stray second close finds no context and is audited detached
        assert_eq!(gw.close_file("\\c.txt", &info).unwrap(), NtStatus::Success);

        let id = info.context.unwrap();
        let closes: Vec<_> = closed
            .drain()
            .into_iter()
            .filter(|m| m.payload.context_id() == id)
            .collect();
        assert_eq!(closes.len(), 1);
    }

    #[test]
    fn test_delete_on_close() {
        let (gw, dir) = setup();
        let (_, mut info) = open(&gw, "\\gone.txt", RW, FileMode::CreateNew);
        info.delete_on_close = true;
        gw.cleanup("\\gone.txt", &info).unwrap();
        assert!(!dir.path().join("gone.txt").exists());
    }
}
