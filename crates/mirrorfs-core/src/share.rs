//! Share-mode arbitration.
//!
//! POSIX has no share modes, so opens are arbitrated here instead. Each live
//! data open registers what it does (read, write, delete) and what it lets
//! others do. A new open conflicts when it wants something an existing open
//! did not share, or refuses to share something an existing open is doing.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;

use crate::flags::{FileAccess, FileShare};

/// What one open does and allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShareClaim {
    pub read: bool,
    pub write: bool,
    pub delete: bool,
    pub share: FileShare,
}

impl ShareClaim {
    pub fn new(access: FileAccess, share: FileShare) -> Self {
        let all = access.contains(FileAccess::GENERIC_ALL);
        Self {
            read: access.wants_read(),
            write: all
                || access.intersects(
                    FileAccess::WRITE_DATA | FileAccess::APPEND_DATA | FileAccess::GENERIC_WRITE,
                ),
            delete: all || access.contains(FileAccess::DELETE),
            share,
        }
    }

    /// Opens that neither read, write nor delete never take part.
    pub fn is_neutral(&self) -> bool {
        !(self.read || self.write || self.delete)
    }
}

/// Aggregate of the live claims on one path.
#[derive(Debug, Default, Clone, Copy)]
struct ShareState {
    opens: u32,
    readers: u32,
    writers: u32,
    deleters: u32,
    shared_read: u32,
    shared_write: u32,
    shared_delete: u32,
}

impl ShareState {
    fn conflicts(&self, claim: &ShareClaim) -> bool {
        (claim.read && self.shared_read < self.opens)
            || (claim.write && self.shared_write < self.opens)
            || (claim.delete && self.shared_delete < self.opens)
            || (self.readers > 0 && !claim.share.contains(FileShare::READ))
            || (self.writers > 0 && !claim.share.contains(FileShare::WRITE))
            || (self.deleters > 0 && !claim.share.contains(FileShare::DELETE))
    }

    fn apply(&mut self, claim: &ShareClaim, add: bool) {
        let step = |count: &mut u32, on: bool| {
            if on {
                *count = if add { *count + 1 } else { count.saturating_sub(1) };
            }
        };
        step(&mut self.opens, true);
        step(&mut self.readers, claim.read);
        step(&mut self.writers, claim.write);
        step(&mut self.deleters, claim.delete);
        step(&mut self.shared_read, claim.share.contains(FileShare::READ));
        step(&mut self.shared_write, claim.share.contains(FileShare::WRITE));
        step(&mut self.shared_delete, claim.share.contains(FileShare::DELETE));
    }
}

/// Live share registrations keyed by real path.
#[derive(Debug, Clone, Default)]
pub struct ShareTable {
    entries: Arc<DashMap<PathBuf, ShareState>>,
}

impl ShareTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a claim, or return `None` on a sharing conflict.
    ///
    /// The registration lasts as long as the returned guard.
    pub fn acquire(&self, path: &Path, claim: ShareClaim) -> Option<ShareGuard> {
        if !claim.is_neutral() {
            let mut state = self.entries.entry(path.to_path_buf()).or_default();
            if state.conflicts(&claim) {
                return None;
            }
            state.apply(&claim, true);
        }
        Some(ShareGuard {
            table: self.clone(),
            path: path.to_path_buf(),
            claim,
        })
    }

    /// Number of live claims on `path`.
    pub fn open_count(&self, path: &Path) -> u32 {
        self.entries.get(path).map(|s| s.opens).unwrap_or(0)
    }

    fn release(&self, path: &Path, claim: &ShareClaim) {
        if claim.is_neutral() {
            return;
        }
        if let Some(mut state) = self.entries.get_mut(path) {
            state.apply(claim, false);
        }
        self.entries.remove_if(path, |_, state| state.opens == 0);
    }
}

/// Deregisters its claim on drop.
#[derive(Debug)]
pub struct ShareGuard {
    table: ShareTable,
    path: PathBuf,
    claim: ShareClaim,
}

impl ShareGuard {
    pub fn claim(&self) -> ShareClaim {
        self.claim
    }
}

impl Drop for ShareGuard {
    fn drop(&mut self) {
        self.table.release(&self.path, &self.claim);
    }
}
