//! Compensating-action ledger for local filesystem side effects.
//!
//! Every file or directory created during one bootstrap attempt is recorded
//! here. If the attempt fails, dropping the ledger removes the records in
//! reverse insertion order, giving all-or-nothing semantics for the local
//! side of the protocol without a filesystem transaction primitive. Removal
//! failures during unwind are advisory only: provisioning is already
//! failing, so they are logged and never propagated.

use log::warn;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    File,
    Directory,
    DirectoryRecursive,
}

#[derive(Debug, Default)]
pub struct RemovalLedger {
    entries: Vec<(PathBuf, EntryKind)>,
}

impl RemovalLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_file(&mut self, path: impl Into<PathBuf>) {
        self.entries.push((path.into(), EntryKind::File));
    }

    pub fn record_directory(&mut self, path: impl Into<PathBuf>, recursive: bool) {
        let kind = if recursive {
            EntryKind::DirectoryRecursive
        } else {
            EntryKind::Directory
        };
        self.entries.push((path.into(), kind));
    }

    /// Drop the record for a path that no longer needs undoing (for example
    /// a temporary file that has been renamed into place).
    pub fn forget(&mut self, path: &Path) {
        self.entries.retain(|(p, _)| p != path);
    }

    /// The attempt succeeded: discard all records without undoing anything.
    pub fn commit(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn unwind(&mut self) {
        // Reverse insertion order: files recorded inside a directory are
        // removed before the directory itself.
        for (path, kind) in self.entries.drain(..).rev() {
            let result = match kind {
                EntryKind::File => fs::remove_file(&path),
                EntryKind::Directory => fs::remove_dir(&path),
                EntryKind::DirectoryRecursive => fs::remove_dir_all(&path),
            };
            if let Err(e) = result {
                warn!("Could not remove {} during rollback: {}", path.display(), e);
            }
        }
    }
}

impl Drop for RemovalLedger {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            self.unwind();
        }
    }
}
