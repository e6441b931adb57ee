//! [`PurgeItemList`]: a [`FilesystemList`] of paths to remove once they are
//! old enough, used by the purge action to clean up staging/collect/store
//! working directories.

use std::ops::{Deref, DerefMut};
use std::path::Path;

use crate::error::Result;
use crate::path::file_age_days;

use super::filesystem_list::FilesystemList;

/// A [`FilesystemList`] of candidate paths for deletion.
#[derive(Debug, Default, Clone)]
pub struct PurgeItemList(FilesystemList);

impl PurgeItemList {
    /// Creates an empty list with no configured exclusions.
    pub fn new() -> Self {
        PurgeItemList(FilesystemList::new())
    }

    /// Recursively adds the contents of a directory, always as if
    /// `add_self=false`: a purge target's own root directory should never
    /// be removed, only what's inside it.
    ///
    /// Shadows [`FilesystemList::add_dir_contents`] (Rust prefers this
    /// inherent method over the deref'd one).
    pub fn add_dir_contents(
        &mut self,
        path: &Path,
        recursive: bool,
        link_depth: u32,
        dereference: bool,
    ) -> Result<usize> {
        self.0
            .add_dir_contents(path, recursive, false, link_depth, dereference)
    }

    /// Removes every entry younger than `days_old` days. Directories and
    /// symlinks are never removed by this call regardless of age: only
    /// regular files are subject to the age filter here (directories empty
    /// out naturally once their contents are purged, and are handled by
    /// [`PurgeItemList::purge_items`]).
    pub fn remove_young_files(&mut self, days_old: i64) -> Result<usize> {
        let mut removed = 0;
        let mut keep = Vec::new();

        for entry in self.0.entries().to_vec() {
            if entry.is_file() && !is_symlink(&entry) {
                match file_age_days(&entry) {
                    Ok(age) if age < days_old => {
                        removed += 1;
                        log::debug!(
                            "Path [{}] is not old enough to be purged ({age} days).",
                            entry.display()
                        );
                        continue;
                    }
                    Ok(_) => {}
                    Err(_) => {
                        // Entry vanished underneath us; drop it like any
                        // other invalid entry rather than erroring here.
                        removed += 1;
                        continue;
                    }
                }
            }
            keep.push(entry);
        }

        self.0.set_entries(keep);
        Ok(removed)
    }

    /// Deletes every entry from disk: files and symlinks first, then empty
    /// directories (deepest first), so a directory that only contained
    /// purged files ends up empty by the time its own removal is
    /// attempted.
    ///
    /// Per-entry failures are logged and swallowed rather than aborting
    /// the whole purge; a directory that still has children left over
    /// (e.g. one the caller chose not to include in this list) is quietly
    /// skipped rather than treated as an error.
    pub fn purge_items(&self) -> (usize, usize) {
        let mut files_removed = 0;
        let mut dirs_removed = 0;
        let mut dirs = Vec::new();

        for entry in self.0.entries() {
            if entry.is_dir() && !is_symlink(entry) {
                dirs.push(entry.clone());
                continue;
            }
            match std::fs::remove_file(entry).or_else(|_| remove_symlink(entry)) {
                Ok(()) => {
                    files_removed += 1;
                    log::debug!("Purged file [{}].", entry.display());
                }
                Err(e) => {
                    log::error!("Error purging file [{}]: {e}", entry.display());
                }
            }
        }

        // Deepest paths first, so nested empty directories clear out
        // before their parents are attempted.
        dirs.sort_by_key(|p| std::cmp::Reverse(p.components().count()));

        for dir in dirs {
            match std::fs::remove_dir(&dir) {
                Ok(()) => {
                    dirs_removed += 1;
                    log::debug!("Purged empty directory [{}].", dir.display());
                }
                Err(e) => {
                    log::debug!("Directory [{}] not purged: {e}", dir.display());
                }
            }
        }

        (files_removed, dirs_removed)
    }
}

fn is_symlink(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

fn remove_symlink(path: &Path) -> std::io::Result<()> {
    if is_symlink(path) {
        std::fs::remove_file(path)
    } else {
        std::fs::remove_dir(path)
    }
}

impl Deref for PurgeItemList {
    type Target = FilesystemList;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for PurgeItemList {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}
