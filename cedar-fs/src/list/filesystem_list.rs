//! [`FilesystemList`]: recursive directory enumeration with include/exclude
//! policy. Base engine shared by [`crate::list::BackupFileList`] and
//! [`crate::list::PurgeItemList`].

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::{FsError, Result};

/// Exclusion policy applied by [`FilesystemList::add_file`]/
/// [`FilesystemList::add_dir`]/[`FilesystemList::add_dir_contents`].
#[derive(Debug, Default, Clone)]
pub struct ExcludePolicy {
    /// Exclude every symlink encountered by `add_file`/`add_dir`.
    pub exclude_links: bool,
    /// Exclude every plain file encountered by `add_file`.
    pub exclude_files: bool,
    /// Exclude every plain directory encountered by `add_dir`.
    pub exclude_dirs: bool,
    /// Exact-match exclude list, checked against the full path.
    pub exclude_paths: Vec<PathBuf>,
    /// Regex exclude list, anchored `^...$` against the full path.
    pub exclude_patterns: Vec<Regex>,
    /// Regex exclude list, anchored `^...$` against the basename only.
    pub exclude_basename_patterns: Vec<Regex>,
    /// If a directory contains a file with this name, the directory and
    /// its entire subtree are excluded from `add_dir_contents`.
    pub ignore_file: Option<String>,
}

/// Outcome of an exclusion check: `Some(reason)` if excluded.
fn exclusion_reason(
    policy: &ExcludePolicy,
    path: &Path,
    is_link: bool,
    check_files: bool,
    check_dirs: bool,
) -> Option<&'static str> {
    if policy.exclude_links && is_link {
        return Some("excludeLinks");
    }
    if check_files && policy.exclude_files {
        return Some("excludeFiles");
    }
    if check_dirs && policy.exclude_dirs {
        return Some("excludeDirs");
    }
    if policy.exclude_paths.iter().any(|p| p == path) {
        return Some("excludePaths");
    }
    let path_str = path.to_string_lossy();
    if policy
        .exclude_patterns
        .iter()
        .any(|re| re.is_match(&path_str))
    {
        return Some("excludePatterns");
    }
    if let Some(basename) = path.file_name().map(|n| n.to_string_lossy()) {
        if policy
            .exclude_basename_patterns
            .iter()
            .any(|re| re.is_match(&basename))
        {
            return Some("excludeBasenamePatterns");
        }
    }
    None
}

fn is_symlink(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

/// A list of filesystem paths with an include/exclude policy, supporting
/// recursive enumeration.
///
/// When `files_only` is set (used by [`crate::list::BackupFileList`]),
/// `add_dir` rejects real directories and accepts only symlinks to
/// directories, since a backup list must contain files.
#[derive(Debug, Default, Clone)]
pub struct FilesystemList {
    entries: Vec<PathBuf>,
    /// Exclusion policy in effect for subsequent `add_*` calls.
    pub exclude: ExcludePolicy,
    pub(crate) files_only: bool,
}

impl FilesystemList {
    /// Creates an empty list with no configured exclusions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current entries, in insertion order.
    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    /// Number of entries currently in the list.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn append(&mut self, path: PathBuf) {
        self.entries.push(path);
    }

    /// Adds a single regular file (or symlink to one) to the list.
    ///
    /// The path must exist and be a file. Returns `1` if added, `0` if
    /// filtered by the exclude policy.
    pub fn add_file(&mut self, path: &Path) -> Result<usize> {
        if !path.exists() || !path.is_file() {
            return Err(FsError::InvalidArgument(format!(
                "Path [{}] is not a file or does not exist on disk.",
                path.display()
            )));
        }

        let link = is_symlink(path);
        if let Some(reason) = exclusion_reason(&self.exclude, path, link, true, false) {
            log::debug!("Path [{}] is excluded based on {reason}.", path.display());
            return Ok(0);
        }

        self.append(path.to_path_buf());
        log::debug!("Added file to list: [{}]", path.display());
        Ok(1)
    }

    /// Adds a single directory (or symlink to one) to the list.
    ///
    /// `ignore_file` does NOT apply here, only to `add_dir_contents`. If
    /// `files_only` is set, real (non-symlink) directories are silently
    /// refused (returns `0`) rather than erroring, since only `addDir`'s
    /// caller chain needs to know "this isn't eligible", not "this
    /// failed".
    pub fn add_dir(&mut self, path: &Path) -> Result<usize> {
        if !path.exists() || !path.is_dir() {
            return Err(FsError::InvalidArgument(format!(
                "Path [{}] is not a directory or does not exist on disk.",
                path.display()
            )));
        }

        let link = is_symlink(path);
        if self.files_only && !link {
            return Ok(0);
        }

        if let Some(reason) = exclusion_reason(&self.exclude, path, link, false, true) {
            log::debug!("Path [{}] is excluded based on {reason}.", path.display());
            return Ok(0);
        }

        self.append(path.to_path_buf());
        log::debug!("Added directory to list: [{}]", path.display());
        Ok(1)
    }

    /// Recursively adds the contents of a directory.
    ///
    /// See spec §4.1 for the full contract: `ignore_file` excludes whole
    /// subtrees, `add_self` controls whether the root directory itself is
    /// added, symlinked children are followed only while `link_depth > 0`
    /// (decrementing per descent), and `dereference` additionally adds the
    /// resolved target path alongside a followed symlink. Broken symlinks
    /// are silently skipped.
    pub fn add_dir_contents(
        &mut self,
        path: &Path,
        recursive: bool,
        add_self: bool,
        link_depth: u32,
        dereference: bool,
    ) -> Result<usize> {
        self.add_dir_contents_internal(path, add_self, recursive, link_depth, dereference)
    }

    pub(crate) fn add_dir_contents_internal(
        &mut self,
        path: &Path,
        include_path: bool,
        recursive: bool,
        link_depth: u32,
        dereference: bool,
    ) -> Result<usize> {
        if !path.exists() || !path.is_dir() {
            return Err(FsError::InvalidArgument(format!(
                "Path [{}] is not a directory or does not exist on disk.",
                path.display()
            )));
        }

        let mut added = 0;

        let path_str = path.to_string_lossy();
        if self.exclude.exclude_paths.iter().any(|p| p.as_path() == path) {
            log::debug!("Path [{}] is excluded based on excludePaths.", path.display());
            return Ok(0);
        }
        if self
            .exclude
            .exclude_patterns
            .iter()
            .any(|re| re.is_match(&path_str))
        {
            log::debug!("Path [{}] is excluded based on pattern.", path.display());
            return Ok(0);
        }
        if let Some(basename) = path.file_name().map(|n| n.to_string_lossy()) {
            if self
                .exclude
                .exclude_basename_patterns
                .iter()
                .any(|re| re.is_match(&basename))
            {
                log::debug!("Path [{}] is excluded based on basename pattern.", path.display());
                return Ok(0);
            }
        }
        if let Some(ref ignore_file) = self.exclude.ignore_file {
            if path.join(ignore_file).exists() {
                log::debug!("Path [{}] is excluded based on ignore file.", path.display());
                return Ok(0);
            }
        }

        if include_path {
            added += self.add_dir(path)?;
        }

        let mut children: Vec<PathBuf> = std::fs::read_dir(path)
            .map_err(|e| FsError::io(path, e))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .collect();
        children.sort();

        for entry_path in children {
            if entry_path.is_file() {
                if link_depth > 0 && dereference && is_symlink(&entry_path) {
                    if let Ok(target) = std::fs::canonicalize(&entry_path) {
                        if target != entry_path {
                            added += self.add_file(&target)?;
                        }
                    }
                }
                added += self.add_file(&entry_path)?;
            } else if entry_path.is_dir() {
                if is_symlink(&entry_path) {
                    if recursive {
                        if link_depth > 0 {
                            let new_depth = link_depth - 1;
                            if dereference {
                                if let Ok(target) = std::fs::canonicalize(&entry_path) {
                                    if target != entry_path {
                                        added += self.add_dir_contents_internal(
                                            &target, true, recursive, new_depth, dereference,
                                        )?;
                                    }
                                }
                                added += self.add_dir(&entry_path)?;
                            } else {
                                added += self.add_dir_contents_internal(
                                    &entry_path,
                                    false,
                                    recursive,
                                    new_depth,
                                    dereference,
                                )?;
                            }
                        } else {
                            added += self.add_dir(&entry_path)?;
                        }
                    } else {
                        added += self.add_dir(&entry_path)?;
                    }
                } else if recursive {
                    added += self.add_dir_contents_internal(
                        &entry_path,
                        true,
                        recursive,
                        link_depth.saturating_sub(1),
                        dereference,
                    )?;
                } else {
                    added += self.add_dir(&entry_path)?;
                }
            }
            // broken symlinks (neither is_file nor is_dir returns true) are
            // silently skipped, matching the spec.
        }

        Ok(added)
    }

    /// Removes file entries (`path.is_file()` true, following symlinks)
    /// matching `pattern`, or all file entries if `pattern` is `None`.
    pub fn remove_files(&mut self, pattern: Option<&str>) -> Result<usize> {
        self.remove_by_predicate(pattern, |p| p.exists() && p.is_file())
    }

    /// Removes directory entries (`path.is_dir()` true, following
    /// symlinks) matching `pattern`, or all directory entries if `pattern`
    /// is `None`.
    pub fn remove_dirs(&mut self, pattern: Option<&str>) -> Result<usize> {
        self.remove_by_predicate(pattern, |p| p.exists() && p.is_dir())
    }

    /// Removes symlink entries matching `pattern`, or all symlink entries
    /// if `pattern` is `None`.
    pub fn remove_links(&mut self, pattern: Option<&str>) -> Result<usize> {
        self.remove_by_predicate(pattern, |p| p.exists() && is_symlink(p))
    }

    fn remove_by_predicate(
        &mut self,
        pattern: Option<&str>,
        predicate: impl Fn(&Path) -> bool,
    ) -> Result<usize> {
        let compiled = pattern.map(Regex::new).transpose().map_err(|_| {
            FsError::InvalidArgument("Pattern is not a valid regular expression.".to_string())
        })?;

        let mut removed = 0;
        self.entries.retain(|entry| {
            if !predicate(entry) {
                return true;
            }
            let matches = match &compiled {
                None => true,
                Some(re) => python_style_match(re, &entry.to_string_lossy()),
            };
            if matches {
                log::debug!("Removed path [{}] from list.", entry.display());
                removed += 1;
                false
            } else {
                true
            }
        });

        Ok(removed)
    }

    /// Removes every entry (regardless of kind) whose full path matches
    /// `pattern`. Unlike the exclude lists, the pattern is not anchored at
    /// the front or back.
    pub fn remove_match(&mut self, pattern: &str) -> Result<usize> {
        let compiled = Regex::new(pattern).map_err(|_| {
            FsError::InvalidArgument("Pattern is not a valid regular expression.".to_string())
        })?;

        let mut removed = 0;
        self.entries.retain(|entry| {
            if python_style_match(&compiled, &entry.to_string_lossy()) {
                log::debug!("Removed path [{}] from list.", entry.display());
                removed += 1;
                false
            } else {
                true
            }
        });

        Ok(removed)
    }

    /// Removes every entry no longer present on disk in any form.
    pub fn remove_invalid(&mut self) -> usize {
        let mut removed = 0;
        self.entries.retain(|entry| {
            if entry.exists() || is_symlink(entry) {
                true
            } else {
                removed += 1;
                false
            }
        });
        removed
    }

    /// Dedupes and sorts the list in place.
    pub fn normalize(&mut self) {
        let orig = self.entries.len();
        let set: BTreeSet<PathBuf> = self.entries.drain(..).collect();
        self.entries = set.into_iter().collect();
        log::debug!(
            "Completed normalizing list; removed {} items ({} originally, {} now).",
            orig - self.entries.len(),
            orig,
            self.entries.len()
        );
    }

    /// `true` if every entry in the list still exists on disk.
    pub fn verify(&self) -> bool {
        self.entries.iter().all(|e| e.exists() || is_symlink(e))
    }

    pub(crate) fn entries_mut(&mut self) -> &mut Vec<PathBuf> {
        &mut self.entries
    }

    pub(crate) fn set_entries(&mut self, entries: Vec<PathBuf>) {
        self.entries = entries;
    }
}

/// Replicates Python's `re.match`: succeeds if a match for `pattern`
/// begins at the very start of `text` (the match need not reach the end,
/// unless the pattern itself demands it).
pub(crate) fn python_style_match(re: &Regex, text: &str) -> bool {
    re.find(text).map(|m| m.start() == 0).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn mkfile(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let p = dir.join(name);
        fs::write(&p, contents).unwrap();
        p
    }

    #[test]
    fn add_file_requires_existing_file() {
        let mut list = FilesystemList::new();
        assert!(list.add_file(Path::new("/nonexistent/file")).is_err());
    }

    #[test]
    fn add_file_adds_and_returns_one() {
        let dir = tempfile::tempdir().unwrap();
        let f = mkfile(dir.path(), "a.txt", "hello");
        let mut list = FilesystemList::new();
        assert_eq!(list.add_file(&f).unwrap(), 1);
        assert_eq!(list.entries(), &[f]);
    }

    #[test]
    fn add_file_respects_exclude_files() {
        let dir = tempfile::tempdir().unwrap();
        let f = mkfile(dir.path(), "a.txt", "hello");
        let mut list = FilesystemList::new();
        list.exclude.exclude_files = true;
        assert_eq!(list.add_file(&f).unwrap(), 0);
        assert!(list.is_empty());
    }

    #[test]
    fn add_file_respects_exclude_paths() {
        let dir = tempfile::tempdir().unwrap();
        let f = mkfile(dir.path(), "a.txt", "hello");
        let mut list = FilesystemList::new();
        list.exclude.exclude_paths.push(f.clone());
        assert_eq!(list.add_file(&f).unwrap(), 0);
    }

    #[test]
    fn add_file_respects_exclude_patterns_anchored() {
        let dir = tempfile::tempdir().unwrap();
        let f = mkfile(dir.path(), "secret.txt", "hello");
        let pattern = format!("^{}$", regex::escape(&f.to_string_lossy()));
        let mut list = FilesystemList::new();
        list.exclude.exclude_patterns.push(Regex::new(&pattern).unwrap());
        assert_eq!(list.add_file(&f).unwrap(), 0);
    }

    #[test]
    fn add_file_respects_basename_patterns() {
        let dir = tempfile::tempdir().unwrap();
        let f = mkfile(dir.path(), "ignore.me", "hello");
        let mut list = FilesystemList::new();
        list.exclude
            .exclude_basename_patterns
            .push(Regex::new(r"^ignore\.me$").unwrap());
        assert_eq!(list.add_file(&f).unwrap(), 0);
    }

    #[test]
    fn add_dir_requires_existing_dir() {
        let mut list = FilesystemList::new();
        assert!(list.add_dir(Path::new("/nonexistent/dir")).is_err());
    }

    #[test]
    fn add_dir_contents_recurses_and_includes_self() {
        let dir = tempfile::tempdir().unwrap();
        mkfile(dir.path(), "a.txt", "a");
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        mkfile(&sub, "b.txt", "b");

        let mut list = FilesystemList::new();
        let added = list
            .add_dir_contents(dir.path(), true, true, 0, false)
            .unwrap();
        assert_eq!(added, 4); // root dir, a.txt, sub dir, b.txt
        assert!(list.entries().contains(&dir.path().to_path_buf()));
        assert!(list.entries().contains(&sub));
    }

    #[test]
    fn add_dir_contents_without_self() {
        let dir = tempfile::tempdir().unwrap();
        mkfile(dir.path(), "a.txt", "a");

        let mut list = FilesystemList::new();
        let added = list
            .add_dir_contents(dir.path(), true, false, 0, false)
            .unwrap();
        assert_eq!(added, 1);
        assert!(!list.entries().contains(&dir.path().to_path_buf()));
    }

    #[test]
    fn add_dir_contents_non_recursive_adds_subdir_but_not_its_children() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        mkfile(&sub, "b.txt", "b");

        let mut list = FilesystemList::new();
        let added = list
            .add_dir_contents(dir.path(), false, true, 0, false)
            .unwrap();
        assert_eq!(added, 2); // root dir, sub dir (not b.txt)
        assert!(!list.entries().iter().any(|p| p.ends_with("b.txt")));
    }

    #[test]
    fn add_dir_contents_excludes_subtree_with_ignore_file() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        mkfile(&sub, "b.txt", "b");
        mkfile(&sub, ".ignore", "");

        let mut list = FilesystemList::new();
        list.exclude.ignore_file = Some(".ignore".to_string());
        let added = list
            .add_dir_contents(dir.path(), true, true, 0, false)
            .unwrap();
        assert_eq!(added, 1); // only root dir; sub tree entirely excluded
    }

    #[test]
    fn remove_dirs_clears_directory_entries() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();

        let mut list = FilesystemList::new();
        list.add_dir(&sub).unwrap();
        assert_eq!(list.remove_dirs(None).unwrap(), 1);
        assert!(list.is_empty());
    }

    #[test]
    fn remove_files_leaves_dirs_alone() {
        let dir = tempfile::tempdir().unwrap();
        let f = mkfile(dir.path(), "a.txt", "a");
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();

        let mut list = FilesystemList::new();
        list.add_file(&f).unwrap();
        list.add_dir(&sub).unwrap();
        assert_eq!(list.remove_files(None).unwrap(), 1);
        assert_eq!(list.entries(), &[sub]);
    }

    #[test]
    fn remove_match_is_unanchored_at_end() {
        let dir = tempfile::tempdir().unwrap();
        let f = mkfile(dir.path(), "a.txt", "a");

        let mut list = FilesystemList::new();
        list.add_file(&f).unwrap();
        // matches from the start only, needn't reach the end (python re.match semantics)
        let prefix = f.to_string_lossy()[..3].to_string();
        assert_eq!(list.remove_match(&regex::escape(&prefix)).unwrap(), 1);
    }

    #[test]
    fn remove_invalid_drops_deleted_entries() {
        let dir = tempfile::tempdir().unwrap();
        let f = mkfile(dir.path(), "a.txt", "a");

        let mut list = FilesystemList::new();
        list.add_file(&f).unwrap();
        fs::remove_file(&f).unwrap();
        assert_eq!(list.remove_invalid(), 1);
        assert!(list.is_empty());
    }

    #[test]
    fn normalize_dedupes_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let b = mkfile(dir.path(), "b.txt", "b");
        let a = mkfile(dir.path(), "a.txt", "a");

        let mut list = FilesystemList::new();
        list.add_file(&b).unwrap();
        list.add_file(&a).unwrap();
        list.add_file(&a).unwrap();
        list.normalize();
        assert_eq!(list.entries(), &[a, b]);
    }

    #[test]
    fn remove_dir_after_add_removes_directory_testable_property() {
        // "For all FilesystemList instances and all paths p, after
        // addDir(p) followed by removeDirs(), p not in list."
        let dir = tempfile::tempdir().unwrap();
        let mut list = FilesystemList::new();
        list.add_dir(dir.path()).unwrap();
        list.remove_dirs(None).unwrap();
        assert!(!list.entries().contains(&dir.path().to_path_buf()));
    }
}
