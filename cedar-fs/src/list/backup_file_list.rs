//! [`BackupFileList`]: a [`FilesystemList`] of files only, with hashing,
//! knapsack span-packing, and tar archive generation.

use std::collections::BTreeMap;
use std::io::Write;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use crate::digest::digest_file;
use crate::error::{FsError, Result};
use crate::knapsack::Algorithm;
use crate::path::strip_prefix;

use super::filesystem_list::FilesystemList;

/// Tar archive compression applied by [`BackupFileList::generate_tarfile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TarMode {
    /// Plain, uncompressed GNU tar.
    Tar,
    /// Gzip-compressed GNU tar.
    TarGz,
    /// Bzip2-compressed GNU tar.
    TarBz2,
}

/// One disc's worth of files as returned by [`BackupFileList::generate_span`].
#[derive(Debug, Clone)]
pub struct SpanItem {
    /// Files selected for this span.
    pub file_list: Vec<PathBuf>,
    /// Total size, in bytes, of `file_list`.
    pub size: f64,
    /// Capacity the span was packed against.
    pub capacity: f64,
    /// `size / capacity * 100`.
    pub utilization: f64,
}

/// A [`FilesystemList`] containing only files to be backed up (directories
/// are never added unless they are symlinks).
#[derive(Debug, Default, Clone)]
pub struct BackupFileList(FilesystemList);

impl BackupFileList {
    /// Creates an empty list with no configured exclusions.
    pub fn new() -> Self {
        let mut inner = FilesystemList::new();
        inner.files_only = true;
        BackupFileList(inner)
    }

    /// Total size, in bytes, of regular files in the list. Symlinks and
    /// missing entries contribute zero.
    pub fn total_size(&self) -> f64 {
        self.entries()
            .iter()
            .filter(|e| e.is_file() && !is_symlink(e))
            .map(|e| std::fs::metadata(e).map(|m| m.len() as f64).unwrap_or(0.0))
            .sum()
    }

    /// Maps each live entry to its size in bytes; symlinks map to zero.
    pub fn generate_size_map(&self) -> BTreeMap<PathBuf, f64> {
        let mut map = BTreeMap::new();
        for entry in self.entries() {
            if is_symlink(entry) {
                map.insert(entry.clone(), 0.0);
            } else if entry.is_file() {
                let size = std::fs::metadata(entry).map(|m| m.len() as f64).unwrap_or(0.0);
                map.insert(entry.clone(), size);
            }
        }
        map
    }

    /// Maps each live regular file to its hex SHA-1 digest; symlinks and
    /// nonexistent entries are excluded. `strip_prefix_path`, if given, is
    /// removed from the map's keys.
    pub fn generate_digest_map(&self, strip_prefix_path: Option<&Path>) -> Result<BTreeMap<PathBuf, String>> {
        let mut map = BTreeMap::new();
        for entry in self.entries() {
            if entry.is_file() && !is_symlink(entry) {
                let digest = digest_file(entry)?;
                map.insert(strip_prefix(entry, strip_prefix_path), digest);
            }
        }
        Ok(map)
    }

    fn knapsack_table(&self, capacity: Option<f64>) -> Result<BTreeMap<PathBuf, f64>> {
        let mut table = BTreeMap::new();
        for entry in self.entries() {
            if is_symlink(entry) {
                table.insert(entry.clone(), 0.0);
            } else if entry.is_file() {
                let size = std::fs::metadata(entry).map(|m| m.len() as f64).unwrap_or(0.0);
                if let Some(capacity) = capacity {
                    if size > capacity {
                        return Err(FsError::InvalidArgument(format!(
                            "File [{}] cannot fit in capacity {capacity}.",
                            entry.display()
                        )));
                    }
                }
                table.insert(entry.clone(), size);
            }
        }
        Ok(table)
    }

    /// Returns a copy of this list containing only the subset of entries
    /// whose sizes sum to at most `capacity`, chosen by `algorithm`.
    pub fn generate_fitted(&self, capacity: f64, algorithm: Algorithm) -> Result<BackupFileList> {
        let table = self.knapsack_table(None)?;
        let (selected, _total) = algorithm.fit(&table, capacity);

        let mut fitted = BackupFileList::new();
        fitted.0.set_entries(selected);
        Ok(fitted)
    }

    /// Repeatedly packs the list into `capacity`-sized bins until every
    /// entry has been placed into some [`SpanItem`].
    ///
    /// Fails if any single file exceeds `capacity`, or if a knapsack
    /// iteration makes no progress.
    pub fn generate_span(&self, capacity: f64, algorithm: Algorithm) -> Result<Vec<SpanItem>> {
        let mut table = self.knapsack_table(Some(capacity))?;
        let mut spans = Vec::new();
        let mut iteration = 0;

        while !table.is_empty() {
            iteration += 1;
            let (selected, total) = algorithm.fit(&table, capacity);
            if selected.is_empty() {
                return Err(FsError::InvalidArgument(format!(
                    "After iteration {iteration}, unable to add any new items."
                )));
            }
            for key in &selected {
                table.remove(key);
            }
            let utilization = (total / capacity) * 100.0;
            spans.push(SpanItem {
                file_list: selected,
                size: total,
                capacity,
                utilization,
            });
        }

        Ok(spans)
    }

    /// Builds a GNU-format tar archive containing every entry, with no
    /// recursion at add-time (each entry is added individually, so
    /// symlinks to directories are stored as links rather than walked).
    ///
    /// If any fatal per-entry error occurs (`ignore=false`), the partial
    /// tarfile is removed from disk before the error is returned.
    pub fn generate_tarfile(&self, path: &Path, mode: TarMode, ignore: bool, flat: bool) -> Result<()> {
        if self.is_empty() {
            return Err(FsError::InvalidArgument(
                "Empty list cannot be used to generate tarfile.".to_string(),
            ));
        }

        let result = self.write_tarfile(path, mode, ignore, flat);
        if result.is_err() && path.exists() {
            let _ = std::fs::remove_file(path);
        }
        result
    }

    fn write_tarfile(&self, path: &Path, mode: TarMode, ignore: bool, flat: bool) -> Result<()> {
        let file = std::fs::File::create(path).map_err(|e| FsError::io(path, e))?;

        match mode {
            TarMode::Tar => {
                let mut builder = tar::Builder::new(file);
                builder.mode(tar::HeaderMode::Deterministic);
                self.append_entries(&mut builder, flat, ignore)?;
                builder.into_inner().map_err(FsError::PlainIo)?;
            }
            TarMode::TarGz => {
                let enc = flate2::write::GzEncoder::new(file, flate2::Compression::default());
                let mut builder = tar::Builder::new(enc);
                builder.mode(tar::HeaderMode::Deterministic);
                self.append_entries(&mut builder, flat, ignore)?;
                let enc = builder.into_inner().map_err(FsError::PlainIo)?;
                enc.finish().map_err(FsError::PlainIo)?;
            }
            TarMode::TarBz2 => {
                let enc = bzip2::write::BzEncoder::new(file, bzip2::Compression::default());
                let mut builder = tar::Builder::new(enc);
                builder.mode(tar::HeaderMode::Deterministic);
                self.append_entries(&mut builder, flat, ignore)?;
                let enc = builder.into_inner().map_err(FsError::PlainIo)?;
                enc.finish().map_err(FsError::PlainIo)?;
            }
        }

        Ok(())
    }

    fn append_entries<W: Write>(&self, builder: &mut tar::Builder<W>, flat: bool, ignore: bool) -> Result<()> {
        for entry in self.entries() {
            let name: PathBuf = if flat {
                PathBuf::from(entry.file_name().unwrap_or_default())
            } else {
                entry.strip_prefix("/").unwrap_or(entry).to_path_buf()
            };

            let added = if is_symlink(entry) {
                let target = std::fs::read_link(entry);
                match target {
                    Ok(target) => builder
                        .append_link(
                            &mut tar::Header::new_gnu(),
                            &name,
                            &target,
                        )
                        .map_err(FsError::PlainIo),
                    Err(e) => Err(FsError::PlainIo(e)),
                }
            } else {
                builder
                    .append_path_with_name(entry, &name)
                    .map_err(FsError::PlainIo)
            };

            if let Err(e) = added {
                if ignore {
                    log::info!("Unable to add file [{}]; going on anyway: {e}", entry.display());
                } else {
                    return Err(FsError::archive(entry.clone(), e.to_string()));
                }
            }
        }
        Ok(())
    }

    /// For every path also present in `digest_map` whose current digest
    /// equals the stored one, removes it from this list.
    ///
    /// If `capture_digest` is set, digests are computed for every live
    /// regular file in the list (not only the ones being queried) and
    /// `(removed_count, new_digest_map)` is returned. Otherwise only the
    /// intersection is hashed and only `removed_count` is returned.
    pub fn remove_unchanged(
        &mut self,
        digest_map: &BTreeMap<PathBuf, String>,
        capture_digest: bool,
    ) -> Result<(usize, Option<BTreeMap<PathBuf, String>>)> {
        if capture_digest {
            let mut removed = 0;
            let mut table: BTreeMap<PathBuf, Option<String>> = BTreeMap::new();
            let mut captured = BTreeMap::new();

            for entry in self.entries() {
                if entry.is_file() && !is_symlink(entry) {
                    let digest = digest_file(entry)?;
                    captured.insert(entry.clone(), digest.clone());
                    table.insert(entry.clone(), Some(digest));
                } else {
                    table.insert(entry.clone(), None);
                }
            }

            for (entry, expected) in digest_map {
                if let Some(Some(digest)) = table.get(entry) {
                    if digest == expected {
                        table.remove(entry);
                        removed += 1;
                        log::debug!("Discarded unchanged file [{}].", entry.display());
                    }
                }
            }

            self.0.set_entries(table.into_keys().collect());
            Ok((removed, Some(captured)))
        } else {
            let mut removed = 0;
            let mut table: BTreeMap<PathBuf, ()> =
                self.entries().iter().map(|e| (e.clone(), ())).collect();

            for (entry, expected) in digest_map {
                if table.contains_key(entry) && entry.is_file() && !is_symlink(entry) {
                    let digest = digest_file(entry)?;
                    if &digest == expected {
                        table.remove(entry);
                        removed += 1;
                        log::debug!("Discarded unchanged file [{}].", entry.display());
                    }
                }
            }

            self.0.set_entries(table.into_keys().collect());
            Ok((removed, None))
        }
    }
}

fn is_symlink(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

impl Deref for BackupFileList {
    type Target = FilesystemList;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for BackupFileList {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn mkfile(dir: &Path, name: &str, size: usize) -> PathBuf {
        let p = dir.join(name);
        fs::write(&p, vec![b'x'; size]).unwrap();
        p
    }

    #[test]
    fn add_dir_rejects_real_directories() {
        let dir = tempfile::tempdir().unwrap();
        let mut list = BackupFileList::new();
        assert_eq!(list.add_dir(dir.path()).unwrap(), 0);
    }

    #[test]
    fn total_size_counts_only_files() {
        let dir = tempfile::tempdir().unwrap();
        let f = mkfile(dir.path(), "a.txt", 42);
        let mut list = BackupFileList::new();
        list.add_file(&f).unwrap();
        assert_eq!(list.total_size(), 42.0);
    }

    #[test]
    fn span_packing_scenario_from_spec() {
        let dir = tempfile::tempdir().unwrap();
        let a = mkfile(dir.path(), "a", 300);
        let b = mkfile(dir.path(), "b", 300);
        let c = mkfile(dir.path(), "c", 400);
        let d = mkfile(dir.path(), "d", 700);

        let mut list = BackupFileList::new();
        for f in [&a, &b, &c, &d] {
            list.add_file(f).unwrap();
        }

        let spans = list.generate_span(1000.0, Algorithm::WorstFit).unwrap();
        assert_eq!(spans.len(), 2);

        assert_eq!(spans[0].size, 1000.0);
        assert_eq!(spans[0].utilization, 100.0);
        assert!(spans[0].file_list.contains(&d));
        assert!(spans[0].file_list.contains(&a));

        assert_eq!(spans[1].size, 700.0);
        assert_eq!(spans[1].utilization, 70.0);
        assert!(spans[1].file_list.contains(&c));
        assert!(spans[1].file_list.contains(&b));
    }

    #[test]
    fn span_partitions_with_no_duplicates_or_omissions() {
        let dir = tempfile::tempdir().unwrap();
        let mut expected = Vec::new();
        let mut list = BackupFileList::new();
        for i in 0..9 {
            let f = mkfile(dir.path(), &format!("f{i}"), 50 + i * 10);
            expected.push(f.clone());
            list.add_file(&f).unwrap();
        }

        let spans = list.generate_span(300.0, Algorithm::FirstFit).unwrap();
        let mut all: Vec<PathBuf> = spans.into_iter().flat_map(|s| s.file_list).collect();
        all.sort();
        expected.sort();
        assert_eq!(all, expected);
    }

    #[test]
    fn span_rejects_oversized_file() {
        let dir = tempfile::tempdir().unwrap();
        let f = mkfile(dir.path(), "huge", 2000);
        let mut list = BackupFileList::new();
        list.add_file(&f).unwrap();
        assert!(list.generate_span(1000.0, Algorithm::WorstFit).is_err());
    }

    #[test]
    fn digest_incrementality_scenario_from_spec() {
        let dir = tempfile::tempdir().unwrap();
        let f1 = dir.path().join("file001");
        let f2 = dir.path().join("file002");
        fs::write(&f1, "aaa").unwrap();
        fs::write(&f2, "bbb").unwrap();

        let mut list = BackupFileList::new();
        list.add_file(&f1).unwrap();
        list.add_file(&f2).unwrap();

        let snapshot = list.generate_digest_map(None).unwrap();

        fs::write(&f2, "ccc").unwrap();

        let (removed, new_map) = list.remove_unchanged(&snapshot, false).unwrap();
        assert_eq!(removed, 1);
        assert!(new_map.is_none());
        assert_eq!(list.entries(), &[f2]);
    }

    #[test]
    fn capture_digest_returns_full_map() {
        let dir = tempfile::tempdir().unwrap();
        let f1 = dir.path().join("file001");
        fs::write(&f1, "aaa").unwrap();

        let mut list = BackupFileList::new();
        list.add_file(&f1).unwrap();
        let snapshot = list.generate_digest_map(None).unwrap();

        let (removed, new_map) = list.remove_unchanged(&snapshot, true).unwrap();
        assert_eq!(removed, 1);
        assert!(new_map.unwrap().contains_key(&f1));
    }

    #[test]
    fn tarfile_roundtrips_digest() {
        let dir = tempfile::tempdir().unwrap();
        let f1 = mkfile(dir.path(), "a.txt", 10);
        let f2 = mkfile(dir.path(), "b.txt", 20);

        let mut list = BackupFileList::new();
        list.add_file(&f1).unwrap();
        list.add_file(&f2).unwrap();

        let original_digests = list.generate_digest_map(Some(dir.path())).unwrap();

        let tar_path = dir.path().join("out.tar");
        list.generate_tarfile(&tar_path, TarMode::Tar, false, false).unwrap();
        assert!(tar_path.exists());

        let extract_dir = tempfile::tempdir().unwrap();
        let file = fs::File::open(&tar_path).unwrap();
        let mut archive = tar::Archive::new(file);
        archive.unpack(extract_dir.path()).unwrap();

        let mut extracted = BackupFileList::new();
        extracted
            .add_dir_contents(
                &extract_dir.path().join(dir.path().strip_prefix("/").unwrap()),
                true,
                false,
                0,
                false,
            )
            .unwrap();
        let extracted_digests = extracted
            .generate_digest_map(Some(&extract_dir.path().join(dir.path().strip_prefix("/").unwrap())))
            .unwrap();

        assert_eq!(original_digests, extracted_digests);
    }

    #[test]
    fn empty_list_cannot_generate_tarfile() {
        let dir = tempfile::tempdir().unwrap();
        let list = BackupFileList::new();
        let result = list.generate_tarfile(&dir.path().join("x.tar"), TarMode::Tar, false, false);
        assert!(result.is_err());
        assert!(!dir.path().join("x.tar").exists());
    }

    #[test]
    fn flat_archive_strips_directory() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        let f = mkfile(&sub, "a.txt", 5);

        let mut list = BackupFileList::new();
        list.add_file(&f).unwrap();

        let tar_path = dir.path().join("flat.tar");
        list.generate_tarfile(&tar_path, TarMode::Tar, false, true).unwrap();

        let file = fs::File::open(&tar_path).unwrap();
        let mut archive = tar::Archive::new(file);
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.txt"]);
    }
}
