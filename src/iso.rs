//! `IsoImage`: a staging structure mapping on-disk paths to in-image
//! graft points, which produces the `mkisofs`/`genisoimage` argument list
//! and can ask that tool for an estimated or real image size.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::command::CommandRunner;
use crate::error::{CedarError, Result};

/// Multisession append point: `(lower_start_sector, next_writable_sector)`.
pub type Boundaries = (u64, u64);

#[derive(Debug, Clone)]
struct Entry {
    graft_point: Option<PathBuf>,
    contents_only: bool,
    is_dir: bool,
}

/// ISO 9660 + Rock Ridge image builder, driven entirely through an
/// external `mkisofs`/`genisoimage` invocation.
#[derive(Debug, Clone)]
pub struct IsoImage {
    entries: BTreeMap<PathBuf, Entry>,
    /// External tool binary name (`mkisofs` or `genisoimage`).
    pub tool: String,
    /// Volume id (`-V`).
    pub volume_id: Option<String>,
    /// Publisher id (`-publisher`).
    pub publisher_id: Option<String>,
    /// Application id (`-A`).
    pub application_id: Option<String>,
    /// Preparer id (`-p`).
    pub preparer_id: Option<String>,
    /// Bibliography file (`-biblio`).
    pub bibliography_file: Option<PathBuf>,
    /// Whether to emit Rock Ridge extensions (`-r`). Defaults to `true`.
    pub use_rock_ridge: bool,
    /// Device and session boundaries when appending to an existing
    /// multisession disc.
    pub append: Option<(PathBuf, Boundaries)>,
}

impl Default for IsoImage {
    fn default() -> Self {
        IsoImage {
            entries: BTreeMap::new(),
            tool: "mkisofs".to_string(),
            volume_id: None,
            publisher_id: None,
            application_id: None,
            preparer_id: None,
            bibliography_file: None,
            use_rock_ridge: true,
            append: None,
        }
    }
}

impl IsoImage {
    /// Creates an empty image with Rock Ridge enabled and no append
    /// target.
    pub fn new() -> Self {
        IsoImage::default()
    }

    /// Adds `path` to the image, rejecting nonexistent paths and
    /// symlinks (to either files or directories, since the image
    /// contents must be reproducible from the staged tree alone).
    ///
    /// Rejects a path already present unless `override_existing` is set,
    /// in which case the stored graft point is replaced.
    pub fn add_entry(
        &mut self,
        path: &Path,
        graft_point: Option<&Path>,
        override_existing: bool,
        contents_only: bool,
    ) -> Result<()> {
        let metadata = std::fs::symlink_metadata(path)
            .map_err(|e| CedarError::io(format!("path [{}] does not exist: {e}", path.display())))?;

        if metadata.file_type().is_symlink() {
            return Err(CedarError::usage(format!(
                "path [{}] is a symlink and cannot be added to an ISO image",
                path.display()
            )));
        }

        if self.entries.contains_key(path) && !override_existing {
            return Err(CedarError::usage(format!(
                "path [{}] is already in the image",
                path.display()
            )));
        }

        self.entries.insert(
            path.to_path_buf(),
            Entry {
                graft_point: graft_point.map(|p| p.to_path_buf()),
                contents_only,
                is_dir: metadata.is_dir(),
            },
        );

        log::debug!("Added entry [{}] to ISO image.", path.display());
        Ok(())
    }

    /// Number of entries currently staged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if no entries are staged.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn effective_graft_point(path: &Path, entry: &Entry) -> PathBuf {
        if entry.is_dir && !entry.contents_only {
            let basename = path.file_name().unwrap_or_default();
            match &entry.graft_point {
                Some(g) => g.join(basename),
                None => PathBuf::from(basename),
            }
        } else {
            entry.graft_point.clone().unwrap_or_default()
        }
    }

    /// Builds the `graftpoint=sourcepath` argument list, sorted by
    /// source path for deterministic ordering.
    fn graft_args(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(path, entry)| {
                let graft = Self::effective_graft_point(path, entry);
                format!("{}={}", graft.display(), path.display())
            })
            .collect()
    }

    fn base_args(&self) -> Vec<String> {
        let mut args = vec!["-graft-points".to_string(), "-full-iso9660-filenames".to_string()];
        if self.use_rock_ridge {
            args.push("-r".to_string());
        }
        if let Some(v) = &self.volume_id {
            args.push("-V".to_string());
            args.push(v.clone());
        }
        if let Some(v) = &self.publisher_id {
            args.push("-publisher".to_string());
            args.push(v.clone());
        }
        if let Some(v) = &self.application_id {
            args.push("-A".to_string());
            args.push(v.clone());
        }
        if let Some(v) = &self.preparer_id {
            args.push("-p".to_string());
            args.push(v.clone());
        }
        if let Some(v) = &self.bibliography_file {
            args.push("-biblio".to_string());
            args.push(v.to_string_lossy().into_owned());
        }
        if let Some((device, (lower, upper))) = &self.append {
            args.push("-C".to_string());
            args.push(format!("{lower},{upper}"));
            args.push("-M".to_string());
            args.push(device.to_string_lossy().into_owned());
        }
        args
    }

    /// Full passthrough argument list (everything `growisofs` needs to
    /// forward to its embedded mkisofs when it builds the image itself
    /// rather than burning a pre-built file).
    pub(crate) fn mkisofs_passthrough_args(&self) -> Vec<String> {
        let mut args = self.base_args();
        args.extend(self.graft_args());
        args
    }

    /// Invokes the image tool in size-estimate (dry-run) mode and
    /// returns the projected image size in bytes.
    pub fn get_estimated_size(&self, runner: &CommandRunner) -> Result<u64> {
        if self.is_empty() {
            return Err(CedarError::usage("cannot estimate size of an empty ISO image"));
        }

        let mut args = self.base_args();
        args.push("-print-size".to_string());
        args.push("-quiet".to_string());
        args.extend(self.graft_args());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = runner.run(&self.tool, &arg_refs, false)?;

        parse_print_size(&out.output)
            .map(|sectors| sectors * 2048)
            .ok_or_else(|| CedarError::io(format!("could not parse estimated size from [{}] output", self.tool)))
    }

    /// Invokes the image tool for real, writing the finished image to
    /// `path`.
    pub fn write_image(&self, runner: &CommandRunner, path: &Path) -> Result<()> {
        if self.is_empty() {
            return Err(CedarError::usage("cannot write an empty ISO image"));
        }

        let mut args = self.base_args();
        args.push("-o".to_string());
        args.push(path.to_string_lossy().into_owned());
        args.extend(self.graft_args());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = runner.run(&self.tool, &arg_refs, false)?;

        if !out.success() {
            return Err(CedarError::io(format!(
                "[{}] failed to write image: {}",
                self.tool, out.output
            )));
        }

        log::info!("Wrote ISO image [{}].", path.display());
        Ok(())
    }
}

fn parse_print_size(output: &str) -> Option<u64> {
    let re = Regex::new(r"(\d+)").expect("static regex");
    output
        .lines()
        .rev()
        .find_map(|line| re.find(line.trim()).and_then(|m| m.as_str().parse().ok()))
}
