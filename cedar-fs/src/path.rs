//! Path helpers shared by the filesystem list and archive-naming code.
//!
//! These only need to cope with POSIX-style separators: Windows support is
//! out of scope for the whole engine (the disc-writing paths assume POSIX
//! mount/umount semantics), so this module does not attempt to.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{FsError, Result};

/// Returns an error unless `path` is absolute.
pub fn require_absolute(path: &Path) -> Result<()> {
    if path.is_absolute() {
        Ok(())
    } else {
        Err(FsError::NotAbsolute(path.to_path_buf()))
    }
}

/// Encodes a filesystem path into a safe archive/file name fragment.
///
/// Normalization rule (spec §6 "Tar archive format"): a leading `/` or `\`
/// is stripped; a leading `.` becomes `_`; subsequent `/` and `\` become
/// `-`; all whitespace becomes `_`; a bare `/` or `\` becomes `-`.
pub fn normalize_archive_name(path: &Path) -> String {
    let raw = path.to_string_lossy();

    if raw == "/" || raw == "\\" {
        return "-".to_string();
    }

    let mut chars: Vec<char> = raw.chars().collect();

    if let Some(&first) = chars.first() {
        if first == '/' || first == '\\' {
            chars.remove(0);
        } else if first == '.' {
            chars[0] = '_';
        }
    }

    chars
        .into_iter()
        .map(|c| match c {
            '/' | '\\' => '-',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect()
}

/// Strips a configured prefix from `path`, returning the path unchanged if
/// the prefix does not apply.
pub fn strip_prefix<'a>(path: &'a Path, prefix: Option<&Path>) -> PathBuf {
    match prefix {
        Some(prefix) => path.strip_prefix(prefix).unwrap_or(path).to_path_buf(),
        None => path.to_path_buf(),
    }
}

/// Age in whole days of a path, computed as `floor((now - max(atime,
/// mtime)) / 86400)`, clamped to be non-negative.
///
/// Mirrors `original_source/util.py::calculateFileAge` exactly: the most
/// recent of access and modification time wins, and a path whose recorded
/// times are in the future (clock skew, just-written file) has age zero
/// rather than a negative number.
pub fn file_age_days(path: &Path) -> Result<i64> {
    let metadata = std::fs::symlink_metadata(path).map_err(|e| FsError::io(path, e))?;

    let mtime = metadata.modified().map_err(|e| FsError::io(path, e))?;
    let atime = metadata.accessed().unwrap_or(mtime);
    let newest = atime.max(mtime);

    let now = SystemTime::now();
    let age_seconds = now
        .duration_since(newest)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    Ok((age_seconds / 86_400).max(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_leading_slash() {
        assert_eq!(
            normalize_archive_name(Path::new("/home/user/data")),
            "home-user-data"
        );
    }

    #[test]
    fn leading_dot_becomes_underscore() {
        assert_eq!(normalize_archive_name(Path::new(".hidden/dir")), "_hidden-dir");
    }

    #[test]
    fn bare_slash_becomes_dash() {
        assert_eq!(normalize_archive_name(Path::new("/")), "-");
    }

    #[test]
    fn whitespace_becomes_underscore() {
        assert_eq!(
            normalize_archive_name(Path::new("/my documents/a b")),
            "my_documents-a_b"
        );
    }

    #[test]
    fn require_absolute_rejects_relative() {
        assert!(require_absolute(Path::new("relative/path")).is_err());
        assert!(require_absolute(Path::new("/absolute/path")).is_ok());
    }

    #[test]
    fn strip_prefix_passthrough_without_prefix() {
        let p = Path::new("/a/b/c");
        assert_eq!(strip_prefix(p, None), p);
    }

    #[test]
    fn strip_prefix_applies() {
        let p = Path::new("/a/b/c");
        assert_eq!(strip_prefix(p, Some(Path::new("/a"))), PathBuf::from("b/c"));
    }
}
