//! Indicator files: zero-byte markers that coordinate stages across
//! hosts and across runs (`cback.collect`, `cback.stage`, `cback.store`).

use std::path::{Path, PathBuf};

use crate::error::{CedarError, Result};
use crate::platform::Platform;

/// Default indicator file name for the collect stage.
pub const COLLECT_INDICATOR: &str = "cback.collect";
/// Default indicator file name for the stage stage.
pub const STAGE_INDICATOR: &str = "cback.stage";
/// Default indicator file name for the store stage.
pub const STORE_INDICATOR: &str = "cback.store";

/// `true` if `dir/name` exists (`name` defaults to the given default).
pub fn exists(dir: &Path, name: Option<&str>, default: &str) -> bool {
    indicator_path(dir, name, default).exists()
}

/// Creates (or truncates) `dir/name` as a zero-byte file, chowning it to
/// `ownership` when running as root and `platform` is given.
pub fn write(
    dir: &Path,
    name: Option<&str>,
    default: &str,
    platform: Option<&dyn Platform>,
    ownership: Option<(u32, u32)>,
) -> Result<()> {
    let path = indicator_path(dir, name, default);
    std::fs::File::create(&path)
        .map_err(|e| CedarError::io(format!("failed to write indicator [{}]: {e}", path.display())))?;
    log::debug!("Wrote indicator file [{}].", path.display());

    if let (Some(platform), Some((uid, gid))) = (platform, ownership) {
        if platform.is_running_as_root() {
            platform.chown(&path, uid, gid)?;
        }
    }

    Ok(())
}

fn indicator_path(dir: &Path, name: Option<&str>, default: &str) -> PathBuf {
    dir.join(name.unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exists_false_before_write_true_after() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!exists(dir.path(), None, COLLECT_INDICATOR));
        write(dir.path(), None, COLLECT_INDICATOR, None, None).unwrap();
        assert!(exists(dir.path(), None, COLLECT_INDICATOR));
    }

    #[test]
    fn custom_name_is_respected() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), Some("custom.marker"), STAGE_INDICATOR, None, None).unwrap();
        assert!(dir.path().join("custom.marker").exists());
        assert!(!exists(dir.path(), None, STAGE_INDICATOR));
    }
}
