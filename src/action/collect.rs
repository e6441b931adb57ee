//! The `collect` action: walks each configured source directory and
//! writes one tar archive per source into the collect directory, plus
//! a `cback.collect` indicator.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use cedar_fs::{BackupFileList, TarMode};

use crate::config::{CollectConfig, CollectMode, Config};
use crate::error::{CedarError, Result};
use crate::indicator::{self, COLLECT_INDICATOR};
use crate::platform::Platform;

use super::compile_anchored;

fn digest_sidecar_path(target_dir: &Path, source: &Path) -> PathBuf {
    let name = cedar_fs::path::normalize_archive_name(source);
    target_dir.join(format!("{name}.digest"))
}

fn load_digest_map(path: &Path) -> Result<BTreeMap<PathBuf, String>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let contents = std::fs::read_to_string(path)
        .map_err(|e| CedarError::io(format!("failed to read digest file [{}]: {e}", path.display())))?;
    Ok(serde_yaml::from_str(&contents)?)
}

fn save_digest_map(path: &Path, map: &BTreeMap<PathBuf, String>) -> Result<()> {
    let serialized = serde_yaml::to_string(map)?;
    std::fs::write(path, serialized)
        .map_err(|e| CedarError::io(format!("failed to write digest file [{}]: {e}", path.display())))
}

fn archive_path(target_dir: &Path, source: &Path, mode: TarMode) -> PathBuf {
    let name = cedar_fs::path::normalize_archive_name(source);
    let ext = match mode {
        TarMode::Tar => "tar",
        TarMode::TarGz => "tar.gz",
        TarMode::TarBz2 => "tar.bz2",
    };
    target_dir.join(format!("{name}.{ext}"))
}

/// Runs the `collect` action: builds a [`BackupFileList`] per configured
/// source, optionally dropping digest-unchanged files in incremental
/// mode, writes each as a tar archive, and finishes with the collect
/// indicator.
pub fn execute_collect(
    config: &Config,
    ownership: Option<(u32, u32)>,
    platform: &dyn Platform,
) -> Result<()> {
    let collect: &CollectConfig = config
        .collect
        .as_ref()
        .ok_or_else(|| CedarError::usage("collect: no [collect] configuration section present"))?;

    super::ensure_dir(&collect.target_dir, ownership, platform)?;

    let tar_mode: TarMode = collect.archive_mode.into();

    for dir_config in &collect.collect_dirs {
        let source = &dir_config.abs_path;
        log::info!("Collecting [{}].", source.display());

        let mut list = BackupFileList::new();
        list.exclude.ignore_file = collect.ignore_file.clone();
        list.exclude.exclude_patterns = compile_anchored(&dir_config.exclude_patterns)?;

        list.add_dir_contents(source, true, false, 0, false)?;

        if list.is_empty() {
            log::warn!("Collect source [{}] produced no files; skipping.", source.display());
            continue;
        }

        if collect.collect_mode == CollectMode::Incremental {
            let digest_path = digest_sidecar_path(&collect.target_dir, source);
            let previous = load_digest_map(&digest_path)?;
            let (removed, captured) = list.remove_unchanged(&previous, true)?;
            log::debug!("Incremental collect dropped {removed} unchanged file(s).");
            if let Some(captured) = captured {
                save_digest_map(&digest_path, &captured)?;
            }
            if list.is_empty() {
                log::info!("All files in [{}] are unchanged; nothing to archive.", source.display());
                continue;
            }
        }

        let path = archive_path(&collect.target_dir, source, tar_mode);
        list.generate_tarfile(&path, tar_mode, false, false)?;
        log::info!("Wrote collect archive [{}].", path.display());
    }

    indicator::write(&collect.target_dir, None, COLLECT_INDICATOR, Some(platform), ownership)?;
    log::info!("Executed collect successfully.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ArchiveMode, CollectDirConfig};
    use crate::platform::PosixPlatform;

    fn base_config(target_dir: PathBuf, source: PathBuf) -> Config {
        Config {
            collect: Some(CollectConfig {
                target_dir,
                collect_mode: CollectMode::Daily,
                archive_mode: ArchiveMode::Tar,
                ignore_file: None,
                collect_dirs: vec![CollectDirConfig {
                    abs_path: source,
                    exclude_patterns: Vec::new(),
                }],
            }),
            ..Default::default()
        }
    }

    #[test]
    fn collect_writes_archive_and_indicator() {
        let source = tempfile::tempdir().unwrap();
        std::fs::write(source.path().join("a.txt"), "hello").unwrap();
        let target = tempfile::tempdir().unwrap();

        let config = base_config(target.path().to_path_buf(), source.path().to_path_buf());
        execute_collect(&config, None, &PosixPlatform).unwrap();

        assert!(indicator::exists(target.path(), None, COLLECT_INDICATOR));
        let entries: Vec<_> = std::fs::read_dir(target.path()).unwrap().collect();
        assert!(entries.iter().any(|e| e
            .as_ref()
            .unwrap()
            .path()
            .extension()
            .map(|ext| ext == "tar")
            .unwrap_or(false)));
    }

    #[test]
    fn collect_fails_without_config_section() {
        let config = Config::default();
        assert!(execute_collect(&config, None, &PosixPlatform).is_err());
    }

    #[test]
    fn incremental_collect_skips_unchanged_source_on_second_run() {
        let source = tempfile::tempdir().unwrap();
        std::fs::write(source.path().join("a.txt"), "hello").unwrap();
        let target = tempfile::tempdir().unwrap();

        let mut config = base_config(target.path().to_path_buf(), source.path().to_path_buf());
        config.collect.as_mut().unwrap().collect_mode = CollectMode::Incremental;

        execute_collect(&config, None, &PosixPlatform).unwrap();
        std::fs::remove_file(
            target
                .path()
                .join(format!("{}.tar", cedar_fs::path::normalize_archive_name(source.path()))),
        )
        .unwrap();

        execute_collect(&config, None, &PosixPlatform).unwrap();
        let tar_path = target
            .path()
            .join(format!("{}.tar", cedar_fs::path::normalize_archive_name(source.path())));
        assert!(!tar_path.exists());
    }
}
