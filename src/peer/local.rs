use std::path::{Path, PathBuf};

use crate::error::{CedarError, Result};
use crate::indicator::{self, COLLECT_INDICATOR, STAGE_INDICATOR};
use crate::platform::Platform;

use super::{apply_ownership, list_entry_names, Peer};

/// A peer reachable as a plain local directory: the collect directory is
/// simply read and copied, no remote shell or remote copy involved.
#[derive(Debug, Clone)]
pub struct LocalPeer {
    /// Peer name, also the staging subdirectory name.
    pub name: String,
    /// Absolute collect directory read directly off the local filesystem.
    pub collect_dir: PathBuf,
}

impl LocalPeer {
    /// Creates a local peer over `collect_dir`, which need not exist yet.
    pub fn new(name: impl Into<String>, collect_dir: PathBuf) -> Self {
        LocalPeer {
            name: name.into(),
            collect_dir,
        }
    }
}

impl Peer for LocalPeer {
    fn name(&self) -> &str {
        &self.name
    }

    fn stage_peer(
        &self,
        target_dir: &Path,
        ownership: Option<(u32, u32)>,
        permissions: Option<u32>,
        platform: &dyn Platform,
    ) -> Result<usize> {
        let mut copied = Vec::new();
        let entries = std::fs::read_dir(&self.collect_dir).map_err(|e| {
            CedarError::io(format!(
                "failed to read collect directory [{}]: {e}",
                self.collect_dir.display()
            ))
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| CedarError::io(format!("failed to read directory entry: {e}")))?;
            let file_type = entry
                .file_type()
                .map_err(|e| CedarError::io(format!("failed to stat [{}]: {e}", entry.path().display())))?;
            if !file_type.is_file() {
                continue;
            }
            let dest = target_dir.join(entry.file_name());
            std::fs::copy(entry.path(), &dest)
                .map_err(|e| CedarError::io(format!("failed to copy [{}]: {e}", entry.path().display())))?;
            copied.push(PathBuf::from(entry.file_name()));
        }

        if copied.is_empty() {
            return Err(CedarError::io(format!(
                "no files copied from peer [{}] at [{}]",
                self.name,
                self.collect_dir.display()
            )));
        }

        apply_ownership(target_dir, &copied, ownership, permissions, platform)?;
        log::info!("Staged {} file(s) from local peer [{}].", copied.len(), self.name);
        Ok(copied.len())
    }

    fn check_collect_indicator(&self, name: Option<&str>) -> bool {
        indicator::exists(&self.collect_dir, name, COLLECT_INDICATOR)
    }

    fn write_stage_indicator(
        &self,
        name: Option<&str>,
        ownership: Option<(u32, u32)>,
        permissions: Option<u32>,
        platform: &dyn Platform,
    ) -> Result<()> {
        indicator::write(&self.collect_dir, name, STAGE_INDICATOR, None, None)?;
        let indicator_name = PathBuf::from(name.unwrap_or(STAGE_INDICATOR));
        apply_ownership(&self.collect_dir, &[indicator_name], ownership, permissions, platform)
    }
}
