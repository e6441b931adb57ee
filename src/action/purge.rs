//! The `purge` action: deletes old-enough files out of each configured
//! directory, then cleans up any directories left empty.

use cedar_fs::PurgeItemList;

use crate::config::Config;
use crate::error::{CedarError, Result};

/// Runs the `purge` action over every configured purge directory.
pub fn execute_purge(config: &Config) -> Result<()> {
    let purge = config
        .purge
        .as_ref()
        .ok_or_else(|| CedarError::usage("purge: no [purge] configuration section present"))?;

    for dir_config in &purge.purge_dirs {
        if !dir_config.abs_path.exists() {
            log::warn!("Purge directory [{}] does not exist; skipping.", dir_config.abs_path.display());
            continue;
        }

        let mut list = PurgeItemList::new();
        list.add_dir_contents(&dir_config.abs_path, true, 0, false)?;

        let discarded = list.remove_young_files(dir_config.retain_days)?;
        let (files_removed, dirs_removed) = list.purge_items();

        log::info!(
            "Purged [{}]: {files_removed} file(s), {dirs_removed} director{plural} removed, {discarded} not yet old enough.",
            dir_config.abs_path.display(),
            plural = if dirs_removed == 1 { "y" } else { "ies" },
        );
    }

    log::info!("Executed purge successfully.");
    Ok(())
}
