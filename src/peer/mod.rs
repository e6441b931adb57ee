//! Peer abstraction: a uniform interface over [`local::LocalPeer`]
//! (plain filesystem copy) and [`remote::RemotePeer`] (remote-shell +
//! remote-copy), used by the stage action to gather collect output from
//! every configured host.

mod local;
mod remote;

pub use local::LocalPeer;
pub use remote::RemotePeer;

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::platform::Platform;

pub use crate::config::IgnoreFailureMode;

/// Common surface both peer kinds expose to the stage/store actions.
pub trait Peer {
    /// Peer name, also the staging subdirectory name.
    fn name(&self) -> &str;

    /// Copies every file out of the peer's collect directory into
    /// `target_dir`, returning the count copied. An I/O error if zero
    /// files were copied.
    fn stage_peer(
        &self,
        target_dir: &Path,
        ownership: Option<(u32, u32)>,
        permissions: Option<u32>,
        platform: &dyn Platform,
    ) -> Result<usize>;

    /// Whether this peer's collect indicator is present, i.e. whether it
    /// is ready to be staged.
    fn check_collect_indicator(&self, name: Option<&str>) -> bool;

    /// Writes the stage indicator into the peer's collect directory,
    /// marking it consumed for this run. `ownership`/`permissions` are
    /// applied to the indicator file where the peer kind supports it
    /// (a local peer's indicator lives on this host's filesystem; a
    /// remote peer's does not, so it ignores both).
    fn write_stage_indicator(
        &self,
        name: Option<&str>,
        ownership: Option<(u32, u32)>,
        permissions: Option<u32>,
        platform: &dyn Platform,
    ) -> Result<()>;
}

/// Applies `ownership`/`permissions` to every path under `dir`
/// (non-recursive listing is enough here: peers only ever copy a flat
/// set of per-source archives plus the indicator file into one
/// directory).
pub(crate) fn apply_ownership(
    dir: &Path,
    entries: &[PathBuf],
    ownership: Option<(u32, u32)>,
    permissions: Option<u32>,
    platform: &dyn Platform,
) -> Result<()> {
    for entry in entries {
        let path = dir.join(entry);
        if let Some((uid, gid)) = ownership {
            if platform.is_running_as_root() {
                platform.chown(&path, uid, gid)?;
            }
        }
        if let Some(mode) = permissions {
            set_permissions(&path, mode)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|e| crate::error::CedarError::io(format!("failed to chmod [{}]: {e}", path.display())))
}

#[cfg(not(unix))]
fn set_permissions(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

/// Names of the entries directly inside `dir`, used both by
/// `LocalPeer::stage_peer` (to count what was copied) and by
/// `RemotePeer::stage_peer` (to diff before/after listings, since the
/// remote-copy tool doesn't report what it actually wrote).
pub(crate) fn list_entry_names(dir: &Path) -> Vec<PathBuf> {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| PathBuf::from(e.file_name()))
            .collect(),
        Err(_) => Vec::new(),
    }
}
