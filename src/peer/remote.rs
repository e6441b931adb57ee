use std::path::{Path, PathBuf};

use crate::command::{wrap_su, CommandOutput, CommandRunner};
use crate::error::{CedarError, Result};
use crate::indicator::{COLLECT_INDICATOR, STAGE_INDICATOR};
use crate::platform::Platform;

use super::{apply_ownership, list_entry_names, Peer};

/// A peer reachable over a remote shell and remote-copy tool (`ssh`/`scp`
/// by default). The peer's `name` doubles as the remote host in
/// `user@host` addressing, matching how staging subdirectories are named
/// after the peer.
#[derive(Debug, Clone)]
pub struct RemotePeer {
    /// Peer name, also the remote host and the staging subdirectory name.
    pub name: String,
    /// Collect directory on the remote host.
    pub collect_dir: PathBuf,
    /// Local working directory used to stage temp files before/after a
    /// remote copy.
    pub working_dir: PathBuf,
    /// Remote-host username used for `user@host` addressing.
    pub remote_user: String,
    /// If set, every remote-shell/remote-copy invocation is wrapped as
    /// `su - <local_user> -c "..."`, which requires the current process
    /// to be root.
    pub local_user: Option<String>,
    /// Remote-copy command (e.g. `scp -B -q -C`).
    pub rcp_command: String,
    /// Remote-shell command (e.g. `ssh`).
    pub rsh_command: String,
    /// Name of the `cback`-equivalent binary on the remote host.
    pub cback_command: String,
    runner: CommandRunner,
}

impl RemotePeer {
    /// Creates a remote peer. `collect_dir` and `working_dir` are taken
    /// as-is (no existence check; the remote directory in particular
    /// can't be checked locally anyway).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        collect_dir: PathBuf,
        working_dir: PathBuf,
        remote_user: impl Into<String>,
        local_user: Option<String>,
        rcp_command: impl Into<String>,
        rsh_command: impl Into<String>,
        cback_command: impl Into<String>,
    ) -> Self {
        RemotePeer {
            name: name.into(),
            collect_dir,
            working_dir,
            remote_user: remote_user.into(),
            local_user,
            rcp_command: rcp_command.into(),
            rsh_command: rsh_command.into(),
            cback_command: cback_command.into(),
            runner: CommandRunner::new(),
        }
    }

    fn address(&self) -> String {
        format!("{}@{}", self.remote_user, self.name)
    }

    fn require_root_if_su(&self) -> Result<()> {
        if self.local_user.is_some() && !crate::command::is_running_as_root() {
            return Err(CedarError::usage(
                "a local_user is configured but the current process is not root",
            ));
        }
        Ok(())
    }

    fn run_line(&self, line: &str) -> Result<CommandOutput> {
        let wrapped = wrap_su(line, self.local_user.as_deref());
        self.runner.run("sh", &["-c", &wrapped], false)
    }

    /// Runs `command` on the remote host via the configured remote
    /// shell.
    pub fn execute_remote_command(&self, command: &str) -> Result<()> {
        self.require_root_if_su()?;
        let line = format!("{} {} '{}'", self.rsh_command, self.address(), command.replace('\'', "'\\''"));
        let out = self.run_line(&line)?;
        if !out.success() {
            return Err(CedarError::io(format!(
                "remote command on [{}] failed: {}",
                self.name, out.output
            )));
        }
        Ok(())
    }

    /// Runs the configured `cback`-equivalent binary on the remote host,
    /// passing `--full` iff `full_backup` is set.
    pub fn execute_managed_action(&self, action: &str, full_backup: bool) -> Result<()> {
        let command = if full_backup {
            format!("{} {action} --full", self.cback_command)
        } else {
            format!("{} {action}", self.cback_command)
        };
        self.execute_remote_command(&command)
    }
}

impl Peer for RemotePeer {
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
        self.require_root_if_su()?;

        let before = list_entry_names(target_dir);

        let source = format!("{}:{}/*", self.address(), self.collect_dir.display());
        let line = format!("{} {} {}", self.rcp_command, source, target_dir.display());
        let out = self.run_line(&line)?;
        if !out.success() {
            return Err(CedarError::io(format!(
                "remote copy from peer [{}] failed: {}",
                self.name, out.output
            )));
        }

        let after = list_entry_names(target_dir);
        let copied: Vec<PathBuf> = after.into_iter().filter(|entry| !before.contains(entry)).collect();

        if copied.is_empty() {
            return Err(CedarError::io(format!(
                "no files copied from remote peer [{}]",
                self.name
            )));
        }

        apply_ownership(target_dir, &copied, ownership, permissions, platform)?;
        log::info!("Staged {} file(s) from remote peer [{}].", copied.len(), self.name);
        Ok(copied.len())
    }

    fn check_collect_indicator(&self, name: Option<&str>) -> bool {
        let indicator_name = name.unwrap_or(COLLECT_INDICATOR);
        let source = format!("{}:{}/{}", self.address(), self.collect_dir.display(), indicator_name);
        let line = format!("{} {} {}", self.rcp_command, source, self.working_dir.display());

        let result = self.run_line(&line);
        let arrived = self.working_dir.join(indicator_name).exists();
        let _ = std::fs::remove_file(self.working_dir.join(indicator_name));

        match result {
            Ok(out) => out.success() && arrived,
            Err(_) => false,
        }
    }

    fn write_stage_indicator(
        &self,
        name: Option<&str>,
        _ownership: Option<(u32, u32)>,
        _permissions: Option<u32>,
        _platform: &dyn Platform,
    ) -> Result<()> {
        // Ownership/permissions are meaningful only on the local
        // filesystem; applying them to a file that lives on the remote
        // host would need its own remote-shell call, which the original
        // remote peer's indicator write does not attempt either.
        let indicator_name = name.unwrap_or(STAGE_INDICATOR);
        let temp_path = self.working_dir.join(indicator_name);
        std::fs::File::create(&temp_path)
            .map_err(|e| CedarError::io(format!("failed to create temp indicator [{}]: {e}", temp_path.display())))?;

        let dest = format!("{}:{}/{}", self.address(), self.collect_dir.display(), indicator_name);
        let line = format!("{} {} {}", self.rcp_command, temp_path.display(), dest);
        let out = self.run_line(&line);

        let _ = std::fs::remove_file(&temp_path);

        match out {
            Ok(out) if out.success() => Ok(()),
            Ok(out) => Err(CedarError::io(format!(
                "failed to push stage indicator to peer [{}]: {}",
                self.name, out.output
            ))),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(local_user: Option<&str>) -> RemotePeer {
        RemotePeer::new(
            "host1",
            PathBuf::from("/remote/collect"),
            PathBuf::from("/tmp/cedar-working"),
            "backup",
            local_user.map(str::to_string),
            "scp -B -q -C",
            "ssh",
            "cback3",
        )
    }

    #[test]
    fn address_combines_user_and_name() {
        assert_eq!(peer(None).address(), "backup@host1");
    }

    #[test]
    fn requires_root_when_local_user_set() {
        let p = peer(Some("other"));
        // Running as non-root in the test harness, so this should fail
        // rather than silently proceed.
        if !crate::command::is_running_as_root() {
            assert!(p.require_root_if_su().is_err());
        }
    }

    #[test]
    fn no_local_user_does_not_require_root() {
        assert!(peer(None).require_root_if_su().is_ok());
    }

    #[test]
    fn execute_managed_action_formats_full_flag() {
        // We can't invoke the real rsh here without a remote host; this
        // just documents the expected command line shape.
        let p = peer(None);
        assert_eq!(format!("{} stage --full", p.cback_command), "cback3 stage --full");
        assert_eq!(format!("{} stage", p.cback_command), "cback3 stage");
    }
}
