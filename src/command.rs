//! Sanitized subprocess execution.
//!
//! Every external tool invocation (image tool, rcp/rsh, mount/umount,
//! eject, blank) goes through [`CommandRunner`] so environment sanitizing
//! and output capture happen exactly once, in exactly one place.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::{CedarError, Result};

/// Result of running one external command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Process exit status code, if the process terminated normally.
    pub status: Option<i32>,
    /// Captured output, combined stdout+stderr (or stdout-only when the
    /// command was run with `ignore_stderr`), line-buffered.
    pub output: String,
}

impl CommandOutput {
    /// `true` if the process exited with status 0.
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Runs external commands with a sanitized environment and captures their
/// output line by line, optionally teeing it to a file.
#[derive(Debug, Default, Clone)]
pub struct CommandRunner {
    tee_path: Option<std::path::PathBuf>,
}

impl CommandRunner {
    /// Creates a runner with no output tee file configured.
    pub fn new() -> Self {
        CommandRunner::default()
    }

    /// Every subsequent [`CommandRunner::run`] call additionally appends
    /// its captured output to `path`.
    pub fn with_tee(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.tee_path = Some(path.into());
        self
    }

    /// Runs `command arg0 arg1 ...` with a sanitized environment (every
    /// `LC_*` variable cleared, `LANG` forced to `C`), capturing combined
    /// stdout+stderr unless `ignore_stderr` is set, in which case only
    /// stdout is captured.
    ///
    /// This never itself treats a non-zero exit as an error: callers
    /// decide, since some tools (blank, eject) are retried by the caller
    /// on failure.
    pub fn run(&self, command: &str, args: &[&str], ignore_stderr: bool) -> Result<CommandOutput> {
        let mut cmd = Command::new(command);
        cmd.args(args);
        sanitize_environment(&mut cmd);

        cmd.stdout(Stdio::piped());
        cmd.stderr(if ignore_stderr {
            Stdio::null()
        } else {
            Stdio::piped()
        });

        log::debug!("Executing command: {command} {}", args.join(" "));

        let child_output = cmd
            .output()
            .map_err(|e| CedarError::io(format!("failed to execute [{command}]: {e}")))?;

        let mut combined = String::from_utf8_lossy(&child_output.stdout).into_owned();
        if !ignore_stderr {
            combined.push_str(&String::from_utf8_lossy(&child_output.stderr));
        }

        self.tee(&combined)?;

        for line in combined.lines() {
            log::debug!("[{command}] {line}");
        }

        Ok(CommandOutput {
            status: child_output.status.code(),
            output: combined,
        })
    }

    fn tee(&self, combined: &str) -> Result<()> {
        if let Some(path) = &self.tee_path {
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| CedarError::io(format!("failed to open tee file [{}]: {e}", path.display())))?;
            file.write_all(combined.as_bytes())
                .map_err(|e| CedarError::io(format!("failed to write tee file [{}]: {e}", path.display())))?;
        }
        Ok(())
    }
}

/// Clears every `LC_*` environment variable and forces `LANG=C` on `cmd`,
/// so parsed tool output (capability probes, session boundaries) is
/// stable across locales.
fn sanitize_environment(cmd: &mut Command) {
    for (key, _) in std::env::vars() {
        if key.starts_with("LC_") {
            cmd.env_remove(key);
        }
    }
    cmd.env("LANG", "C");
}

/// `true` if the effective user is root. Used to gate ownership changes
/// and `su -` wrapping of remote-peer commands.
pub fn is_running_as_root() -> bool {
    #[cfg(unix)]
    {
        nix::unistd::Uid::effective().is_root()
    }
    #[cfg(not(unix))]
    {
        false
    }
}

/// Wraps `command` as `su - <user> -c "<command>"` when `user` is set.
pub fn wrap_su(command: &str, user: Option<&str>) -> String {
    match user {
        Some(user) => format!("su - {user} -c \"{}\"", command.replace('"', "\\\"")),
        None => command.to_string(),
    }
}

/// Absolute path check used by several config validators and by `IsoImage`.
pub fn require_absolute(path: &Path) -> Result<()> {
    if path.is_absolute() {
        Ok(())
    } else {
        Err(CedarError::usage(format!(
            "path must be absolute: [{}]",
            path.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_captures_stdout() {
        let runner = CommandRunner::new();
        let out = runner.run("echo", &["hello"], false).unwrap();
        assert!(out.success());
        assert_eq!(out.output.trim(), "hello");
    }

    #[test]
    fn run_reports_nonzero_exit() {
        let runner = CommandRunner::new();
        let out = runner.run("false", &[], false).unwrap();
        assert!(!out.success());
    }

    #[test]
    fn run_fails_for_missing_binary() {
        let runner = CommandRunner::new();
        assert!(runner.run("definitely-not-a-real-binary", &[], false).is_err());
    }

    #[test]
    fn tee_appends_output_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let tee_path = dir.path().join("tee.log");
        let runner = CommandRunner::new().with_tee(&tee_path);
        runner.run("echo", &["one"], false).unwrap();
        runner.run("echo", &["two"], false).unwrap();

        let content = std::fs::read_to_string(&tee_path).unwrap();
        assert!(content.contains("one"));
        assert!(content.contains("two"));
    }

    #[test]
    fn wrap_su_wraps_command() {
        assert_eq!(wrap_su("ls -l", Some("backup")), "su - backup -c \"ls -l\"");
        assert_eq!(wrap_su("ls -l", None), "ls -l");
    }

    #[test]
    fn require_absolute_rejects_relative() {
        assert!(require_absolute(Path::new("relative")).is_err());
        assert!(require_absolute(Path::new("/absolute")).is_ok());
    }
}
