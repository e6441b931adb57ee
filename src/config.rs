//! Already-validated configuration structs consumed by the core engine.
//!
//! Per spec, loading and validating the XML configuration document itself
//! is an external collaborator's job; these types only describe the shape
//! the core expects to receive, plus a `validate()` doing the structural
//! checks the core itself relies on (non-empty peer names, absolute
//! paths). `cback`'s binary deserializes a YAML document into these types
//! as a stand-in for that external XML loader.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{CedarError, Result};

/// Options passed down from the CLI front-end to every action
/// (spec §6 "CLI surface"): `full` forces today-only directory selection
/// and disables span-midnight/store-indicator heuristics; `quiet`
/// suppresses non-essential console output (a CLI concern, not used by
/// the core itself beyond being threaded through).
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct OptionsConfig {
    /// Forces a full backup: today-only directory selection.
    #[serde(default)]
    pub full: bool,
    /// Suppresses non-essential output.
    #[serde(default)]
    pub quiet: bool,
}

/// Whether a peer's stage failures should abort the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IgnoreFailureMode {
    /// Never ignore a stage failure for this peer.
    None,
    /// Always ignore stage failures for this peer.
    All,
    /// Ignore only on non-start-of-week days.
    Daily,
    /// Ignore only on start-of-week or full runs.
    Weekly,
}

impl IgnoreFailureMode {
    /// Whether a stage failure for this peer, on a day that either is or
    /// isn't the configured start-of-week day and either is or isn't a
    /// full run, should be demoted to a warning rather than aborting.
    pub fn should_ignore(self, today_is_start: bool, full: bool) -> bool {
        match self {
            IgnoreFailureMode::None => false,
            IgnoreFailureMode::All => true,
            IgnoreFailureMode::Daily => !today_is_start,
            IgnoreFailureMode::Weekly => today_is_start || full,
        }
    }
}

/// One configured backup peer. `remote` is `None` for a `LocalPeer`
/// (which has only a name and collect directory); `Some` makes this a
/// `RemotePeer`.
#[derive(Debug, Clone, Deserialize)]
pub struct PeerConfig {
    /// Peer name, also used as the staging subdirectory name.
    pub name: String,
    /// Absolute collect directory. For a local peer this is read
    /// directly; for a remote peer it names the directory on the remote
    /// host.
    #[serde(rename = "collect_dir")]
    pub collect_dir: PathBuf,
    /// Determines whether stage failures for this peer abort the run.
    #[serde(default = "default_ignore_failure_mode")]
    pub ignore_failure_mode: IgnoreFailureMode,
    /// Remote-only fields. `None` makes this a local peer.
    #[serde(default)]
    pub remote: Option<RemotePeerConfig>,
}

fn default_ignore_failure_mode() -> IgnoreFailureMode {
    IgnoreFailureMode::None
}

/// Remote-peer-only configuration fields.
#[derive(Debug, Clone, Deserialize)]
pub struct RemotePeerConfig {
    /// Absolute working directory on the local host used for staging
    /// temp files before/after a remote copy.
    pub working_dir: PathBuf,
    /// Remote-host username used for `user@host` addressing.
    pub remote_user: String,
    /// If set, remote-shell/remote-copy invocations are wrapped as
    /// `su - <local_user> -c "<cmd>"`, requiring the current process to
    /// be root.
    #[serde(default)]
    pub local_user: Option<String>,
    /// Remote-copy command (e.g. `scp`), without arguments.
    #[serde(default = "default_rcp_command")]
    pub rcp_command: String,
    /// Remote-shell command (e.g. `ssh`), without arguments.
    #[serde(default = "default_rsh_command")]
    pub rsh_command: String,
    /// Name of the `cback`-equivalent binary on the remote host, used by
    /// `executeManagedAction`.
    #[serde(default = "default_cback_command")]
    pub cback_command: String,
}

fn default_rcp_command() -> String {
    "scp -B -q -C".to_string()
}

fn default_rsh_command() -> String {
    "ssh".to_string()
}

fn default_cback_command() -> String {
    "cback3".to_string()
}

impl PeerConfig {
    /// Structural checks the core relies on: non-empty name, absolute
    /// collect directory, absolute remote working directory.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CedarError::usage("peer name must not be empty"));
        }
        crate::command::require_absolute(&self.collect_dir)?;
        if let Some(remote) = &self.remote {
            crate::command::require_absolute(&remote.working_dir)?;
            if remote.remote_user.trim().is_empty() {
                return Err(CedarError::usage(format!(
                    "peer [{}]: remote_user must not be empty",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// One configured collect source directory.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectDirConfig {
    /// Absolute path to collect from.
    pub abs_path: PathBuf,
    /// Glob/regex patterns excluded from this source in addition to the
    /// collect-level exclusions.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

/// `collect` action configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectConfig {
    /// Absolute working directory collect archives are written under.
    pub target_dir: PathBuf,
    /// Whether this is an incremental (digest-based) or full daily
    /// collect.
    #[serde(default)]
    pub collect_mode: CollectMode,
    /// Tar archive compression mode.
    #[serde(default)]
    pub archive_mode: ArchiveMode,
    /// If a directory contains a file with this name, it and its subtree
    /// are excluded.
    #[serde(default)]
    pub ignore_file: Option<String>,
    /// Source directories to walk.
    pub collect_dirs: Vec<CollectDirConfig>,
}

/// Tar archive compression applied by `collect` (spec §6 "Tar archive
/// format").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveMode {
    /// Uncompressed GNU tar.
    #[default]
    Tar,
    /// Gzip-compressed GNU tar.
    TarGz,
    /// Bzip2-compressed GNU tar.
    TarBz2,
}

impl From<ArchiveMode> for cedar_fs::TarMode {
    fn from(mode: ArchiveMode) -> Self {
        match mode {
            ArchiveMode::Tar => cedar_fs::TarMode::Tar,
            ArchiveMode::TarGz => cedar_fs::TarMode::TarGz,
            ArchiveMode::TarBz2 => cedar_fs::TarMode::TarBz2,
        }
    }
}

/// Whether `collect` compares against a stored digest to skip unchanged
/// files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectMode {
    /// Always collect every configured file.
    #[default]
    Daily,
    /// Skip files whose digest is unchanged since the prior run.
    Incremental,
}

impl CollectConfig {
    /// Structural checks: absolute target directory, absolute source
    /// directories, at least one configured source.
    pub fn validate(&self) -> Result<()> {
        crate::command::require_absolute(&self.target_dir)?;
        if self.collect_dirs.is_empty() {
            return Err(CedarError::usage("collect: no collect directories configured"));
        }
        for dir in &self.collect_dirs {
            crate::command::require_absolute(&dir.abs_path)?;
        }
        Ok(())
    }
}

/// `stage` action configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StageConfig {
    /// Absolute directory staged peer subdirectories are written under.
    pub target_dir: PathBuf,
    /// Peers to stage. If absent, the top-level peer list is used
    /// instead.
    #[serde(default)]
    pub peers: Option<Vec<PeerConfig>>,
    /// Emit a warning when the selected staging directory is not today's
    /// (the cross-midnight case).
    #[serde(default)]
    pub warn_midnite: bool,
}

impl StageConfig {
    /// Structural checks: absolute target directory, each configured
    /// peer individually valid.
    pub fn validate(&self) -> Result<()> {
        crate::command::require_absolute(&self.target_dir)?;
        if let Some(peers) = &self.peers {
            for peer in peers {
                peer.validate()?;
            }
        }
        Ok(())
    }
}

/// Daily/weekly blank-safe policy for a rewritable disc (spec §4.4).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BlankBehavior {
    /// Whether the ratio check runs every day or only on the
    /// start-of-week day.
    pub mode: BlankMode,
    /// Threshold: `available / (1 + required) <= factor` triggers a
    /// blank-and-rewrite.
    pub factor: f64,
}

/// [`BlankBehavior::mode`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlankMode {
    /// Run the ratio check every day.
    Daily,
    /// Run the ratio check only on the configured start-of-week day.
    Weekly,
}

/// Optical media family and geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    /// 74-minute CD-R, 650 MB.
    Cdr74,
    /// 80-minute CD-R, 700 MB.
    Cdr80,
    /// 74-minute CD-RW, 650 MB.
    Cdrw74,
    /// 80-minute CD-RW, 700 MB.
    Cdrw80,
    /// DVD+R, 4.4 "true" GB.
    DvdPlusR,
    /// DVD+RW, 4.4 "true" GB.
    DvdPlusRw,
}

impl MediaType {
    /// `true` for the two rewritable variants.
    pub fn is_rewritable(self) -> bool {
        matches!(self, MediaType::Cdrw74 | MediaType::Cdrw80 | MediaType::DvdPlusRw)
    }

    /// `true` for the two DVD variants.
    pub fn is_dvd(self) -> bool {
        matches!(self, MediaType::DvdPlusR | MediaType::DvdPlusRw)
    }
}

/// Media- and device-related settings for `store`/`rebuild`.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    /// Optical media family.
    pub media_type: MediaType,
    /// Device special file (e.g. `/dev/sr0`).
    pub device_path: PathBuf,
    /// SCSI device id/bus target, when required by the underlying tool.
    #[serde(default)]
    pub scsi_id: Option<String>,
    /// Write speed passed through to the image tool.
    #[serde(default)]
    pub drive_speed: Option<u32>,
    /// If `false`, tray/eject handshakes are skipped entirely (drive has
    /// no tray, e.g. a slot-loader or a disc changer operated externally).
    #[serde(default = "default_true")]
    pub eject_enabled: bool,
    /// Seconds to wait after opening the tray.
    #[serde(default = "default_eject_delay")]
    pub eject_delay_secs: u64,
    /// Seconds to wait after a full open/close/unlock cycle.
    #[serde(default = "default_refresh_delay")]
    pub refresh_media_delay_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_eject_delay() -> u64 {
    5
}

fn default_refresh_delay() -> u64 {
    15
}

/// `store`/`rebuild` action configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Absolute directory holding the dated staging directories read by
    /// `store`/`rebuild`.
    pub source_dir: PathBuf,
    /// Media and device settings.
    pub media: MediaConfig,
    /// Blank-safe policy for rewritable media; `None` means "blank only
    /// on the start-of-week day".
    #[serde(default)]
    pub blank_behavior: Option<BlankBehavior>,
    /// Whether to mount the written disc and compare its content digest
    /// against the staging directory after writing.
    #[serde(default)]
    pub check_data: bool,
    /// Emit a warning when the staging directory store selects a
    /// non-today directory.
    #[serde(default)]
    pub warn_midnite: bool,
    /// Configured start-of-week day (0 = Monday .. 6 = Sunday), used by
    /// the blank-safe policy and rebuild's span calculation.
    #[serde(default)]
    pub start_day: u8,
}

impl StoreConfig {
    /// Structural checks: absolute source and device paths, start day in
    /// range.
    pub fn validate(&self) -> Result<()> {
        crate::command::require_absolute(&self.source_dir)?;
        crate::command::require_absolute(&self.media.device_path)?;
        if self.start_day > 6 {
            return Err(CedarError::usage("store: start_day must be 0..=6"));
        }
        Ok(())
    }
}

/// One configured purge target.
#[derive(Debug, Clone, Deserialize)]
pub struct PurgeDirConfig {
    /// Absolute directory to purge.
    pub abs_path: PathBuf,
    /// Minimum age, in whole days, an entry must reach before it is
    /// eligible for deletion.
    pub retain_days: i64,
}

/// `purge` action configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PurgeConfig {
    /// Directories to purge.
    pub purge_dirs: Vec<PurgeDirConfig>,
}

impl PurgeConfig {
    /// Structural checks: absolute paths, non-negative retention.
    pub fn validate(&self) -> Result<()> {
        for dir in &self.purge_dirs {
            crate::command::require_absolute(&dir.abs_path)?;
            if dir.retain_days < 0 {
                return Err(CedarError::usage(format!(
                    "purge dir [{}]: retain_days must be >= 0",
                    dir.abs_path.display()
                )));
            }
        }
        Ok(())
    }
}

/// The complete already-validated configuration document consumed by the
/// core. Any section the caller's run doesn't need may be absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Absolute working directory used for temp mountpoints and similar
    /// run-scoped scratch space.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// User/group that indicator files and staged content are chowned to
    /// when running as root.
    #[serde(default)]
    pub backup_user: Option<String>,
    /// See `backup_user`.
    #[serde(default)]
    pub backup_group: Option<String>,
    /// Top-level peer list, used by `stage` when `stage.peers` is absent.
    #[serde(default)]
    pub peers: Option<Vec<PeerConfig>>,
    /// `collect` action configuration.
    #[serde(default)]
    pub collect: Option<CollectConfig>,
    /// `stage` action configuration.
    #[serde(default)]
    pub stage: Option<StageConfig>,
    /// `store` action configuration.
    #[serde(default)]
    pub store: Option<StoreConfig>,
    /// `purge` action configuration.
    #[serde(default)]
    pub purge: Option<PurgeConfig>,
}

impl Config {
    /// Validates every present section; absent optional sections are not
    /// an error here (an action that needs one will report its own
    /// missing-section usage error when it runs).
    pub fn validate(&self) -> Result<()> {
        if let Some(peers) = &self.peers {
            for peer in peers {
                peer.validate()?;
            }
        }
        if let Some(collect) = &self.collect {
            collect.validate()?;
        }
        if let Some(stage) = &self.stage {
            stage.validate()?;
        }
        if let Some(store) = &self.store {
            store.validate()?;
        }
        if let Some(purge) = &self.purge {
            purge.validate()?;
        }
        Ok(())
    }

    /// Parses a YAML document into a [`Config`] and validates it.
    pub fn from_yaml_str(input: &str) -> Result<Config> {
        let config: Config = serde_yaml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignore_failure_mode_semantics() {
        assert!(!IgnoreFailureMode::None.should_ignore(true, true));
        assert!(IgnoreFailureMode::All.should_ignore(false, false));
        assert!(IgnoreFailureMode::Daily.should_ignore(false, false));
        assert!(!IgnoreFailureMode::Daily.should_ignore(true, false));
        assert!(IgnoreFailureMode::Weekly.should_ignore(true, false));
        assert!(IgnoreFailureMode::Weekly.should_ignore(false, true));
        assert!(!IgnoreFailureMode::Weekly.should_ignore(false, false));
    }

    #[test]
    fn peer_config_rejects_relative_collect_dir() {
        let peer = PeerConfig {
            name: "x".to_string(),
            collect_dir: PathBuf::from("relative/path"),
            ignore_failure_mode: IgnoreFailureMode::None,
            remote: None,
        };
        assert!(peer.validate().is_err());
    }

    #[test]
    fn peer_config_rejects_empty_name() {
        let peer = PeerConfig {
            name: String::new(),
            collect_dir: PathBuf::from("/abs"),
            ignore_failure_mode: IgnoreFailureMode::None,
            remote: None,
        };
        assert!(peer.validate().is_err());
    }

    #[test]
    fn media_type_classification() {
        assert!(MediaType::Cdrw74.is_rewritable());
        assert!(!MediaType::Cdr74.is_rewritable());
        assert!(MediaType::DvdPlusR.is_dvd());
        assert!(!MediaType::Cdr74.is_dvd());
    }

    #[test]
    fn full_document_parses_and_validates() {
        let yaml = r#"
working_dir: /var/cedar
backup_user: backup
backup_group: backup
peers:
  - name: peer1
    collect_dir: /peer1/collect
collect:
  target_dir: /var/cedar/collect
  collect_dirs:
    - abs_path: /etc
stage:
  target_dir: /var/cedar/stage
store:
  source_dir: /var/cedar/stage
  media:
    media_type: dvd_plus_rw
    device_path: /dev/sr0
purge:
  purge_dirs:
    - abs_path: /var/cedar/stage
      retain_days: 7
"#;
        let config = Config::from_yaml_str(yaml).unwrap();
        assert_eq!(config.peers.unwrap().len(), 1);
        assert!(config.store.unwrap().media.media_type.is_dvd());
    }

    #[test]
    fn rejects_relative_collect_target_dir() {
        let yaml = r#"
collect:
  target_dir: relative/dir
  collect_dirs:
    - abs_path: /etc
"#;
        assert!(Config::from_yaml_str(yaml).is_err());
    }
}
