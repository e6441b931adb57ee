//! The `stage` action: copies each configured peer's collect output into
//! today's dated staging directory.

use chrono::{Datelike, NaiveDate};

use crate::config::{Config, IgnoreFailureMode, OptionsConfig, PeerConfig};
use crate::error::{CedarError, Result};
use crate::indicator::{self, STAGE_INDICATOR};
use crate::peer::{LocalPeer, Peer, RemotePeer};
use crate::platform::Platform;

use super::{dated_path, ensure_dir, resolve_ownership, today_is_start_of_week};

fn build_peer(config: &PeerConfig) -> Box<dyn Peer> {
    match &config.remote {
        None => Box::new(LocalPeer::new(config.name.clone(), config.collect_dir.clone())),
        Some(remote) => Box::new(RemotePeer::new(
            config.name.clone(),
            config.collect_dir.clone(),
            remote.working_dir.clone(),
            remote.remote_user.clone(),
            remote.local_user.clone(),
            remote.rcp_command.clone(),
            remote.rsh_command.clone(),
            remote.cback_command.clone(),
        )),
    }
}

/// Runs the `stage` action for `today`. Per-peer copy failures are
/// logged and do not abort the run unless `ignore_failure_mode` says
/// they must.
pub fn execute_stage(config: &Config, options: &OptionsConfig, platform: &dyn Platform, today: NaiveDate) -> Result<()> {
    let stage = config
        .stage
        .as_ref()
        .ok_or_else(|| CedarError::usage("stage: no [stage] configuration section present"))?;

    let peer_configs = stage
        .peers
        .as_ref()
        .or(config.peers.as_ref())
        .ok_or_else(|| CedarError::usage("stage: no peers configured (neither [stage.peers] nor [peers])"))?;

    if peer_configs.is_empty() {
        return Err(CedarError::usage("stage: configured peer list is empty"));
    }

    let ownership = resolve_ownership(config, platform)?;
    let dated_dir = dated_path(&stage.target_dir, today);
    ensure_dir(&dated_dir, ownership, platform)?;

    let today_is_start = today_is_start_of_week(config, today);
    let mut staged_any = false;

    for peer_config in peer_configs {
        let peer = build_peer(peer_config);
        let peer_dir = dated_dir.join(peer.name());
        ensure_dir(&peer_dir, ownership, platform)?;

        if !peer.check_collect_indicator(None) {
            let ignored = peer_config
                .ignore_failure_mode
                .should_ignore(today_is_start, options.full);
            if ignored {
                log::info!("Peer [{}] has no collect indicator; ignored per configuration.", peer.name());
            } else {
                log::error!("Peer [{}] has no collect indicator; skipping.", peer.name());
            }
            continue;
        }

        match peer.stage_peer(&peer_dir, ownership, None, platform) {
            Ok(count) => {
                log::info!("Staged {count} file(s) from peer [{}].", peer.name());
                if let Err(e) = peer.write_stage_indicator(None, ownership, None, platform) {
                    log::error!("Failed to write stage indicator for peer [{}]: {e}", peer.name());
                } else {
                    staged_any = true;
                }
            }
            Err(e) => {
                if peer_config
                    .ignore_failure_mode
                    .should_ignore(today_is_start, options.full)
                {
                    log::warn!("Stage of peer [{}] failed (ignored): {e}", peer.name());
                } else {
                    log::error!("Stage of peer [{}] failed: {e}", peer.name());
                }
            }
        }
    }

    if !staged_any {
        return Err(CedarError::io("stage: no peer was staged successfully"));
    }

    indicator::write(&dated_dir, None, STAGE_INDICATOR, Some(platform), ownership)?;
    log::info!("Executed stage successfully.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StageConfig;
    use crate::platform::PosixPlatform;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 7, 31).unwrap()
    }

    #[test]
    fn stage_copies_from_local_peer_and_writes_indicators() {
        let collect = tempfile::tempdir().unwrap();
        std::fs::write(collect.path().join("a.tar"), b"a").unwrap();
        let target = tempfile::tempdir().unwrap();
        indicator::write(collect.path(), None, crate::indicator::COLLECT_INDICATOR, None, None).unwrap();

        let mut config = Config::default();
        config.peers = Some(vec![PeerConfig {
            name: "host1".to_string(),
            collect_dir: collect.path().to_path_buf(),
            ignore_failure_mode: IgnoreFailureMode::None,
            remote: None,
        }]);
        config.stage = Some(StageConfig {
            target_dir: target.path().to_path_buf(),
            peers: None,
            warn_midnite: false,
        });

        let options = OptionsConfig::default();
        execute_stage(&config, &options, &PosixPlatform, today()).unwrap();

        let dated = dated_path(target.path(), today());
        assert!(dated.join("host1").join("a.tar").exists());
        assert!(indicator::exists(&dated, None, STAGE_INDICATOR));
        assert!(indicator::exists(collect.path(), None, STAGE_INDICATOR));
    }

    #[test]
    fn stage_fails_without_any_peers() {
        let target = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.stage = Some(StageConfig {
            target_dir: target.path().to_path_buf(),
            peers: None,
            warn_midnite: false,
        });
        let options = OptionsConfig::default();
        assert!(execute_stage(&config, &options, &PosixPlatform, today()).is_err());
    }

    #[test]
    fn stage_skips_peer_missing_collect_indicator() {
        let collect = tempfile::tempdir().unwrap();
        std::fs::write(collect.path().join("a.tar"), b"a").unwrap();
        let target = tempfile::tempdir().unwrap();

        let mut config = Config::default();
        config.peers = Some(vec![PeerConfig {
            name: "host1".to_string(),
            collect_dir: collect.path().to_path_buf(),
            ignore_failure_mode: IgnoreFailureMode::None,
            remote: None,
        }]);
        config.stage = Some(StageConfig {
            target_dir: target.path().to_path_buf(),
            peers: None,
            warn_midnite: false,
        });

        let options = OptionsConfig::default();
        let result = execute_stage(&config, &options, &PosixPlatform, today());
        assert!(result.is_err());
        let dated = dated_path(target.path(), today());
        assert!(!dated.join("host1").join("a.tar").exists());
    }
}
