//! The five stage actions (`collect`, `stage`, `store`/`rebuild`,
//! `purge`) plus the supplemented `validate` action, and the
//! action-ordering topological sort that decides what order a requested
//! set of actions runs in.

pub mod collect;
pub mod purge;
pub mod stage;
pub mod store;
pub mod validate;

use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use regex::Regex;

use cedar_fs::DirectedGraph;

use crate::error::{CedarError, Result};

/// Built-in action names, in their fixed preferred order.
pub const COLLECT: &str = "collect";
pub const STAGE: &str = "stage";
pub const STORE: &str = "store";
pub const REBUILD: &str = "rebuild";
pub const PURGE: &str = "purge";
/// Supplemented action (not part of the core pipeline; see
/// [`validate::validate_directories`]).
pub const VALIDATE: &str = "validate";

/// One action-ordering constraint contributed by a third-party
/// extension action (spec §4.6): it must run before every action named
/// in `before` and after every action named in `after`.
#[derive(Debug, Clone)]
pub struct ActionOrderEntry {
    /// Extension action name.
    pub name: String,
    /// Actions this one must precede.
    pub before: Vec<String>,
    /// Actions this one must follow.
    pub after: Vec<String>,
}

/// Computes a valid execution order for `requested` actions, honoring
/// the fixed built-in order `collect -> stage -> store|rebuild ->
/// purge` plus any `extensions`' before/after constraints. A cycle is a
/// configuration error.
pub fn order_actions(requested: &[String], extensions: &[ActionOrderEntry]) -> Result<Vec<String>> {
    let mut graph = DirectedGraph::new("action-order");

    let mut names: Vec<String> = requested.to_vec();
    for ext in extensions {
        if !names.contains(&ext.name) {
            names.push(ext.name.clone());
        }
    }

    for name in &names {
        graph.create_vertex(name.clone())?;
    }

    let has = |n: &str| names.iter().any(|x| x == n);

    if has(COLLECT) && has(STAGE) {
        graph.create_edge(COLLECT, STAGE)?;
    }
    if has(STAGE) && has(STORE) {
        graph.create_edge(STAGE, STORE)?;
    }
    if has(STORE) && has(PURGE) {
        graph.create_edge(STORE, PURGE)?;
    }
    if has(STAGE) && has(REBUILD) {
        graph.create_edge(STAGE, REBUILD)?;
    }
    if has(REBUILD) && has(PURGE) {
        graph.create_edge(REBUILD, PURGE)?;
    }

    for ext in extensions {
        for before in &ext.before {
            if has(before) {
                graph.create_edge(&ext.name, before)?;
            }
        }
        for after in &ext.after {
            if has(after) {
                graph.create_edge(after, &ext.name)?;
            }
        }
    }

    Ok(graph.topological_sort()?)
}

/// Builds `base/YYYY/MM/DD` for `date`.
pub(crate) fn dated_path(base: &Path, date: NaiveDate) -> PathBuf {
    base.join(format!("{:04}", date.year()))
        .join(format!("{:02}", date.month()))
        .join(format!("{:02}", date.day()))
}

/// Compiles `patterns` as full-path regexes, each anchored `^...$` per
/// the exclude-list regex policy (spec §4.1).
pub(crate) fn compile_anchored(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(&format!("^{p}$"))
                .map_err(|e| CedarError::usage(format!("invalid exclude pattern [{p}]: {e}")))
        })
        .collect()
}

/// Resolves `config.backup_user`/`backup_group` to a `(uid, gid)` pair
/// via the platform's name lookups, when both are configured.
pub(crate) fn resolve_ownership(
    config: &crate::config::Config,
    platform: &dyn crate::platform::Platform,
) -> Result<Option<(u32, u32)>> {
    match (&config.backup_user, &config.backup_group) {
        (Some(user), Some(group)) => {
            let uid = platform.lookup_uid(user)?;
            let gid = platform.lookup_gid(group)?;
            Ok(Some((uid, gid)))
        }
        _ => Ok(None),
    }
}

/// Whether `today` is the configured start-of-week day. The single
/// start-of-week notion in configuration lives on `store.start_day`;
/// absent a `[store]` section, Monday (`0`) is assumed.
pub(crate) fn today_is_start_of_week(config: &crate::config::Config, today: NaiveDate) -> bool {
    let start_day = config.store.as_ref().map(|s| s.start_day).unwrap_or(0);
    today.weekday().num_days_from_monday() as u8 == start_day
}

/// Creates `dir` (and any missing parents) if it doesn't exist yet,
/// chowning every newly created parent level (up to three, per spec
/// §4.6 step 3) when running as root and `ownership` is given.
pub(crate) fn ensure_dir(
    dir: &Path,
    ownership: Option<(u32, u32)>,
    platform: &dyn crate::platform::Platform,
) -> Result<()> {
    if dir.exists() {
        return Ok(());
    }

    let mut created = Vec::new();
    let mut current = PathBuf::new();
    for component in dir.components() {
        current.push(component);
        if !current.exists() {
            std::fs::create_dir(&current)
                .map_err(|e| CedarError::io(format!("failed to create directory [{}]: {e}", current.display())))?;
            created.push(current.clone());
        }
    }

    if let Some((uid, gid)) = ownership {
        if platform.is_running_as_root() {
            for path in created.iter().rev().take(3) {
                platform.chown(path, uid, gid)?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_order_is_linear() {
        let requested = vec![COLLECT.to_string(), STAGE.to_string(), STORE.to_string(), PURGE.to_string()];
        let order = order_actions(&requested, &[]).unwrap();
        assert_eq!(order, requested);
    }

    #[test]
    fn extension_before_after_scenario_from_spec() {
        let requested = vec![COLLECT.to_string(), STAGE.to_string(), STORE.to_string(), PURGE.to_string()];
        let extensions = vec![ActionOrderEntry {
            name: "x".to_string(),
            before: vec![PURGE.to_string()],
            after: vec![STAGE.to_string()],
        }];
        let order = order_actions(&requested, &extensions).unwrap();
        let pos = |n: &str| order.iter().position(|x| x == n).unwrap();
        assert!(pos(COLLECT) < pos(STAGE));
        assert!(pos(STAGE) < pos("x"));
        assert!(pos("x") < pos(PURGE));
    }

    #[test]
    fn rebuild_takes_stores_slot() {
        let requested = vec![STAGE.to_string(), REBUILD.to_string(), PURGE.to_string()];
        let order = order_actions(&requested, &[]).unwrap();
        assert_eq!(order, requested);
    }

    #[test]
    fn dated_path_is_zero_padded() {
        let date = NaiveDate::from_ymd_opt(2005, 2, 9).unwrap();
        let path = dated_path(Path::new("/stage"), date);
        assert_eq!(path, PathBuf::from("/stage/2005/02/09"));
    }

    #[test]
    fn anchored_patterns_compile() {
        let patterns = vec!["foo.*".to_string()];
        let compiled = compile_anchored(&patterns).unwrap();
        assert!(compiled[0].is_match("foobar"));
        assert!(!compiled[0].is_match("xfoobar"));
    }

    #[test]
    fn start_of_week_defaults_to_monday_without_store_config() {
        let config = crate::config::Config::default();
        let monday = NaiveDate::from_ymd_opt(2026, 8, 3).unwrap();
        let tuesday = NaiveDate::from_ymd_opt(2026, 8, 4).unwrap();
        assert!(today_is_start_of_week(&config, monday));
        assert!(!today_is_start_of_week(&config, tuesday));
    }

    #[test]
    fn ownership_resolves_only_when_both_user_and_group_set() {
        let platform = crate::platform::fake::FakePlatform::default();
        let mut config = crate::config::Config::default();
        assert!(resolve_ownership(&config, &platform).unwrap().is_none());
        config.backup_user = Some("alice".to_string());
        assert!(resolve_ownership(&config, &platform).unwrap().is_none());
        config.backup_group = Some("alice".to_string());
        assert!(resolve_ownership(&config, &platform).unwrap().is_some());
    }
}
