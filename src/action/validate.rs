//! The supplemented `validate` action: re-derives, for every configured
//! directory role, whether the path exists and is usable, and whether
//! any two configured directories improperly nest one inside another.

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{CedarError, Result};

/// One configured directory, tagged with the role it plays, for
/// diagnostic messages.
struct RoleDir {
    role: &'static str,
    path: PathBuf,
}

fn collect_role_dirs(config: &Config) -> Vec<RoleDir> {
    let mut dirs = Vec::new();

    if let Some(dir) = &config.working_dir {
        dirs.push(RoleDir { role: "working_dir", path: dir.clone() });
    }
    if let Some(collect) = &config.collect {
        dirs.push(RoleDir { role: "collect.target_dir", path: collect.target_dir.clone() });
        for source in &collect.collect_dirs {
            dirs.push(RoleDir { role: "collect.collect_dirs", path: source.abs_path.clone() });
        }
    }
    if let Some(stage) = &config.stage {
        dirs.push(RoleDir { role: "stage.target_dir", path: stage.target_dir.clone() });
    }
    if let Some(store) = &config.store {
        dirs.push(RoleDir { role: "store.source_dir", path: store.source_dir.clone() });
    }
    if let Some(purge) = &config.purge {
        for target in &purge.purge_dirs {
            dirs.push(RoleDir { role: "purge.purge_dirs", path: target.abs_path.clone() });
        }
    }

    dirs
}

fn is_writable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| !m.permissions().readonly())
        .unwrap_or(false)
}

/// Checks every configured directory role for existence/readability/
/// writability, and every distinct pair for improper nesting. Returns one
/// human-readable problem string per issue found; an empty vec means the
/// configuration's directories are all sound.
pub fn validate_directories(config: &Config) -> Vec<String> {
    let dirs = collect_role_dirs(config);
    let mut problems = Vec::new();

    for dir in &dirs {
        if !dir.path.exists() {
            problems.push(format!("{} [{}] does not exist", dir.role, dir.path.display()));
            continue;
        }
        if !dir.path.is_dir() {
            problems.push(format!("{} [{}] is not a directory", dir.role, dir.path.display()));
            continue;
        }
        if std::fs::read_dir(&dir.path).is_err() {
            problems.push(format!("{} [{}] is not readable", dir.role, dir.path.display()));
        }
        if !is_writable(&dir.path) {
            problems.push(format!("{} [{}] is not writable", dir.role, dir.path.display()));
        }
    }

    for (i, a) in dirs.iter().enumerate() {
        for b in dirs.iter().skip(i + 1) {
            if a.path == b.path {
                continue;
            }
            if a.path.starts_with(&b.path) || b.path.starts_with(&a.path) {
                problems.push(format!(
                    "{} [{}] and {} [{}] improperly nest one inside the other",
                    a.role,
                    a.path.display(),
                    b.role,
                    b.path.display(),
                ));
            }
        }
    }

    problems
}

/// Runs the `validate` action: any problem found is reported as a single
/// usage error listing every issue.
pub fn execute_validate(config: &Config) -> Result<()> {
    let problems = validate_directories(config);
    if problems.is_empty() {
        log::info!("Executed validate successfully: no problems found.");
        return Ok(());
    }

    for problem in &problems {
        log::error!("Validation problem: {problem}");
    }
    Err(CedarError::usage(format!(
        "validate found {} problem(s): {}",
        problems.len(),
        problems.join("; ")
    )))
}
