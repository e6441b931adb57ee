//! CLI front-end: loads a YAML configuration document, orders the
//! requested actions, and runs each one in turn.

use std::path::PathBuf;

use clap::{CommandFactory, Parser};
use clap_complete::generate;

use cedar_backup::action::{self, ActionOrderEntry};
use cedar_backup::config::{Config, OptionsConfig};
use cedar_backup::platform::{Platform, PosixPlatform};

/// A multi-host backup orchestrator: collect, stage, store/rebuild and
/// purge backups across a pool of peers, writing the result to optical
/// media.
#[derive(Debug, Parser)]
#[clap(author, about, version)]
struct Cli {
    /// Path to the YAML configuration document.
    #[arg(long, short = 'c')]
    config: PathBuf,

    /// Forces a full backup: today-only directory selection, no
    /// cross-midnight or store-indicator heuristics.
    #[arg(long)]
    full: bool,

    /// Suppresses non-essential console output.
    #[arg(long, short = 'q')]
    quiet: bool,

    /// Emits a shell completion script for the named shell instead of
    /// running any action.
    #[arg(long, value_enum, value_parser = clap::value_parser!(clap_complete::Shell))]
    completion: Option<clap_complete::Shell>,

    /// Actions to run, in any order; they are reordered internally to
    /// satisfy the collect -> stage -> store|rebuild -> purge pipeline.
    actions: Vec<String>,
}

fn dispatch(name: &str, config: &Config, options: &OptionsConfig, platform: &dyn Platform, today: chrono::NaiveDate) -> cedar_backup::Result<()> {
    match name {
        action::COLLECT => action::collect::execute_collect(config, None, platform),
        action::STAGE => action::stage::execute_stage(config, options, platform, today),
        action::STORE => action::store::execute_store(config, options, platform, today),
        action::REBUILD => action::store::execute_rebuild(config, platform, today),
        action::PURGE => action::purge::execute_purge(config),
        action::VALIDATE => action::validate::execute_validate(config),
        other => Err(cedar_backup::CedarError::usage(format!("unknown action [{other}]"))),
    }
}

fn main() {
    let cli = Cli::parse();

    if let Some(shell) = cli.completion {
        let mut command = Cli::command();
        let name = command.get_name().to_string();
        generate(shell, &mut command, name, &mut std::io::stdout());
        return;
    }

    if cli.actions.is_empty() {
        failure_message("no actions given; see --help".to_string());
    }

    let contents = match std::fs::read_to_string(&cli.config) {
        Ok(c) => c,
        Err(e) => failure_message(format!("failed to read config [{}]: {e}", cli.config.display())),
    };

    let config = match Config::from_yaml_str(&contents) {
        Ok(c) => c,
        Err(e) => failure_message(format!("invalid configuration: {e}")),
    };

    let ordered = match action::order_actions(&cli.actions, &[] as &[ActionOrderEntry]) {
        Ok(o) => o,
        Err(e) => failure_message(format!("could not order requested actions: {e}")),
    };

    let options = OptionsConfig {
        full: cli.full,
        quiet: cli.quiet,
    };
    let platform = PosixPlatform;
    let today = chrono::Local::now().date_naive();

    for name in &ordered {
        if !cli.quiet {
            println!("Running action [{name}]...");
        }
        if let Err(e) = dispatch(name, &config, &options, &platform, today) {
            failure_message(format!("action [{name}] failed: {e}"));
        }
        if !cli.quiet {
            success_message(format!("Completed action [{name}]."));
        }
    }
}

fn success_message(message: String) {
    println!("{message}");
}

fn failure_message(message: String) -> ! {
    eprintln!("{message}");
    std::process::exit(1);
}
