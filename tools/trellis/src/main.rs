//! Trellis build runner.
//!
//! Reads goals from `trellis.toml`, restores the journal, builds the
//! requested goals incrementally, and writes the journal back.
//!
//! Pipeline: locate recipe file → register goals → load journal →
//!           check build definition → build → save journal.

mod cli;
mod config;
mod goals;
mod reporter;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde_json::Value;
use trellis_engine::{EngineError, Reporter};
use trellis_rules::{Session, SessionConfig};

use crate::config::RecipeFile;
use crate::reporter::{ConsoleReporter, Verbosity};

/// Goal built when `trellis build` is given no goals.
const DEFAULT_GOAL: &str = "default";

fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    match cli.command {
        cli::Command::Build(ref args) => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to start the async runtime")?;
            runtime.block_on(cmd_build(&cli, &args.goals))
        }
        cli::Command::Clean => cmd_clean(&cli),
        cli::Command::List => cmd_list(&cli),
    }
}

// ===========================================================================
// Project loading
// ===========================================================================

/// A located and parsed recipe file.
struct Project {
    root: PathBuf,
    path: PathBuf,
    file: RecipeFile,
}

fn load_project(cli: &cli::Cli) -> Result<Project> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let (root, path) = config::find_recipe_file(&cwd, cli.file.as_deref())?;
    let file = RecipeFile::load(&path)?;
    Ok(Project { root, path, file })
}

/// Session settings: command-line flags override `[settings]`.
fn session_config(cli: &cli::Cli, project: &Project) -> SessionConfig {
    let mut config = SessionConfig::new(&project.root)
        .with_rule_file(&project.path)
        .with_jobs(cli.jobs.or(project.file.settings.jobs).unwrap_or(0));
    if cli.no_journal {
        config = config.without_journal();
    } else if let Some(journal) = cli.journal.as_ref().or(project.file.settings.journal.as_ref()) {
        config = config.with_journal(journal);
    }
    config
}

// ===========================================================================
// Commands
// ===========================================================================

async fn cmd_build(cli: &cli::Cli, goals: &[String]) -> Result<()> {
    let project = load_project(cli)?;
    let config = session_config(cli, &project);
    let reporter = Arc::new(ConsoleReporter::new(Verbosity::from_flags(cli.quiet, cli.verbose)));
    let mut session = Session::with_reporter(config, reporter.clone());
    let table = goals::register(&session, &project.file, &project.root);

    session.load_journal()?;
    session.set_self_tracking(None)?;

    let names = if goals.is_empty() {
        vec![DEFAULT_GOAL.to_string()]
    } else {
        goals.to_vec()
    };
    let started = Instant::now();
    let result = session.start(goals::resolve_names(&table, &names)).await;
    reporter.debug(&format!("build: {:.1?}", started.elapsed()));
    session.save_journal()?;

    build_outcome(result)?;
    reporter.note(&format!("Finished {}", names.join(", ")));
    Ok(())
}

/// Turn the engine's verdict into the process result, keeping the cause.
fn build_outcome(result: Result<Vec<Value>, EngineError>) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if e.is_cancelled() => bail!("build cancelled"),
        Err(e) => Err(anyhow::Error::new(e).context("build failed")),
    }
}

fn cmd_clean(cli: &cli::Cli) -> Result<()> {
    let project = load_project(cli)?;
    let config = session_config(cli, &project);
    let Some(journal) = config.journal else {
        println!("Nothing to clean.");
        return Ok(());
    };
    remove_journal(&journal)
}

fn remove_journal(journal: &Path) -> Result<()> {
    if journal.exists() {
        std::fs::remove_file(journal)
            .with_context(|| format!("Failed to remove {}", journal.display()))?;
        println!("Removed {}", journal.display());
    } else {
        println!("Nothing to clean.");
    }
    Ok(())
}

fn cmd_list(cli: &cli::Cli) -> Result<()> {
    let project = load_project(cli)?;
    for (kind, decl) in project.file.declarations() {
        let kind = format!("{kind:?}").to_lowercase();
        if decl.deps.is_empty() {
            println!("{kind:<7} {}", decl.name);
        } else {
            println!("{kind:<7} {} <- {}", decl.name, decl.deps.join(", "));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_keep_their_cause() {
        let err = build_outcome(Err(EngineError::RuleNotFound {
            name: "nosuchgoal".into(),
        }))
        .unwrap_err();
        let message = format!("{err:#}");
        assert!(message.starts_with("build failed"), "{message}");
        assert!(message.contains("nosuchgoal"), "{message}");
    }

    #[test]
    fn cancellations_stay_terse() {
        let err = build_outcome(Err(EngineError::Cancelled { id: "x".into() })).unwrap_err();
        assert_eq!(err.to_string(), "build cancelled");
        assert!(build_outcome(Ok(Vec::new())).is_ok());
    }
}
