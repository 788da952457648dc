//! Registration of declared goals as rules on a session.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result, bail};
use serde_json::Value;
use tokio::process::Command;
use trellis_engine::{BuildContext, Goal, GoalRef};
use trellis_rules::{GoalFactory, RuleKind, Session, recipe};

use crate::config::{GoalDecl, RecipeFile};

/// Declared goals by name.
pub type GoalTable = BTreeMap<String, (RuleKind, Goal)>;

/// Register every declaration in `file` on `session`.
pub fn register(session: &Session, file: &RecipeFile, root: &Path) -> GoalTable {
    let table: Arc<OnceLock<GoalTable>> = Arc::new(OnceLock::new());
    let mut goals = GoalTable::new();
    for (kind, decl) in file.declarations() {
        let job = Job {
            decl: decl.clone(),
            root: root.to_path_buf(),
            files: session.files().updated.clone(),
            table: Arc::clone(&table),
        };
        let goal = session.rules().kind(kind).exact(
            &decl.name,
            recipe(move |ctx, _args| {
                let job = job.clone();
                async move { job.run(&ctx).await }
            }),
        );
        goals.insert(decl.name.clone(), (kind, goal));
    }
    // Recipes only run after registration, so the table is always set by then.
    let _ = table.set(goals.clone());
    goals
}

/// Map command-line names to goal references. Declared names resolve to
/// their goals (oracles have no free-text form); anything else is matched
/// by the director.
pub fn resolve_names(table: &GoalTable, names: &[String]) -> Vec<GoalRef> {
    names
        .iter()
        .map(|name| match table.get(name) {
            Some((_, goal)) => GoalRef::from(goal),
            None => GoalRef::from(name),
        })
        .collect()
}

/// Everything a declared goal's recipe needs.
#[derive(Clone)]
struct Job {
    decl: GoalDecl,
    root: PathBuf,
    files: GoalFactory,
    table: Arc<OnceLock<GoalTable>>,
}

impl Job {
    async fn run(&self, ctx: &BuildContext) -> Result<Value> {
        let mut deps = Vec::with_capacity(self.decl.files.len() + self.decl.deps.len());
        for file in &self.decl.files {
            let path = self.root.join(file);
            deps.push(self.files.goal(&path.to_string_lossy())?);
        }
        for name in &self.decl.deps {
            let Some((_, goal)) = self.table.get().and_then(|t| t.get(name)) else {
                bail!("goal '{}' depends on undeclared goal '{name}'", self.decl.name);
            };
            deps.push(goal.clone());
        }
        ctx.need(deps).await?;

        match &self.decl.command {
            Some(command) => run_command(ctx, &self.root, command).await,
            None => Ok(Value::Null),
        }
    }
}

/// Run `command` through `sh -c` in `root`; the result is its trimmed stdout.
async fn run_command(ctx: &BuildContext, root: &Path, command: &str) -> Result<Value> {
    ctx.director().reporter().debug(&format!("$ {command}"));
    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(root)
        .output()
        .await
        .with_context(|| format!("failed to spawn `{command}`"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("`{command}` failed ({}):\n{}", output.status, stderr.trim_end());
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(Value::String(stdout.trim().to_string()))
}
