//! Filesystem rules: content-tracked files and existence probes.
//!
//! Both are system rules: they never match free text and never occupy a
//! capacity slot. Recipes reach them through [`FileRules`].

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use trellis_engine::matcher::{AlwaysMatcher, GoalMatcher, KindMatcher, NoStringMatcher};
use trellis_engine::{
    BuildContext, Director, MatchResult, PreBuildContext, PreBuildResult, Rule, RuleBase,
};

use crate::factory::GoalFactory;

/// Kind prefix of content-tracked file goals.
pub const FILE_UPDATED_PREFIX: &str = "Builtin::FileUpdated::";

/// Kind prefix of file-existence goals.
pub const FILE_EXISTS_PREFIX: &str = "Builtin::FileExists::";

/// Observed state of a path; the result value of both file rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    /// The path as requested.
    pub path: String,
    /// Whether the path exists.
    pub present: bool,
    /// Modification time, seconds since the Unix epoch.
    pub updated: Option<i64>,
    /// SHA-256 of the contents, for regular files.
    pub hash: Option<String>,
}

impl FileStat {
    /// Whether `other` has the same presence and contents.
    fn same_contents(&self, other: &FileStat) -> bool {
        self.present == other.present && self.hash == other.hash
    }
}

/// Inspect `path` synchronously.
pub fn stat_path(path: &Path) -> Result<FileStat> {
    let display = path.to_string_lossy().into_owned();
    if !path.exists() {
        return Ok(FileStat {
            path: display,
            present: false,
            updated: None,
            hash: None,
        });
    }
    let hash = if path.is_file() {
        Some(hash_file(path)?)
    } else {
        None
    };
    Ok(FileStat {
        path: display,
        present: true,
        updated: file_mtime_secs(path),
        hash,
    })
}

/// Inspect `path` on the blocking pool.
async fn stat_file(path: &str) -> Result<FileStat> {
    let path = PathBuf::from(path);
    tokio::task::spawn_blocking(move || stat_path(&path))
        .await
        .context("file inspection task failed")?
}

fn file_mtime_secs(path: &Path) -> Option<i64> {
    let mtime = fs::metadata(path).ok()?.modified().ok()?;
    let duration = mtime.duration_since(SystemTime::UNIX_EPOCH).ok()?;
    i64::try_from(duration.as_secs()).ok()
}

fn hash_file(path: &Path) -> Result<String> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(hash_bytes(&data))
}

fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

fn path_arg(args: &[String]) -> Result<&str> {
    match args.first() {
        Some(path) => Ok(path),
        None => bail!("file goal without a path"),
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Tracks a file's contents; modified when its presence or hash changes.
pub struct FileUpdatedRule {
    base: RuleBase,
}

#[async_trait]
impl Rule for FileUpdatedRule {
    fn kind(&self) -> &str {
        "Builtin::FileUpdated"
    }

    fn is_user(&self) -> bool {
        false
    }

    fn match_string(&self, name: &str) -> Option<MatchResult> {
        self.base.match_string(name)
    }

    fn match_goal_id(&self, id: &str, args: &[String]) -> Option<MatchResult> {
        self.base.match_goal_id(id, args)
    }

    async fn build(&self, ctx: &BuildContext, args: &[String]) -> anyhow::Result<Value> {
        let stat = stat_file(path_arg(args)?).await?;
        let previous = ctx
            .last_result()
            .and_then(|v| serde_json::from_value::<FileStat>(v).ok());
        if previous.is_some_and(|last| last.same_contents(&stat)) {
            ctx.is().not().modified();
        } else {
            ctx.is().modified();
        }
        Ok(serde_json::to_value(stat)?)
    }

    async fn pre_build(
        &self,
        ctx: &PreBuildContext,
        args: &[String],
    ) -> anyhow::Result<PreBuildResult> {
        let path = path_arg(args)?;
        let present = tokio::fs::try_exists(path).await.unwrap_or(false);
        if ctx.is_volatile() || !present || ctx.cutoff_early().await? {
            Ok(PreBuildResult::Yes)
        } else {
            Ok(PreBuildResult::Time)
        }
    }
}

/// Requires a path to exist; never reports a modification.
pub struct FileExistsRule {
    base: RuleBase,
}

#[async_trait]
impl Rule for FileExistsRule {
    fn kind(&self) -> &str {
        "Builtin::FileExists"
    }

    fn is_user(&self) -> bool {
        false
    }

    fn match_string(&self, name: &str) -> Option<MatchResult> {
        self.base.match_string(name)
    }

    fn match_goal_id(&self, id: &str, args: &[String]) -> Option<MatchResult> {
        self.base.match_goal_id(id, args)
    }

    async fn build(&self, ctx: &BuildContext, args: &[String]) -> anyhow::Result<Value> {
        let path = path_arg(args)?;
        let stat = stat_file(path).await?;
        if !stat.present {
            bail!("dependent file not found: {path}");
        }
        ctx.is().not().modified();
        Ok(serde_json::to_value(stat)?)
    }

    async fn pre_build(
        &self,
        ctx: &PreBuildContext,
        args: &[String],
    ) -> anyhow::Result<PreBuildResult> {
        let present = tokio::fs::try_exists(path_arg(args)?).await.unwrap_or(false);
        if ctx.is_volatile() || !present {
            Ok(PreBuildResult::Yes)
        } else {
            Ok(PreBuildResult::No)
        }
    }
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

/// Factories for the built-in file rules.
#[derive(Clone)]
pub struct FileRules {
    /// Content-tracked files.
    pub updated: GoalFactory,
    /// Existence probes.
    pub exists: GoalFactory,
}

impl FileRules {
    /// Register both file rules on `director`.
    pub fn register(director: &Director) -> Self {
        let updated = system_matcher(FILE_UPDATED_PREFIX);
        let updated_rule: Arc<dyn Rule> = Arc::new(FileUpdatedRule {
            base: RuleBase::internal(Arc::clone(&updated)),
        });
        director.add_rule(Arc::clone(&updated_rule));

        let exists = system_matcher(FILE_EXISTS_PREFIX);
        let exists_rule: Arc<dyn Rule> = Arc::new(FileExistsRule {
            base: RuleBase::internal(Arc::clone(&exists)),
        });
        director.add_rule(Arc::clone(&exists_rule));

        Self {
            updated: GoalFactory::new(updated, updated_rule),
            exists: GoalFactory::new(exists, exists_rule),
        }
    }
}

fn system_matcher(prefix: &str) -> Arc<dyn GoalMatcher> {
    Arc::new(KindMatcher::new(prefix, NoStringMatcher::new(AlwaysMatcher)))
}
