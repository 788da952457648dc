//! Sessions: a director bound to a journal file and a build definition.

use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail};
use serde_json::Value;
use trellis_engine::journal::to_pretty_string;
use trellis_engine::{Director, EngineError, Goal, GoalRef, QuietReporter, Reporter};

use crate::config::SessionConfig;
use crate::factory::RuleSet;
use crate::file::FileRules;
use crate::recipe::recipe;

/// Name of the self-tracking goal registered by [`Session::set_self_tracking`].
pub const DEFINITION_GOAL: &str = "definition";

/// A configured build: director, built-in rules, and journal persistence.
pub struct Session {
    config: SessionConfig,
    director: Director,
    rules: RuleSet,
    files: FileRules,
    self_tracking: Option<Goal>,
    /// Set once there are results from an earlier build to discard.
    warm: AtomicBool,
}

impl Session {
    /// A session that reports nothing.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_reporter(config, Arc::new(QuietReporter))
    }

    /// A session reporting build events to `reporter`.
    pub fn with_reporter(config: SessionConfig, reporter: Arc<dyn Reporter>) -> Self {
        let director = Director::new(config.effective_jobs());
        director.set_reporter(reporter);
        let files = FileRules::register(&director);
        Self {
            rules: RuleSet::new(director.clone()),
            director,
            files,
            config,
            self_tracking: None,
            warm: AtomicBool::new(false),
        }
    }

    /// The session's configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The underlying director.
    pub fn director(&self) -> &Director {
        &self.director
    }

    /// Rule declarations bound to this session.
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// The built-in file rules.
    pub fn files(&self) -> &FileRules {
        &self.files
    }

    /// Load the journal file.
    ///
    /// A missing file is created empty. A file that is not valid JSON, or
    /// was written by another journal version, leaves the session cold.
    /// Returns whether any progress was restored.
    pub fn load_journal(&self) -> Result<bool> {
        let Some(path) = &self.config.journal else {
            return Ok(false);
        };
        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            fs::write(path, "{}")
                .with_context(|| format!("failed to create journal {}", path.display()))?;
            return Ok(false);
        }

        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read journal {}", path.display()))?;
        let doc: Value = match serde_json::from_str(&data) {
            Ok(doc) => doc,
            Err(e) => {
                self.director
                    .reporter()
                    .debug(&format!("Ignoring unreadable journal {}: {e}", path.display()));
                return Ok(false);
            }
        };
        let restored = self.director.from_json(&doc);
        self.warm.fetch_or(restored, Ordering::AcqRel);
        Ok(restored)
    }

    /// Write the journal atomically (write to tmp, then rename).
    pub fn save_journal(&self) -> Result<()> {
        let Some(path) = &self.config.journal else {
            return Ok(());
        };
        let text = to_pretty_string(&self.director.to_json())
            .context("failed to serialize build journal")?;

        let mut tmp_path = path.clone().into_os_string();
        tmp_path.push(".tmp");
        fs::write(&tmp_path, text).context("failed to write temporary build journal")?;
        fs::rename(&tmp_path, path).context("failed to atomically replace build journal")?;
        Ok(())
    }

    /// Track the build definition so that changing it discards the journal.
    ///
    /// Tracks `dependency` if given, otherwise the configured rule file.
    pub fn set_self_tracking(&mut self, dependency: Option<Goal>) -> Result<()> {
        let dependency = match dependency {
            Some(goal) => goal,
            None => {
                let Some(rule_file) = &self.config.rule_file else {
                    bail!("self-tracking needs a dependency or a configured rule file");
                };
                self.files.updated.goal(&rule_file.to_string_lossy())?
            }
        };
        let goal = self.rules.self_tracking(
            DEFINITION_GOAL,
            recipe(move |ctx, _args| {
                let dependency = dependency.clone();
                async move {
                    let values = ctx.need([&dependency]).await?;
                    Ok(values.into_iter().next().unwrap_or(Value::Null))
                }
            }),
        );
        self.self_tracking = Some(goal);
        Ok(())
    }

    /// Build `goals`, checking the build definition first.
    ///
    /// If the definition changed since the journal was written, every
    /// cached result is discarded before the goals are built. A cold
    /// session has nothing to discard.
    pub async fn start<I>(&self, goals: I) -> Result<Vec<Value>, EngineError>
    where
        I: IntoIterator,
        I::Item: Into<GoalRef>,
    {
        let goals: Vec<GoalRef> = goals.into_iter().map(Into::into).collect();
        let warm = self.warm.swap(true, Ordering::AcqRel);
        if let Some(tracker) = &self.self_tracking {
            self.director.want([tracker]).await?;
            let rebuilt = self
                .director
                .progress(&tracker.id)
                .is_some_and(|p| p.revision == self.director.build_rev());
            if rebuilt && warm {
                self.director
                    .reporter()
                    .note("Build definition changed, discarding the journal");
                self.director.invalidate_journal();
                self.director.want([tracker]).await?;
            }
        }
        self.director.want(goals).await
    }
}
