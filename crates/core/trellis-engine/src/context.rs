//! Contexts handed to recipes and staleness checks.
//!
//! [`BuildContext`] is what a recipe sees: it requests dependencies, records
//! them for the next staleness check, and declares whether its output
//! changed. [`PreBuildContext`] is what a staleness check sees: the previous
//! result, the recorded dependencies, and the early-cutoff hook.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::join_all;
use serde_json::Value;

use crate::director::{Director, settle};
use crate::error::{EngineError, Result};
use crate::goal::{Dependency, GoalRef, Objective};

// ---------------------------------------------------------------------------
// Build context
// ---------------------------------------------------------------------------

/// Capabilities available to a running recipe.
///
/// Cloning is cheap, so recipes may move a clone into their own futures.
#[derive(Clone)]
pub struct BuildContext {
    director: Director,
    objective: Arc<Objective>,
    build_rev: u64,
}

impl BuildContext {
    pub(crate) fn new(director: Director, objective: Arc<Objective>, build_rev: u64) -> Self {
        Self {
            director,
            objective,
            build_rev,
        }
    }

    /// Id of the goal being built.
    pub fn id(&self) -> &str {
        self.objective.id()
    }

    /// The director running this build.
    pub fn director(&self) -> &Director {
        &self.director
    }

    /// Result of the previous build, if there was one.
    pub fn last_result(&self) -> Option<Value> {
        self.objective.progress.lock().last_result.clone()
    }

    /// Generation of the goal's last modifying build.
    pub fn revision(&self) -> u64 {
        self.objective.progress.revision()
    }

    /// Override the goal's revision. Counts as a modification decision.
    pub fn set_revision(&self, revision: u64) {
        let mut st = self.objective.progress.lock();
        st.revision = revision;
        st.modified.get_or_insert(true);
    }

    /// Generation this build runs in.
    pub fn build_revision(&self) -> u64 {
        self.build_rev
    }

    /// Flags describing the build's outcome.
    pub fn is(&self) -> BuildFlags<'_> {
        BuildFlags { ctx: self }
    }

    /// The tracking value carried over from the previous build.
    pub fn tracking(&self) -> Option<Value> {
        self.objective.progress.lock().tracking.clone()
    }

    /// Store a tracking value for the next build and return it.
    pub fn track(&self, value: Value) -> Value {
        self.objective.progress.lock().tracking = Some(value.clone());
        value
    }

    /// Store a tracking value and mark the goal modified only if it changed.
    pub fn track_modification(&self, value: Value) -> Value {
        let changed = {
            let mut st = self.objective.progress.lock();
            let changed = st.tracking.as_ref() != Some(&value);
            st.tracking = Some(value.clone());
            changed
        };
        if changed {
            self.is().modified();
        } else {
            self.is().not().modified();
        }
        value
    }

    /// Build the referenced goals without recording them as dependencies.
    ///
    /// The recipe gives up its capacity slot while it waits.
    pub async fn order<I>(&self, refs: I) -> Result<Vec<Value>>
    where
        I: IntoIterator,
        I::Item: Into<GoalRef>,
    {
        let refs: Vec<GoalRef> = refs.into_iter().map(Into::into).collect();
        let resolved = self.director.resolve_refs(&refs)?;
        let results = self.run_dependencies(&resolved.objectives).await?;
        Ok(resolved.values(&results))
    }

    /// Record the referenced goals as one dependency group without building them.
    pub fn needed<I>(&self, refs: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<GoalRef>,
    {
        let refs: Vec<GoalRef> = refs.into_iter().map(Into::into).collect();
        let resolved = self.director.resolve_refs(&refs)?;
        self.record(&resolved.objectives);
        Ok(())
    }

    /// Build the referenced goals and record them as one dependency group.
    pub async fn need<I>(&self, refs: I) -> Result<Vec<Value>>
    where
        I: IntoIterator,
        I::Item: Into<GoalRef>,
    {
        let refs: Vec<GoalRef> = refs.into_iter().map(Into::into).collect();
        let resolved = self.director.resolve_refs(&refs)?;
        let results = self.run_dependencies(&resolved.objectives).await?;
        self.record(&resolved.objectives);
        Ok(resolved.values(&results))
    }

    async fn run_dependencies(&self, deps: &[Arc<Objective>]) -> Result<HashMap<String, Value>> {
        if deps.is_empty() {
            return Ok(HashMap::new());
        }
        self.director.enter_dependencies(&self.objective, deps)?;

        let reporter = self.director.reporter();
        let arbitrator = self.director.arbitrator();
        arbitrator.halt(&self.objective.progress, reporter.as_ref()).await;
        let outcomes = join_all(
            deps.iter()
                .map(|dep| self.director.build_target(Arc::clone(dep))),
        )
        .await;
        arbitrator.unhalt(&self.objective.progress, reporter.as_ref()).await;
        settle(deps, outcomes)
    }

    fn record(&self, deps: &[Arc<Objective>]) {
        if deps.is_empty() {
            return;
        }
        let group: Vec<Dependency> = deps.iter().map(|d| d.goal().dependency()).collect();
        self.objective.progress.lock().dependencies.push(group);
    }
}

/// Setters for the `ctx.is()` family.
pub struct BuildFlags<'a> {
    ctx: &'a BuildContext,
}

impl<'a> BuildFlags<'a> {
    /// Force a rebuild next time, whatever the dependencies say.
    pub fn volatile(&self) {
        self.ctx.objective.progress.lock().volatile = true;
    }

    /// Declare that this build changed the goal's output.
    pub fn modified(&self) {
        let mut st = self.ctx.objective.progress.lock();
        st.modified = Some(true);
        st.revision = self.ctx.build_rev;
    }

    /// The negated setters.
    #[allow(clippy::should_implement_trait)]
    pub fn not(&self) -> NotFlags<'a> {
        NotFlags { ctx: self.ctx }
    }
}

/// Setters for the `ctx.is().not()` family.
pub struct NotFlags<'a> {
    ctx: &'a BuildContext,
}

impl NotFlags<'_> {
    /// Only rebuild next time if a dependency changed.
    pub fn volatile(&self) {
        self.ctx.objective.progress.lock().volatile = false;
    }

    /// Declare that this build reproduced the previous output.
    pub fn modified(&self) {
        self.ctx.objective.progress.lock().modified = Some(false);
    }
}

// ---------------------------------------------------------------------------
// Staleness-check context
// ---------------------------------------------------------------------------

/// Capabilities available to a staleness check.
pub struct PreBuildContext {
    director: Director,
    objective: Arc<Objective>,
    build_rev: u64,
    volatile: bool,
    last_result: Option<Value>,
    dependencies: Vec<Vec<Dependency>>,
    any_modified: AtomicBool,
}

impl PreBuildContext {
    pub(crate) fn new(
        director: Director,
        objective: Arc<Objective>,
        build_rev: u64,
        volatile: bool,
        last_result: Option<Value>,
        dependencies: Vec<Vec<Dependency>>,
    ) -> Self {
        Self {
            director,
            objective,
            build_rev,
            volatile,
            last_result,
            dependencies,
            any_modified: AtomicBool::new(false),
        }
    }

    /// Id of the goal being checked.
    pub fn id(&self) -> &str {
        self.objective.id()
    }

    /// Whether the goal was volatile when the check began.
    pub fn is_volatile(&self) -> bool {
        self.volatile
    }

    /// The result of the last build, if any.
    pub fn last_result(&self) -> Option<&Value> {
        self.last_result.as_ref()
    }

    /// Dependency groups recorded by the last build.
    pub fn dependencies(&self) -> &[Vec<Dependency>] {
        &self.dependencies
    }

    /// Generation this check runs in.
    pub fn build_revision(&self) -> u64 {
        self.build_rev
    }

    /// Whether any recorded dependency changed since the last build.
    ///
    /// Groups are checked in recording order and the walk stops at the
    /// first group with a change. A dependency that can no longer be
    /// resolved counts as changed.
    pub async fn dependency_modified(&self) -> bool {
        if self.any_modified.load(Ordering::Acquire) {
            return true;
        }
        for group in &self.dependencies {
            let outcomes = join_all(group.iter().map(|dep| self.triggers(dep))).await;
            for (dep, outcome) in group.iter().zip(outcomes) {
                let message = match outcome {
                    Ok(false) => continue,
                    Ok(true) => format!("Triggered update: {} <== {}", self.id(), dep.id),
                    Err(e) => format!("Triggered update: {} <== {} ({e})", self.id(), dep.id),
                };
                self.director.reporter().debug(&message);
                self.any_modified.store(true, Ordering::Release);
                return true;
            }
        }
        false
    }

    async fn triggers(&self, dep: &Dependency) -> Result<bool> {
        let dependency = self
            .director
            .query(false, &dep.id, &dep.args)?
            .ok_or_else(|| EngineError::RuleNotFound {
                name: dep.id.clone(),
            })?;
        Ok(self
            .director
            .check_trigger_rebuild_by_dependency(&dependency, &self.objective)
            .await)
    }

    /// Rebuild now and report whether the output changed.
    ///
    /// The build is shared with the goal's regular build, so the recipe
    /// still runs at most once this generation.
    pub async fn cutoff_early(&self) -> Result<bool> {
        self.director
            .reporter()
            .debug(&format!("Started early cutoff execute: {}", self.id()));
        self.director.material_build(&self.objective).await?;
        Ok(self.objective.progress.revision() == self.build_rev)
    }
}
