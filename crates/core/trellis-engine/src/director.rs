//! The director: goal resolution, generations, and the build protocol.
//!
//! Every requested goal goes through the same steps:
//! 1. resolve the request to an [`Objective`] (one per goal id);
//! 2. if it already settled this generation, return the cached outcome;
//! 3. otherwise run its staleness check, shared by all concurrent callers;
//! 4. rebuild if the check says so, else reuse the previous result.
//!
//! Builds and staleness checks run as spawned tokio tasks and are shared
//! through [`futures::future::Shared`], so a goal is built at most once per
//! generation no matter how many dependents ask for it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, join_all};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::arbitrator::Arbitrator;
use crate::context::{BuildContext, PreBuildContext};
use crate::error::{EngineError, Result};
use crate::goal::{Goal, GoalRef, MatchResult, Objective};
use crate::journal::Journal;
use crate::progress::{
    BuildStatus, PreBuildStatus, Progress, ProgressInfo, SharedBuild, SharedPreBuild,
};
use crate::reporter::{QuietReporter, Reporter};
use crate::rule::{PreBuildResult, Rule, same_rule};

/// Handle to a build graph. Cloning is cheap; clones share all state.
#[derive(Clone)]
pub struct Director {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<State>,
    arbitrator: Arbitrator,
    reporter: RwLock<Arc<dyn Reporter>>,
}

struct State {
    /// Registered rules; the most recent registration wins.
    rules: Vec<Arc<dyn Rule>>,
    objectives: HashMap<String, Arc<Objective>>,
    /// Progress records, including ones loaded from the journal whose goal
    /// has not been requested yet.
    progresses: HashMap<String, Arc<Progress>>,
    build_rev: u64,
    some_target_wrong: bool,
    /// Goals requested by each running recipe this generation.
    running_dependencies: HashMap<String, HashSet<String>>,
}

impl Default for Director {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Director {
    /// A director running at most `capacity` user recipes at once (`0` = unbounded).
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    rules: Vec::new(),
                    objectives: HashMap::new(),
                    progresses: HashMap::new(),
                    build_rev: 0,
                    some_target_wrong: false,
                    running_dependencies: HashMap::new(),
                }),
                arbitrator: Arbitrator::new(capacity),
                reporter: RwLock::new(Arc::new(QuietReporter)),
            }),
        }
    }

    /// Replace the event sink.
    pub fn set_reporter(&self, reporter: Arc<dyn Reporter>) {
        *self.inner.reporter.write() = reporter;
    }

    /// The current event sink.
    pub fn reporter(&self) -> Arc<dyn Reporter> {
        Arc::clone(&self.inner.reporter.read())
    }

    /// Change how many user recipes may run at once (`0` = unbounded).
    pub fn set_capacity(&self, capacity: usize) {
        self.inner.arbitrator.set_capacity(capacity);
    }

    pub(crate) fn arbitrator(&self) -> &Arbitrator {
        &self.inner.arbitrator
    }

    /// Register a rule. Later registrations take precedence when matching.
    pub fn add_rule(&self, rule: Arc<dyn Rule>) {
        self.inner.state.lock().rules.push(rule);
    }

    /// The current generation number.
    pub fn build_rev(&self) -> u64 {
        self.inner.state.lock().build_rev
    }

    /// Snapshot of a goal's progress, if the director knows the id.
    pub fn progress(&self, id: &str) -> Option<ProgressInfo> {
        let progress = self.inner.state.lock().progresses.get(id).cloned();
        progress.map(|p| p.info())
    }

    // -----------------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------------

    /// Find the objective for a name (`free_text`) or a structured goal id.
    ///
    /// Rules are consulted most-recent first; the first match wins.
    pub fn query(
        &self,
        free_text: bool,
        name: &str,
        args: &[String],
    ) -> Result<Option<Arc<Objective>>> {
        let mut state = self.inner.state.lock();
        let found = state.rules.iter().rev().find_map(|rule| {
            let m = if free_text {
                rule.match_string(name)
            } else {
                rule.match_goal_id(name, args)
            };
            m.map(|m| (Arc::clone(rule), m))
        });
        match found {
            Some((rule, m)) => state.objective_for(rule, m).map(Some),
            None => Ok(None),
        }
    }

    /// Find the objective for a goal built by a factory.
    pub fn validate_goal(&self, goal: &Goal) -> Result<Option<Arc<Objective>>> {
        let Some(m) = goal.rule.match_goal_id(&goal.id, &goal.args) else {
            return Ok(None);
        };
        self.inner
            .state
            .lock()
            .objective_for(Arc::clone(&goal.rule), m)
            .map(Some)
    }

    fn resolve_one(&self, reference: &GoalRef) -> Result<Arc<Objective>> {
        match reference {
            GoalRef::Name(name) => self
                .query(true, name, &[])?
                .ok_or_else(|| EngineError::RuleNotFound { name: name.clone() }),
            GoalRef::Goal(goal) => self
                .validate_goal(goal)?
                .ok_or_else(|| EngineError::RuleNotFound { name: goal.id.clone() }),
            GoalRef::List(_) | GoalRef::None => Err(EngineError::InvalidGoal {
                reason: "expected a single goal".into(),
            }),
        }
    }

    /// Resolve references into deduplicated objectives plus the result shape.
    pub(crate) fn resolve_refs(&self, refs: &[GoalRef]) -> Result<Resolved> {
        let mut resolved = Resolved {
            shape: Vec::with_capacity(refs.len()),
            objectives: Vec::new(),
        };
        let mut seen = HashSet::new();
        for reference in refs {
            let shape = self.resolve_into(reference, &mut resolved.objectives, &mut seen)?;
            resolved.shape.push(shape);
        }
        Ok(resolved)
    }

    fn resolve_into(
        &self,
        reference: &GoalRef,
        objectives: &mut Vec<Arc<Objective>>,
        seen: &mut HashSet<String>,
    ) -> Result<Shape> {
        match reference {
            GoalRef::None => Ok(Shape::Nothing),
            GoalRef::List(items) => items
                .iter()
                .map(|item| self.resolve_into(item, objectives, seen))
                .collect::<Result<Vec<_>>>()
                .map(Shape::Many),
            GoalRef::Name(_) | GoalRef::Goal(_) => {
                let objective = self.resolve_one(reference)?;
                let id = objective.id().to_string();
                if seen.insert(id.clone()) {
                    objectives.push(objective);
                }
                Ok(Shape::One(id))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Top-level requests
    // -----------------------------------------------------------------------

    /// Build the requested goals in a new generation.
    ///
    /// All requested goals are driven to completion even when one fails;
    /// the first failure is returned afterwards. Results mirror the shape
    /// of `refs`.
    pub async fn want<I>(&self, refs: I) -> Result<Vec<Value>>
    where
        I: IntoIterator,
        I::Item: Into<GoalRef>,
    {
        let refs: Vec<GoalRef> = refs.into_iter().map(Into::into).collect();
        self.begin_generation();
        let resolved = self.resolve_refs(&refs)?;
        let outcomes = join_all(
            resolved
                .objectives
                .iter()
                .map(|objective| self.build_target(Arc::clone(objective))),
        )
        .await;
        let results = settle(&resolved.objectives, outcomes)?;
        Ok(resolved.values(&results))
    }

    fn begin_generation(&self) {
        let mut state = self.inner.state.lock();
        let latest = state
            .progresses
            .values()
            .map(|p| p.revision())
            .max()
            .unwrap_or(0);
        state.build_rev = state.build_rev.max(latest) + 1;
        state.running_dependencies.clear();
    }

    /// Forget the current generation's statuses so goals can be rechecked.
    pub fn reset(&self) {
        let mut state = self.inner.state.lock();
        state.some_target_wrong = false;
        state.running_dependencies.clear();
        for progress in state.progresses.values() {
            progress.reset_build_status();
        }
    }

    /// Discard every objective and progress record, and any earlier failure.
    pub fn invalidate_journal(&self) {
        let mut state = self.inner.state.lock();
        state.some_target_wrong = false;
        state.objectives.clear();
        state.progresses.clear();
        state.running_dependencies.clear();
    }

    // -----------------------------------------------------------------------
    // Build protocol
    // -----------------------------------------------------------------------

    /// Build one objective, or join the build already in flight.
    pub fn build_target(&self, objective: Arc<Objective>) -> BoxFuture<'static, Result<Value>> {
        let director = self.clone();
        async move {
            if let Some(settled) = objective.progress.settled() {
                return settled;
            }
            let in_flight = {
                let st = objective.progress.lock();
                if st.status == BuildStatus::Started {
                    st.build_future.clone()
                } else {
                    None
                }
            };
            match in_flight {
                Some(build) => build.await,
                None => director.build_new_target(&objective).await,
            }
        }
        .boxed()
    }

    async fn build_new_target(&self, objective: &Arc<Objective>) -> Result<Value> {
        if self.some_target_wrong() {
            return Err(EngineError::Cancelled {
                id: objective.id().to_string(),
            });
        }

        if self.pre_build_of(objective).await == PreBuildResult::Yes {
            return self.material_build(objective).await;
        }

        // Up to date. A staleness check that cut off early may still own a build.
        let (pending, skipped) = {
            let mut st = objective.progress.lock();
            match st.status {
                BuildStatus::NotStarted => {
                    st.status = BuildStatus::Finished;
                    (None, true)
                }
                BuildStatus::Started => (st.build_future.clone(), false),
                BuildStatus::Finished | BuildStatus::Error => (None, false),
            }
        };
        if let Some(build) = pending {
            return build.await;
        }
        if skipped && objective.progress.is_user() {
            self.reporter().target_skip(objective.id());
        }
        objective.progress.settled().unwrap_or(Ok(Value::Null))
    }

    fn some_target_wrong(&self) -> bool {
        self.inner.state.lock().some_target_wrong
    }

    /// Run the objective's staleness check, once per generation.
    pub async fn check_need_rebuild(&self, objective: &Arc<Objective>) -> PreBuildResult {
        self.pre_build_of(objective).await
    }

    fn pre_build_of(&self, objective: &Arc<Objective>) -> SharedPreBuild {
        let build_rev = self.build_rev();
        let mut st = objective.progress.lock();
        if let Some(check) = &st.pre_build_future {
            return check.clone();
        }
        st.pre_build_status = PreBuildStatus::Checking;

        let ctx = PreBuildContext::new(
            self.clone(),
            Arc::clone(objective),
            build_rev,
            st.volatile,
            st.result.clone(),
            st.dependencies.clone(),
        );
        let director = self.clone();
        let target = Arc::clone(objective);
        let handle = tokio::spawn(async move {
            let rule = Arc::clone(&target.goal.rule);
            let result = match rule.pre_build(&ctx, &target.exec_args).await {
                Ok(result) => result,
                Err(e) => {
                    director.reporter().debug(&format!(
                        "Staleness check of {} failed, rebuilding: {e:#}",
                        target.id()
                    ));
                    PreBuildResult::Yes
                }
            };
            target.progress.decide(result);
            result
        });
        let check = async move { handle.await.unwrap_or(PreBuildResult::Yes) }
            .boxed()
            .shared();
        st.pre_build_future = Some(check.clone());
        check
    }

    /// Start the objective's recipe, or join the run already in flight.
    pub(crate) fn material_build(&self, objective: &Arc<Objective>) -> SharedBuild {
        let build_rev = self.build_rev();
        let mut st = objective.progress.lock();
        if let Some(build) = &st.build_future {
            return build.clone();
        }
        st.status = BuildStatus::Started;
        st.volatile = false;
        st.dependencies.clear();
        st.last_result = st.result.take();
        st.modified = None;
        st.last_error = None;

        let director = self.clone();
        let target = Arc::clone(objective);
        let handle = tokio::spawn(async move { director.run_build(target, build_rev).await });
        let id = objective.id().to_string();
        let build = async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(EngineError::Recipe {
                    id,
                    error: Arc::new(anyhow::anyhow!("build task aborted: {e}")),
                }),
            }
        }
        .boxed()
        .shared();
        st.build_future = Some(build.clone());
        build
    }

    async fn run_build(self, objective: Arc<Objective>, build_rev: u64) -> Result<Value> {
        let reporter = self.reporter();
        let arbitrator = self.arbitrator();
        let progress = Arc::clone(&objective.progress);
        arbitrator.start(&progress, reporter.as_ref()).await;

        let ctx = BuildContext::new(self.clone(), Arc::clone(&objective), build_rev);
        let rule = Arc::clone(&objective.goal.rule);
        match rule.build(&ctx, &objective.exec_args).await {
            Ok(value) => {
                progress.finish(value.clone(), build_rev);
                arbitrator.end(&progress, None, reporter.as_ref()).await;
                Ok(value)
            }
            Err(e) => {
                let error = EngineError::from_recipe(objective.id(), e);
                self.inner.state.lock().some_target_wrong = true;
                progress.fail(error.clone());
                arbitrator.end(&progress, Some(&error), reporter.as_ref()).await;
                Err(error)
            }
        }
    }

    /// Whether `dependency` changed in a way that invalidates `against`.
    pub async fn check_trigger_rebuild_by_dependency(
        &self,
        dependency: &Arc<Objective>,
        against: &Arc<Objective>,
    ) -> bool {
        let decision = self.pre_build_of(dependency).await;
        let this = dependency.progress.info();
        let that = against.progress.info();
        let itself_modified = match decision {
            PreBuildResult::Yes => true,
            PreBuildResult::No => false,
            PreBuildResult::Time => this.revision > that.revision,
        };
        dependency
            .goal
            .rule
            .should_trigger_modify(itself_modified, &this, &that)
    }

    /// Record that `requester` waits on `dependencies`, rejecting cycles.
    pub(crate) fn enter_dependencies(
        &self,
        requester: &Objective,
        dependencies: &[Arc<Objective>],
    ) -> Result<()> {
        let mut state = self.inner.state.lock();
        state
            .running_dependencies
            .entry(requester.id().to_string())
            .or_default()
            .extend(dependencies.iter().map(|d| d.id().to_string()));

        for dependency in dependencies {
            if state.reaches(dependency.id(), requester.id()) {
                return Err(EngineError::Circular {
                    id: requester.id().to_string(),
                    dependency: dependency.id().to_string(),
                });
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Journal
    // -----------------------------------------------------------------------

    /// Serialize every finished or untouched goal's progress.
    pub fn to_json(&self) -> Value {
        let progresses: Vec<Arc<Progress>> =
            self.inner.state.lock().progresses.values().cloned().collect();
        let mut journal = Journal::new();
        for progress in progresses {
            if let Some(entry) = progress.to_entry() {
                journal.entries.insert(entry.id.clone(), entry);
            }
        }
        journal.to_value()
    }

    /// Load progress from a journal document.
    ///
    /// Documents of another version, or malformed ones, are ignored.
    /// Returns whether anything was loaded.
    pub fn from_json(&self, doc: &Value) -> bool {
        let Some(journal) = Journal::parse(doc) else {
            return false;
        };
        let mut state = self.inner.state.lock();
        for (id, entry) in &journal.entries {
            let progress = state
                .progresses
                .entry(id.clone())
                .or_insert_with(|| Arc::new(Progress::new(id.clone())));
            progress.apply_entry(entry);
        }
        true
    }
}

impl State {
    fn objective_for(&mut self, rule: Arc<dyn Rule>, m: MatchResult) -> Result<Arc<Objective>> {
        if let Some(existing) = self.objectives.get(&m.id) {
            if !same_rule(&existing.goal.rule, &rule) {
                return Err(EngineError::RuleConflict { id: m.id });
            }
            return Ok(Arc::clone(existing));
        }

        let progress = Arc::clone(
            self.progresses
                .entry(m.id.clone())
                .or_insert_with(|| Arc::new(Progress::new(m.id.clone()))),
        );
        progress.set_user(rule.is_user());
        let objective = Arc::new(Objective {
            goal: Goal {
                id: m.id.clone(),
                args: m.args,
                rule,
            },
            exec_args: m.exec_args,
            progress,
        });
        self.objectives.insert(m.id, Arc::clone(&objective));
        Ok(objective)
    }

    /// Whether `target` is reachable from `start` through running requests.
    fn reaches(&self, start: &str, target: &str) -> bool {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if !visited.insert(id) {
                continue;
            }
            if let Some(next) = self.running_dependencies.get(id) {
                stack.extend(next.iter().map(String::as_str));
            }
        }
        false
    }
}

// ---------------------------------------------------------------------------
// Result shaping
// ---------------------------------------------------------------------------

/// Shape of a request, mirrored by its results.
pub(crate) enum Shape {
    One(String),
    Many(Vec<Shape>),
    Nothing,
}

impl Shape {
    fn value(&self, results: &HashMap<String, Value>) -> Value {
        match self {
            Shape::One(id) => results.get(id).cloned().unwrap_or(Value::Null),
            Shape::Many(items) => Value::Array(items.iter().map(|s| s.value(results)).collect()),
            Shape::Nothing => Value::Null,
        }
    }
}

/// Resolved request: the shape plus the deduplicated objectives to build.
pub(crate) struct Resolved {
    pub shape: Vec<Shape>,
    pub objectives: Vec<Arc<Objective>>,
}

impl Resolved {
    pub fn values(&self, results: &HashMap<String, Value>) -> Vec<Value> {
        self.shape.iter().map(|s| s.value(results)).collect()
    }
}

/// Collect outcomes by goal id, or the first failure.
///
/// A real failure is preferred over cancellations it caused.
pub(crate) fn settle(
    objectives: &[Arc<Objective>],
    outcomes: Vec<Result<Value>>,
) -> Result<HashMap<String, Value>> {
    let mut results = HashMap::with_capacity(outcomes.len());
    let mut failure: Option<EngineError> = None;
    for (objective, outcome) in objectives.iter().zip(outcomes) {
        match outcome {
            Ok(value) => {
                results.insert(objective.id().to_string(), value);
            }
            Err(e) => {
                if failure.as_ref().is_none_or(EngineError::is_cancelled) && !e.is_cancelled() {
                    failure = Some(e);
                } else if failure.is_none() {
                    failure = Some(e);
                }
            }
        }
    }
    match failure {
        Some(e) => Err(e),
        None => Ok(results),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::matcher::{ExactMatcher, GoalMatcher, KindMatcher};
    use crate::rule::RuleBase;

    type Recipe = Box<dyn Fn(BuildContext) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

    /// Task-like rule: rebuilt when volatile or when a dependency changed.
    /// With `cutoff`, it instead always rebuilds and reports whether the
    /// build changed anything.
    struct TestRule {
        base: RuleBase,
        recipe: Recipe,
        cutoff: bool,
    }

    #[async_trait]
    impl Rule for TestRule {
        fn kind(&self) -> &str {
            "Test"
        }

        fn match_string(&self, name: &str) -> Option<MatchResult> {
            self.base.match_string(name)
        }

        fn match_goal_id(&self, id: &str, args: &[String]) -> Option<MatchResult> {
            self.base.match_goal_id(id, args)
        }

        async fn build(&self, ctx: &BuildContext, _args: &[String]) -> anyhow::Result<Value> {
            (self.recipe)(ctx.clone()).await
        }

        async fn pre_build(
            &self,
            ctx: &PreBuildContext,
            _args: &[String],
        ) -> anyhow::Result<PreBuildResult> {
            if self.cutoff {
                return Ok(if ctx.cutoff_early().await? {
                    PreBuildResult::Yes
                } else {
                    PreBuildResult::No
                });
            }
            if ctx.is_volatile() || ctx.dependency_modified().await {
                Ok(PreBuildResult::Yes)
            } else {
                Ok(PreBuildResult::Time)
            }
        }
    }

    fn define<F>(director: &Director, name: &str, recipe: F) -> Goal
    where
        F: Fn(BuildContext) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync + 'static,
    {
        define_rule(director, name, false, recipe)
    }

    fn define_cutoff<F>(director: &Director, name: &str, recipe: F) -> Goal
    where
        F: Fn(BuildContext) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync + 'static,
    {
        define_rule(director, name, true, recipe)
    }

    fn define_rule<F>(director: &Director, name: &str, cutoff: bool, recipe: F) -> Goal
    where
        F: Fn(BuildContext) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync + 'static,
    {
        let matcher: Arc<dyn GoalMatcher> =
            Arc::new(KindMatcher::new("Test::", ExactMatcher::new(name)));
        let m = matcher.create_goal_id(&[]).unwrap();
        let rule: Arc<dyn Rule> = Arc::new(TestRule {
            base: RuleBase::new(matcher),
            recipe: Box::new(recipe),
            cutoff,
        });
        director.add_rule(Arc::clone(&rule));
        Goal {
            id: m.id,
            args: m.args,
            rule,
        }
    }

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    // ---- 1. shared_dependency_builds_once ----

    #[tokio::test]
    async fn shared_dependency_builds_once() {
        let director = Director::default();
        let runs = counter();
        let shared = {
            let runs = Arc::clone(&runs);
            define(&director, "shared", move |_ctx| {
                let runs = Arc::clone(&runs);
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok(json!("s"))
                }
                .boxed()
            })
        };
        let names: Vec<String> = (0..5).map(|i| format!("user{i}")).collect();
        for name in &names {
            let shared = shared.clone();
            define(&director, name, move |ctx| {
                let shared = shared.clone();
                async move {
                    let values = ctx.need([&shared]).await?;
                    Ok(values[0].clone())
                }
                .boxed()
            });
        }

        let results = director.want(names.iter()).await.unwrap();
        assert_eq!(results, vec![json!("s"); 5]);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    // ---- 2. results_mirror_request_shape ----

    #[tokio::test]
    async fn results_mirror_request_shape() {
        let director = Director::default();
        let a = define(&director, "a", |_| async { Ok(json!(1)) }.boxed());
        let b = define(&director, "b", |_| async { Ok(json!(2)) }.boxed());
        let refs = vec![
            GoalRef::from(&a),
            GoalRef::List(vec![GoalRef::from("b"), GoalRef::None]),
            GoalRef::from(b),
        ];
        let results = director.want(refs).await.unwrap();
        assert_eq!(results, vec![json!(1), json!([2, null]), json!(2)]);
    }

    // ---- 3. self_dependency_is_circular ----

    #[tokio::test]
    async fn self_dependency_is_circular() {
        let director = Director::default();
        define(&director, "loop", |ctx| {
            async move {
                ctx.need(["loop"]).await?;
                Ok(Value::Null)
            }
            .boxed()
        });
        let err = director.want(["loop"]).await.unwrap_err();
        assert!(err.is_circular(), "{err}");
        assert!(err.to_string().contains("Test::loop"));
    }

    // ---- 4. two_goal_cycle_is_circular ----

    #[tokio::test]
    async fn two_goal_cycle_is_circular() {
        let director = Director::default();
        define(&director, "ping", |ctx| {
            async move {
                ctx.need(["pong"]).await?;
                Ok(Value::Null)
            }
            .boxed()
        });
        define(&director, "pong", |ctx| {
            async move {
                ctx.need(["ping"]).await?;
                Ok(Value::Null)
            }
            .boxed()
        });
        let err = director.want(["ping"]).await.unwrap_err();
        assert!(err.is_circular(), "{err}");
    }

    // ---- 5. latest_rule_wins_and_conflicts_are_rejected ----

    #[tokio::test]
    async fn latest_rule_wins_and_conflicts_are_rejected() {
        let director = Director::default();
        define(&director, "x", |_| async { Ok(json!("old")) }.boxed());
        let newer = define(&director, "x", |_| async { Ok(json!("new")) }.boxed());
        assert_eq!(director.want(["x"]).await.unwrap(), vec![json!("new")]);

        // The cached objective for "Test::x" belongs to `newer`; a third
        // rule claiming the same id is a conflict.
        let third = define(&Director::default(), "x", |_| async { Ok(Value::Null) }.boxed());
        assert!(matches!(
            director.validate_goal(&third),
            Err(EngineError::RuleConflict { .. })
        ));
        assert!(director.validate_goal(&newer).unwrap().is_some());
    }

    // ---- 6. unknown_names_fail_to_resolve ----

    #[tokio::test]
    async fn unknown_names_fail_to_resolve() {
        let director = Director::default();
        let err = director.want(["missing"]).await.unwrap_err();
        assert!(matches!(err, EngineError::RuleNotFound { name } if name == "missing"));
    }

    // ---- 7. failures_drain_siblings_then_cancel_new_work ----

    #[tokio::test]
    async fn failures_drain_siblings_then_cancel_new_work() {
        let director = Director::default();
        let finished = counter();
        define(&director, "bad", |_| async { Err(anyhow::anyhow!("boom")) }.boxed());
        {
            let finished = Arc::clone(&finished);
            define(&director, "slow", move |_| {
                let finished = Arc::clone(&finished);
                async move {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                    Ok(json!("done"))
                }
                .boxed()
            });
        }
        define(&director, "later", |_| async { Ok(Value::Null) }.boxed());

        let err = director.want(["bad", "slow"]).await.unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert_eq!(finished.load(Ordering::SeqCst), 1);

        let err = director.want(["later"]).await.unwrap_err();
        assert!(err.is_cancelled());

        director.reset();
        assert!(director.want(["later"]).await.is_ok());
    }

    // ---- 8. capacity_bounds_concurrent_recipes ----

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn capacity_bounds_concurrent_recipes() {
        let director = Director::new(2);
        let running = counter();
        let peak = counter();
        let names: Vec<String> = (0..6).map(|i| format!("job{i}")).collect();
        for name in &names {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            define(&director, name, move |_| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(Value::Null)
                }
                .boxed()
            });
        }
        director.want(names.iter()).await.unwrap();
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    // ---- 9. waiting_parent_releases_its_slot ----

    #[tokio::test]
    async fn waiting_parent_releases_its_slot() {
        let director = Director::new(1);
        define(&director, "leaf", |_| async { Ok(json!(1)) }.boxed());
        define(&director, "parent", |ctx| {
            async move {
                let values = ctx.need(["leaf"]).await?;
                Ok(values[0].clone())
            }
            .boxed()
        });
        let result = tokio::time::timeout(Duration::from_secs(5), director.want(["parent"]))
            .await
            .expect("build deadlocked");
        assert_eq!(result.unwrap(), vec![json!(1)]);
    }

    // ---- 10. unchanged_goals_are_skipped_next_generation ----

    #[tokio::test]
    async fn unchanged_goals_are_skipped_next_generation() {
        let director = Director::default();
        let runs = counter();
        {
            let runs = Arc::clone(&runs);
            define(&director, "leaf", move |ctx| {
                let runs = Arc::clone(&runs);
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    ctx.is().not().modified();
                    Ok(json!("leaf"))
                }
                .boxed()
            });
        }
        director.want(["leaf"]).await.unwrap();
        director.reset();
        let again = director.want(["leaf"]).await.unwrap();
        assert_eq!(again, vec![json!("leaf")]);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        let info = director.progress("Test::leaf").unwrap();
        assert_eq!(info.status, BuildStatus::Finished);
        assert!(!info.volatile);
    }

    // ---- 11. journal_skips_failed_goals ----

    #[tokio::test]
    async fn journal_skips_failed_goals() {
        let director = Director::default();
        define(&director, "good", |_| async { Ok(json!(1)) }.boxed());
        define(&director, "bad", |_| async { Err(anyhow::anyhow!("nope")) }.boxed());
        let _ = director.want(["good", "bad"]).await;

        let doc = director.to_json();
        let entries = doc["entries"].as_object().unwrap();
        assert!(entries.contains_key("Test::good"));
        assert!(!entries.contains_key("Test::bad"));

        let fresh = Director::default();
        assert!(fresh.from_json(&doc));
        assert_eq!(fresh.progress("Test::good").unwrap().result, Some(json!(1)));

        let mut stale = doc.clone();
        stale["journalVersion"] = json!(crate::journal::JOURNAL_VERSION + 1);
        let other = Director::default();
        assert!(!other.from_json(&stale));
        assert!(other.progress("Test::good").is_none());
    }

    // ---- 12. new_generation_follows_highest_revision ----

    #[tokio::test]
    async fn new_generation_follows_highest_revision() {
        let director = Director::default();
        let doc = json!({
            "journalVersion": crate::journal::JOURNAL_VERSION,
            "entries": {
                "Test::old": {
                    "id": "Test::old",
                    "volatile": false,
                    "result": 5,
                    "lastReturnedSameTrack": false,
                    "dependencies": [],
                    "revision": 41
                }
            }
        });
        assert!(director.from_json(&doc));
        define(&director, "new", |_| async { Ok(Value::Null) }.boxed());
        director.want(["new"]).await.unwrap();
        assert_eq!(director.build_rev(), 42);
        assert_eq!(director.progress("Test::new").unwrap().revision, 42);
    }

    // ---- 13. tracked_values_decide_modification ----

    #[tokio::test]
    async fn tracked_values_decide_modification() {
        let director = Director::default();
        let input = Arc::new(AtomicUsize::new(1));
        let source = {
            let input = Arc::clone(&input);
            define_cutoff(&director, "source", move |ctx| {
                let value = input.load(Ordering::SeqCst);
                async move {
                    ctx.track_modification(json!(value));
                    Ok(json!("constant"))
                }
                .boxed()
            })
        };
        let runs = counter();
        {
            let runs = Arc::clone(&runs);
            define(&director, "sink", move |ctx| {
                let source = source.clone();
                let runs = Arc::clone(&runs);
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    ctx.need([&source]).await?;
                    Ok(Value::Null)
                }
                .boxed()
            });
        }

        director.want(["sink"]).await.unwrap();
        director.reset();
        director.want(["sink"]).await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(director.progress("Test::source").unwrap().tracking, Some(json!(1)));

        input.store(2, Ordering::SeqCst);
        director.reset();
        director.want(["sink"]).await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    // ---- 14. undecided_builds_bump_revision ----

    #[tokio::test]
    async fn undecided_builds_bump_revision() {
        let director = Director::default();
        define_cutoff(&director, "plain", |_| async { Ok(json!(0)) }.boxed());
        director.want(["plain"]).await.unwrap();
        let first = director.progress("Test::plain").unwrap().revision;
        director.reset();
        director.want(["plain"]).await.unwrap();
        let second = director.progress("Test::plain").unwrap().revision;
        assert!(second > first);
    }

    // ---- 15. invalidation_clears_earlier_failures ----

    #[tokio::test]
    async fn invalidation_clears_earlier_failures() {
        let director = Director::default();
        define(&director, "bad", |_| async { Err(anyhow::anyhow!("nope")) }.boxed());
        define(&director, "good", |_| async { Ok(json!("ok")) }.boxed());

        assert!(director.want(["bad"]).await.is_err());
        director.invalidate_journal();
        assert_eq!(director.want(["good"]).await.unwrap(), vec![json!("ok")]);
    }

    // ---- 16. staleness_checked_once_per_generation ----

    /// Always stale; counts and delays its staleness checks.
    struct SlowCheckRule {
        base: RuleBase,
        checks: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Rule for SlowCheckRule {
        fn kind(&self) -> &str {
            "Test"
        }

        fn match_string(&self, name: &str) -> Option<MatchResult> {
            self.base.match_string(name)
        }

        fn match_goal_id(&self, id: &str, args: &[String]) -> Option<MatchResult> {
            self.base.match_goal_id(id, args)
        }

        async fn build(&self, _ctx: &BuildContext, _args: &[String]) -> anyhow::Result<Value> {
            Ok(json!("shared"))
        }

        async fn pre_build(
            &self,
            _ctx: &PreBuildContext,
            _args: &[String],
        ) -> anyhow::Result<PreBuildResult> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(PreBuildResult::Yes)
        }
    }

    #[tokio::test]
    async fn staleness_checked_once_per_generation() {
        let director = Director::default();
        let checks = counter();
        let matcher: Arc<dyn GoalMatcher> =
            Arc::new(KindMatcher::new("Test::", ExactMatcher::new("shared")));
        let m = matcher.create_goal_id(&[]).unwrap();
        let rule: Arc<dyn Rule> = Arc::new(SlowCheckRule {
            base: RuleBase::new(matcher),
            checks: Arc::clone(&checks),
        });
        director.add_rule(Arc::clone(&rule));
        let shared = Goal {
            id: m.id,
            args: m.args,
            rule,
        };

        let names: Vec<String> = (0..4).map(|i| format!("user{i}")).collect();
        for name in &names {
            let shared = shared.clone();
            define(&director, name, move |ctx| {
                let shared = shared.clone();
                async move {
                    ctx.need([&shared]).await?;
                    Ok(Value::Null)
                }
                .boxed()
            });
        }

        director.want(names.iter()).await.unwrap();
        assert_eq!(checks.load(Ordering::SeqCst), 1);

        // Every user now walks its recorded dependency on `shared` before
        // rebuilding and needing it again.
        director.reset();
        director.want(names.iter()).await.unwrap();
        assert_eq!(checks.load(Ordering::SeqCst), 2);
    }
}
