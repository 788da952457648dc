//! Rule registration and goal factories.
//!
//! Each user rule kind can be declared four ways:
//!
//! | Shape    | Matches                        | Goal ids                     |
//! |----------|--------------------------------|------------------------------|
//! | `exact`  | one name                       | `<kind prefix><name>`        |
//! | `glob`   | names matching a glob          | `<kind prefix><name>`        |
//! | `group`  | names under `<group>::`        | `<kind prefix><group>::<name>` |
//! | `make`   | never free text                | `<kind prefix><name_fn(args)>` |

use std::sync::Arc;

use trellis_engine::matcher::{
    AlwaysMatcher, ExactMatcher, GlobMatcher, GoalMatcher, KindMatcher, MakeMatcher,
    PrefixMatcher,
};
use trellis_engine::{Director, EngineError, Goal, Rule, RuleBase};

use crate::oracle::OracleRule;
use crate::recipe::Recipe;
use crate::self_tracking::{SELF_TRACKING_PREFIX, SelfTrackingRule};
use crate::task::{PhonyRule, TaskRule};

/// User-declarable rule kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    /// Re-evaluated every generation; dependents rebuild only on value change.
    Oracle,
    /// Re-evaluated when inputs change; dependents rebuild only on value change.
    Computed,
    /// Side-effecting work, rebuilt when inputs change.
    Task,
    /// Always rebuilt.
    Phony,
}

impl RuleKind {
    /// Prefix prepended to goal ids of this kind.
    pub fn prefix(self) -> &'static str {
        match self {
            RuleKind::Oracle => "Builtin::Oracle::",
            RuleKind::Computed => "Builtin::Computed::",
            RuleKind::Task => "Builtin::Task::",
            RuleKind::Phony => "Builtin::Phony::",
        }
    }

    fn rule(self, base: RuleBase, recipe: Recipe) -> Arc<dyn Rule> {
        match self {
            RuleKind::Oracle => Arc::new(OracleRule::oracle(base, recipe)),
            RuleKind::Computed => Arc::new(OracleRule::computed(base, recipe)),
            RuleKind::Task => Arc::new(TaskRule::new(base, recipe)),
            RuleKind::Phony => Arc::new(PhonyRule::new(base, recipe)),
        }
    }
}

/// Mints goals for one registered rule.
#[derive(Clone)]
pub struct GoalFactory {
    matcher: Arc<dyn GoalMatcher>,
    rule: Arc<dyn Rule>,
}

impl GoalFactory {
    /// Factory for goals of `rule`, named through `matcher`.
    pub fn new(matcher: Arc<dyn GoalMatcher>, rule: Arc<dyn Rule>) -> Self {
        Self { matcher, rule }
    }

    /// The goal named `name`.
    pub fn goal(&self, name: &str) -> Result<Goal, EngineError> {
        self.goal_with(&[name.to_string()])
    }

    /// The goal denoted by `args`.
    pub fn goal_with(&self, args: &[String]) -> Result<Goal, EngineError> {
        let m = self.matcher.create_goal_id(args)?;
        Ok(Goal {
            id: m.id,
            args: m.args,
            rule: Arc::clone(&self.rule),
        })
    }

    /// The registered rule.
    pub fn rule(&self) -> &Arc<dyn Rule> {
        &self.rule
    }
}

/// Declares rules on a director.
#[derive(Clone)]
pub struct RuleSet {
    director: Director,
}

impl RuleSet {
    /// Declare rules on `director`.
    pub fn new(director: Director) -> Self {
        Self { director }
    }

    /// Builder for rules of `kind`.
    pub fn kind(&self, kind: RuleKind) -> KindBuilder<'_> {
        KindBuilder {
            director: &self.director,
            kind,
        }
    }

    /// An exact-named oracle.
    pub fn oracle(&self, name: &str, recipe: Recipe) -> Goal {
        self.kind(RuleKind::Oracle).exact(name, recipe)
    }

    /// An exact-named computed value.
    pub fn computed(&self, name: &str, recipe: Recipe) -> Goal {
        self.kind(RuleKind::Computed).exact(name, recipe)
    }

    /// An exact-named task.
    pub fn task(&self, name: &str, recipe: Recipe) -> Goal {
        self.kind(RuleKind::Task).exact(name, recipe)
    }

    /// An exact-named phony goal.
    pub fn phony(&self, name: &str, recipe: Recipe) -> Goal {
        self.kind(RuleKind::Phony).exact(name, recipe)
    }

    /// The internal self-tracking goal `name`.
    pub fn self_tracking(&self, name: &str, recipe: Recipe) -> Goal {
        let matcher: Arc<dyn GoalMatcher> =
            Arc::new(KindMatcher::new(SELF_TRACKING_PREFIX, ExactMatcher::new(name)));
        let rule: Arc<dyn Rule> =
            Arc::new(SelfTrackingRule::new(RuleBase::internal(matcher), recipe));
        self.director.add_rule(Arc::clone(&rule));
        Goal {
            id: format!("{SELF_TRACKING_PREFIX}{name}"),
            args: Vec::new(),
            rule,
        }
    }
}

/// Registers rules of one kind.
pub struct KindBuilder<'a> {
    director: &'a Director,
    kind: RuleKind,
}

impl KindBuilder<'_> {
    /// A single goal called `name`.
    pub fn exact(&self, name: &str, recipe: Recipe) -> Goal {
        let factory = self.register(ExactMatcher::new(name), recipe);
        Goal {
            id: format!("{}{name}", self.kind.prefix()),
            args: Vec::new(),
            rule: factory.rule,
        }
    }

    /// Every name matching `pattern`. The recipe receives the name and the
    /// wildcard captures.
    pub fn glob(&self, pattern: &str, recipe: Recipe) -> Result<GoalFactory, EngineError> {
        Ok(self.register(GlobMatcher::new(pattern)?, recipe))
    }

    /// Every name under `group::`. The recipe receives the part after the prefix.
    pub fn group(&self, group: &str, recipe: Recipe) -> GoalFactory {
        self.register(PrefixMatcher::new(format!("{group}::"), AlwaysMatcher), recipe)
    }

    /// Goals named by `name_fn` from exactly `arity` arguments.
    pub fn make<F>(&self, arity: usize, name_fn: F, recipe: Recipe) -> GoalFactory
    where
        F: Fn(&[String]) -> String + Send + Sync + 'static,
    {
        self.register(MakeMatcher::new(arity, name_fn), recipe)
    }

    fn register(&self, matcher: impl GoalMatcher + 'static, recipe: Recipe) -> GoalFactory {
        let matcher: Arc<dyn GoalMatcher> = Arc::new(KindMatcher::new(self.kind.prefix(), matcher));
        let rule = self.kind.rule(RuleBase::new(Arc::clone(&matcher)), recipe);
        self.director.add_rule(Arc::clone(&rule));
        GoalFactory::new(matcher, rule)
    }
}
