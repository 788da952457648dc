//! Goals, goal references, and recorded dependency edges.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::progress::Progress;
use crate::rule::Rule;

/// A dependency edge recorded by a recipe, as stored in the journal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    /// Canonical goal id.
    pub id: String,
    /// Construction arguments of the goal.
    #[serde(default)]
    pub args: Vec<String>,
}

/// Outcome of a successful matcher lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// Canonical goal id.
    pub id: String,
    /// Arguments needed to recreate the goal.
    pub args: Vec<String>,
    /// Arguments handed to the recipe.
    pub exec_args: Vec<String>,
}

impl MatchResult {
    /// A match whose recipe arguments are the construction arguments.
    pub fn new(id: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            id: id.into(),
            exec_args: args.clone(),
            args,
        }
    }
}

/// A concrete, buildable unit: an id, its arguments, and the rule that owns it.
#[derive(Clone)]
pub struct Goal {
    /// Canonical goal id.
    pub id: String,
    /// Construction arguments.
    pub args: Vec<String>,
    /// The rule that builds this goal.
    pub rule: Arc<dyn Rule>,
}

impl Goal {
    /// The journal representation of this goal.
    pub fn dependency(&self) -> Dependency {
        Dependency {
            id: self.id.clone(),
            args: self.args.clone(),
        }
    }
}

impl fmt::Debug for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Goal")
            .field("id", &self.id)
            .field("args", &self.args)
            .field("kind", &self.rule.kind())
            .finish()
    }
}

/// Anything a recipe or caller may ask the director to build.
///
/// Results come back in the same shape: a [`GoalRef::List`] yields a JSON
/// array and [`GoalRef::None`] yields `null`.
#[derive(Debug, Clone)]
pub enum GoalRef {
    /// Free text resolved through the rules' string matchers.
    Name(String),
    /// A goal constructed by a factory.
    Goal(Goal),
    /// A nested list of references.
    List(Vec<GoalRef>),
    /// Nothing to build.
    None,
}

impl From<&str> for GoalRef {
    fn from(name: &str) -> Self {
        GoalRef::Name(name.to_string())
    }
}

impl From<String> for GoalRef {
    fn from(name: String) -> Self {
        GoalRef::Name(name)
    }
}

impl From<&String> for GoalRef {
    fn from(name: &String) -> Self {
        GoalRef::Name(name.clone())
    }
}

impl From<Goal> for GoalRef {
    fn from(goal: Goal) -> Self {
        GoalRef::Goal(goal)
    }
}

impl From<&Goal> for GoalRef {
    fn from(goal: &Goal) -> Self {
        GoalRef::Goal(goal.clone())
    }
}

impl<T: Into<GoalRef>> From<Vec<T>> for GoalRef {
    fn from(items: Vec<T>) -> Self {
        GoalRef::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<GoalRef>> From<Option<T>> for GoalRef {
    fn from(item: Option<T>) -> Self {
        item.map_or(GoalRef::None, Into::into)
    }
}

/// A goal bound to its cached progress record.
///
/// There is exactly one objective per goal id for the lifetime of a
/// director (until the journal is invalidated).
pub struct Objective {
    pub(crate) goal: Goal,
    pub(crate) exec_args: Vec<String>,
    pub(crate) progress: Arc<Progress>,
}

impl Objective {
    /// The canonical goal id.
    pub fn id(&self) -> &str {
        &self.goal.id
    }

    /// The goal this objective builds.
    pub fn goal(&self) -> &Goal {
        &self.goal
    }

    /// Arguments passed to the recipe.
    pub fn exec_args(&self) -> &[String] {
        &self.exec_args
    }

    /// The goal's progress record.
    pub fn progress(&self) -> &Arc<Progress> {
        &self.progress
    }
}

impl fmt::Debug for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Objective")
            .field("goal", &self.goal)
            .field("exec_args", &self.exec_args)
            .finish_non_exhaustive()
    }
}
