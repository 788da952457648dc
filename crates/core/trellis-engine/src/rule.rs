//! The rule contract: how a family of goals is matched, checked, and built.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::{BuildContext, PreBuildContext};
use crate::goal::MatchResult;
use crate::matcher::GoalMatcher;
use crate::progress::ProgressInfo;

/// Verdict of a staleness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreBuildResult {
    /// Up to date and unchanged.
    No,
    /// Up to date; dependents decide by comparing revisions.
    Time,
    /// Must be rebuilt, or was already rebuilt and changed.
    Yes,
}

/// A family of goals sharing a matcher, a recipe shape, and a staleness policy.
#[async_trait]
pub trait Rule: Send + Sync {
    /// Human-readable kind, e.g. `Builtin::Task`.
    fn kind(&self) -> &str;

    /// Whether goals of this rule are user-visible and occupy a capacity slot.
    fn is_user(&self) -> bool {
        true
    }

    /// Match free text.
    fn match_string(&self, name: &str) -> Option<MatchResult>;

    /// Match a canonical goal id with its arguments.
    fn match_goal_id(&self, id: &str, args: &[String]) -> Option<MatchResult>;

    /// Produce the goal's value.
    async fn build(&self, ctx: &BuildContext, args: &[String]) -> anyhow::Result<Value>;

    /// Decide whether the goal must be rebuilt.
    ///
    /// An error is treated as [`PreBuildResult::Yes`].
    async fn pre_build(&self, ctx: &PreBuildContext, args: &[String])
    -> anyhow::Result<PreBuildResult>;

    /// Whether a change in `this` (a dependency) should rebuild `that`.
    fn should_trigger_modify(
        &self,
        itself_modified: bool,
        _this: &ProgressInfo,
        _that: &ProgressInfo,
    ) -> bool {
        itself_modified
    }
}

/// `true` if both handles point at the same rule instance.
pub(crate) fn same_rule(a: &Arc<dyn Rule>, b: &Arc<dyn Rule>) -> bool {
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}

/// Matcher plumbing shared by concrete rules.
///
/// Rules hold one of these as a plain field and forward the matching half of
/// [`Rule`] to it.
#[derive(Clone)]
pub struct RuleBase {
    matcher: Arc<dyn GoalMatcher>,
    is_user: bool,
}

impl RuleBase {
    /// A user-visible rule backed by `matcher`.
    pub fn new(matcher: Arc<dyn GoalMatcher>) -> Self {
        Self {
            matcher,
            is_user: true,
        }
    }

    /// A bookkeeping rule that never occupies a capacity slot.
    pub fn internal(matcher: Arc<dyn GoalMatcher>) -> Self {
        Self {
            matcher,
            is_user: false,
        }
    }

    /// The shared matcher.
    pub fn matcher(&self) -> &Arc<dyn GoalMatcher> {
        &self.matcher
    }

    /// See [`Rule::is_user`].
    pub fn is_user(&self) -> bool {
        self.is_user
    }

    /// See [`Rule::match_string`].
    pub fn match_string(&self, name: &str) -> Option<MatchResult> {
        self.matcher.match_string(name)
    }

    /// See [`Rule::match_goal_id`].
    pub fn match_goal_id(&self, id: &str, args: &[String]) -> Option<MatchResult> {
        self.matcher.match_goal_id(id, args)
    }
}
