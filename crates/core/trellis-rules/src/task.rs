//! Side-effecting rules: tasks and phony goals.

use async_trait::async_trait;
use serde_json::Value;
use trellis_engine::{
    BuildContext, MatchResult, PreBuildContext, PreBuildResult, Rule, RuleBase,
};

use crate::recipe::Recipe;

/// A task: rebuilt when volatile or when a dependency changed.
///
/// Every run counts as a modification, so dependents compare revisions.
pub struct TaskRule {
    base: RuleBase,
    recipe: Recipe,
}

impl TaskRule {
    /// A task rule running `recipe`.
    pub fn new(base: RuleBase, recipe: Recipe) -> Self {
        Self { base, recipe }
    }
}

#[async_trait]
impl Rule for TaskRule {
    fn kind(&self) -> &str {
        "Builtin::Task"
    }

    fn is_user(&self) -> bool {
        self.base.is_user()
    }

    fn match_string(&self, name: &str) -> Option<MatchResult> {
        self.base.match_string(name)
    }

    fn match_goal_id(&self, id: &str, args: &[String]) -> Option<MatchResult> {
        self.base.match_goal_id(id, args)
    }

    async fn build(&self, ctx: &BuildContext, args: &[String]) -> anyhow::Result<Value> {
        let result = (self.recipe)(ctx.clone(), args.to_vec()).await?;
        ctx.is().modified();
        Ok(result)
    }

    async fn pre_build(
        &self,
        ctx: &PreBuildContext,
        _args: &[String],
    ) -> anyhow::Result<PreBuildResult> {
        if ctx.is_volatile() || ctx.dependency_modified().await {
            Ok(PreBuildResult::Yes)
        } else {
            Ok(PreBuildResult::Time)
        }
    }
}

/// A phony goal: always rebuilt.
pub struct PhonyRule {
    base: RuleBase,
    recipe: Recipe,
}

impl PhonyRule {
    /// A phony rule running `recipe`.
    pub fn new(base: RuleBase, recipe: Recipe) -> Self {
        Self { base, recipe }
    }
}

#[async_trait]
impl Rule for PhonyRule {
    fn kind(&self) -> &str {
        "Builtin::Phony"
    }

    fn is_user(&self) -> bool {
        self.base.is_user()
    }

    fn match_string(&self, name: &str) -> Option<MatchResult> {
        self.base.match_string(name)
    }

    fn match_goal_id(&self, id: &str, args: &[String]) -> Option<MatchResult> {
        self.base.match_goal_id(id, args)
    }

    async fn build(&self, ctx: &BuildContext, args: &[String]) -> anyhow::Result<Value> {
        let result = (self.recipe)(ctx.clone(), args.to_vec()).await?;
        ctx.is().modified();
        Ok(result)
    }

    async fn pre_build(
        &self,
        _ctx: &PreBuildContext,
        _args: &[String],
    ) -> anyhow::Result<PreBuildResult> {
        Ok(PreBuildResult::Yes)
    }
}
