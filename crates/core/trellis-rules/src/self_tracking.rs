//! The self-tracking goal: detects that the build definition itself changed.
//!
//! A session builds this goal before anything else. When it is rebuilt and
//! changed, every cached result was produced by a different definition, so
//! the session throws the journal away.

use async_trait::async_trait;
use serde_json::Value;
use trellis_engine::{
    BuildContext, MatchResult, PreBuildContext, PreBuildResult, Rule, RuleBase,
};

use crate::recipe::Recipe;

/// Kind prefix of self-tracking goals.
pub const SELF_TRACKING_PREFIX: &str = "Meta::SelfTracking::";

/// Rebuilt only when volatile or when the tracked definition changed.
pub struct SelfTrackingRule {
    base: RuleBase,
    recipe: Recipe,
}

impl SelfTrackingRule {
    /// A self-tracking rule running `recipe`.
    pub fn new(base: RuleBase, recipe: Recipe) -> Self {
        Self { base, recipe }
    }
}

#[async_trait]
impl Rule for SelfTrackingRule {
    fn kind(&self) -> &str {
        "Meta::SelfTracking"
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
            ctx.cutoff_early().await?;
            Ok(PreBuildResult::Yes)
        } else {
            Ok(PreBuildResult::No)
        }
    }
}
