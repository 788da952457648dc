//! Value-producing rules: oracles and computed goals.
//!
//! Both kinds compare the new result against the previous one and report a
//! modification only when the value changed. Dependents therefore rebuild
//! only when the *value* moves, not merely because the recipe ran.
//!
//! They differ in how eagerly they re-run:
//! - an oracle always re-runs its recipe (it observes the outside world);
//! - a computed goal re-runs only when volatile or when a dependency changed.

use async_trait::async_trait;
use serde_json::Value;
use trellis_engine::{
    BuildContext, MatchResult, PreBuildContext, PreBuildResult, Rule, RuleBase,
};

use crate::recipe::Recipe;

/// Oracle or computed rule.
pub struct OracleRule {
    base: RuleBase,
    kind: &'static str,
    always_check: bool,
    recipe: Recipe,
}

impl OracleRule {
    /// An oracle: re-evaluated every generation.
    pub fn oracle(base: RuleBase, recipe: Recipe) -> Self {
        Self {
            base,
            kind: "Builtin::Oracle",
            always_check: true,
            recipe,
        }
    }

    /// A computed value: re-evaluated only when its inputs changed.
    pub fn computed(base: RuleBase, recipe: Recipe) -> Self {
        Self {
            base,
            kind: "Builtin::Computed",
            always_check: false,
            recipe,
        }
    }
}

#[async_trait]
impl Rule for OracleRule {
    fn kind(&self) -> &str {
        self.kind
    }

    fn is_user(&self) -> bool {
        self.base.is_user()
    }

    fn match_string(&self, _name: &str) -> Option<MatchResult> {
        None
    }

    fn match_goal_id(&self, id: &str, args: &[String]) -> Option<MatchResult> {
        self.base.match_goal_id(id, args)
    }

    async fn build(&self, ctx: &BuildContext, args: &[String]) -> anyhow::Result<Value> {
        let result = (self.recipe)(ctx.clone(), args.to_vec()).await?;
        if ctx.last_result().as_ref() == Some(&result) {
            ctx.is().not().modified();
        } else {
            ctx.is().modified();
        }
        Ok(result)
    }

    async fn pre_build(
        &self,
        ctx: &PreBuildContext,
        _args: &[String],
    ) -> anyhow::Result<PreBuildResult> {
        let triggered = ctx.dependency_modified().await;
        if !(self.always_check || ctx.is_volatile() || triggered) {
            return Ok(PreBuildResult::No);
        }
        Ok(if ctx.cutoff_early().await? {
            PreBuildResult::Yes
        } else {
            PreBuildResult::No
        })
    }
}
