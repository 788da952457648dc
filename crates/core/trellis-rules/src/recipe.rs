//! Recipe closures.

use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use trellis_engine::BuildContext;

/// A goal's build function: receives the context and the matched arguments.
pub type Recipe =
    Arc<dyn Fn(BuildContext, Vec<String>) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Box an async closure into a [`Recipe`].
///
/// ```ignore
/// let r = recipe(|ctx, _args| async move {
///     let deps = ctx.need(["codegen"]).await?;
///     Ok(deps[0].clone())
/// });
/// ```
pub fn recipe<F, Fut>(f: F) -> Recipe
where
    F: Fn(BuildContext, Vec<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(move |ctx, args| f(ctx, args).boxed())
}
