//! Built-in rule kinds and sessions for the Trellis build engine.
//!
//! Everything here is an ordinary client of [`trellis_engine::Rule`]:
//! - [`oracle`]: value-producing rules with early cutoff;
//! - [`task`]: side-effecting tasks and phony goals;
//! - [`file`]: content-tracked files and existence probes;
//! - [`self_tracking`]: invalidation when the build definition changes;
//! - [`factory`]: declaring rules and minting goals;
//! - [`session`]: journal persistence around a director.

pub mod config;
pub mod factory;
pub mod file;
pub mod oracle;
pub mod recipe;
pub mod self_tracking;
pub mod session;
pub mod task;

pub use config::{DEFAULT_JOURNAL, SessionConfig};
pub use factory::{GoalFactory, KindBuilder, RuleKind, RuleSet};
pub use file::{FileRules, FileStat};
pub use recipe::{Recipe, recipe};
pub use session::Session;
