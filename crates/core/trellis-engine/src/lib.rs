//! Incremental build engine for Trellis.
//!
//! Goals are matched by rules, built by async recipes, and cached across
//! runs through a JSON journal. Each run is a *generation*: a goal is
//! rebuilt at most once per generation, and only when its staleness check
//! says so. Recipes discover their dependencies while running; the engine
//! records them and consults them on the next generation.
//!
//! The moving parts:
//! - [`Director`] resolves goals and drives the build protocol;
//! - [`Rule`] is the contract every goal family implements;
//! - [`BuildContext`] and [`PreBuildContext`] are what recipes and
//!   staleness checks see;
//! - [`Arbitrator`] bounds how many recipes run at once;
//! - [`journal`] defines the persisted format.

pub mod arbitrator;
pub mod context;
pub mod director;
pub mod error;
pub mod goal;
pub mod journal;
pub mod matcher;
pub mod progress;
pub mod reporter;
pub mod rule;

pub use arbitrator::Arbitrator;
pub use context::{BuildContext, BuildFlags, NotFlags, PreBuildContext};
pub use director::Director;
pub use error::{EngineError, Result};
pub use goal::{Dependency, Goal, GoalRef, MatchResult, Objective};
pub use journal::{JOURNAL_VERSION, Journal, JournalEntry};
pub use progress::{BuildStatus, PreBuildStatus, Progress, ProgressInfo};
pub use reporter::{QuietReporter, Reporter};
pub use rule::{PreBuildResult, Rule, RuleBase};

/// Re-exported so rule implementations use the same version.
pub use async_trait::async_trait;
