//! Error type shared by every build operation.
//!
//! Build outcomes are cached on each goal's progress record and handed to
//! every waiter, so the error must be cheap to clone. Recipe failures carry
//! the underlying [`anyhow::Error`] behind an `Arc`.

use std::sync::Arc;

/// Errors produced while resolving or building goals.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// No registered rule accepts the requested name.
    #[error("building rule for '{name}' is not found")]
    RuleNotFound {
        /// The name or goal id that failed to resolve.
        name: String,
    },

    /// Two different rules claimed the same goal id.
    #[error("rule for '{id}' is already registered with a different rule")]
    RuleConflict {
        /// The contested goal id.
        id: String,
    },

    /// A goal transitively requested itself while building.
    #[error("circular dependency when building {id}, depending on {dependency}")]
    Circular {
        /// The goal whose recipe made the offending request.
        id: String,
        /// The requested goal that leads back to `id`.
        dependency: String,
    },

    /// The goal was never started because another goal failed earlier.
    #[error("build of {id} cancelled after an earlier failure")]
    Cancelled {
        /// The cancelled goal id.
        id: String,
    },

    /// A recipe returned an error.
    #[error("{id}: {error:#}")]
    Recipe {
        /// The goal whose recipe failed.
        id: String,
        /// The recipe's own error.
        error: Arc<anyhow::Error>,
    },

    /// A goal could not be constructed from the given arguments.
    #[error("invalid goal: {reason}")]
    InvalidGoal {
        /// Human-readable description of the problem.
        reason: String,
    },
}

impl EngineError {
    /// Wrap a recipe failure for goal `id`.
    ///
    /// Errors that already are an [`EngineError`] (for instance a
    /// dependency's failure propagated with `?`) are recovered as-is, so a
    /// cycle or cancellation keeps its kind all the way up.
    pub fn from_recipe(id: &str, error: anyhow::Error) -> Self {
        match error.downcast::<EngineError>() {
            Ok(engine) => engine,
            Err(error) => EngineError::Recipe {
                id: id.to_string(),
                error: Arc::new(error),
            },
        }
    }

    /// Returns `true` if this is a cancellation caused by another failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Returns `true` if this error reports a dependency cycle.
    pub fn is_circular(&self) -> bool {
        matches!(self, Self::Circular { .. })
    }
}

/// Convenience alias used throughout the engine.
pub type Result<T, E = EngineError> = std::result::Result<T, E>;
