//! Build event sink.
//!
//! The engine never prints. Front ends implement [`Reporter`] to turn
//! lifecycle events into console output, logs, or progress bars.

use crate::error::EngineError;

/// Receives build lifecycle events. Every method defaults to a no-op.
///
/// Only user-visible goals produce start/end/halt/skip events.
pub trait Reporter: Send + Sync {
    /// A goal's recipe is about to run.
    fn target_start(&self, _id: &str) {}

    /// A goal's recipe finished successfully.
    fn target_end(&self, _id: &str) {}

    /// A goal's recipe failed.
    fn target_error(&self, _id: &str, _error: &EngineError) {}

    /// A goal released its slot to wait (for capacity or dependencies).
    fn target_halt(&self, _id: &str) {}

    /// A goal reacquired its slot.
    fn target_unhalt(&self, _id: &str) {}

    /// A goal was found up to date and not rebuilt.
    fn target_skip(&self, _id: &str) {}

    /// Informational message worth showing at default verbosity.
    fn note(&self, _message: &str) {}

    /// Diagnostic detail, e.g. why a goal was rebuilt.
    fn debug(&self, _message: &str) {}
}

/// A reporter that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct QuietReporter;

impl Reporter for QuietReporter {}
