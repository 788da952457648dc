//! Console output for build events.
//!
//! Three output levels controlled by CLI flags:
//! - **Quiet** (`-q`): errors only
//! - **Normal** (no flag): goals started and finished, notes, errors
//! - **Verbose** (`-v`): also fresh goals, slot waits, commands, and
//!   staleness reasons

use trellis_engine::{EngineError, Reporter};

/// How much a [`ConsoleReporter`] prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

impl Verbosity {
    /// The level selected by `-q` / `-v`.
    pub fn from_flags(quiet: bool, verbose: bool) -> Self {
        match (quiet, verbose) {
            (true, _) => Verbosity::Quiet,
            (false, true) => Verbosity::Verbose,
            (false, false) => Verbosity::Normal,
        }
    }
}

/// Prints build events to stdout, errors to stderr.
pub struct ConsoleReporter {
    verbosity: Verbosity,
}

impl ConsoleReporter {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    /// Whether lines of `level` are printed.
    fn shows(&self, level: Verbosity) -> bool {
        self.verbosity >= level
    }

    fn line(&self, level: Verbosity, text: &str) {
        if self.shows(level) {
            println!("{text}");
        }
    }

    fn goal_line(&self, level: Verbosity, verb: &str, id: &str) {
        if self.shows(level) {
            println!("  {verb:<8} {}", display_name(id));
        }
    }
}

impl Reporter for ConsoleReporter {
    fn target_start(&self, id: &str) {
        self.goal_line(Verbosity::Normal, "Building", id);
    }

    fn target_end(&self, id: &str) {
        self.goal_line(Verbosity::Normal, "Finished", id);
    }

    fn target_error(&self, id: &str, error: &EngineError) {
        if !error.is_cancelled() {
            eprintln!("error: {} failed: {error}", display_name(id));
        }
    }

    fn target_halt(&self, id: &str) {
        self.goal_line(Verbosity::Verbose, "Waiting", id);
    }

    fn target_unhalt(&self, id: &str) {
        self.goal_line(Verbosity::Verbose, "Resumed", id);
    }

    fn target_skip(&self, id: &str) {
        self.goal_line(Verbosity::Verbose, "Fresh", id);
    }

    fn note(&self, message: &str) {
        self.line(Verbosity::Normal, message);
    }

    fn debug(&self, message: &str) {
        self.line(Verbosity::Verbose, &format!("  [debug] {message}"));
    }
}

/// `Builtin::Task::app` -> `app`. Ids without a built-in prefix are kept.
fn display_name(id: &str) -> &str {
    id.strip_prefix("Builtin::")
        .and_then(|rest| rest.split_once("::"))
        .map_or(id, |(_, name)| name)
}
