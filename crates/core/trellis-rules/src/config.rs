//! Session configuration.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

/// Journal file name created in the project root by default.
pub const DEFAULT_JOURNAL: &str = ".trellis-journal";

/// Settings a [`Session`](crate::Session) is created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Project root; relative paths are resolved against it.
    pub root: PathBuf,
    /// Journal file, or `None` to build without persistence.
    pub journal: Option<PathBuf>,
    /// The build definition file, tracked for self-invalidation.
    pub rule_file: Option<PathBuf>,
    /// Maximum concurrent user recipes; `0` means one per CPU.
    pub jobs: usize,
}

impl SessionConfig {
    /// Defaults for a project rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            journal: Some(root.join(DEFAULT_JOURNAL)),
            rule_file: None,
            jobs: 0,
            root,
        }
    }

    /// Use `path` (relative to the root) as the journal.
    #[must_use]
    pub fn with_journal(mut self, path: impl AsRef<Path>) -> Self {
        self.journal = Some(self.root.join(path));
        self
    }

    /// Disable the journal.
    #[must_use]
    pub fn without_journal(mut self) -> Self {
        self.journal = None;
        self
    }

    /// Track `path` (relative to the root) as the build definition.
    #[must_use]
    pub fn with_rule_file(mut self, path: impl AsRef<Path>) -> Self {
        self.rule_file = Some(self.root.join(path));
        self
    }

    /// Set the job limit; `0` means one per CPU.
    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    /// The job limit with `0` resolved to the available parallelism.
    pub fn effective_jobs(&self) -> usize {
        if self.jobs > 0 {
            self.jobs
        } else {
            std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
        }
    }
}
