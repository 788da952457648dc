//! Per-goal build state.
//!
//! A [`Progress`] lives for as long as the director's journal does. It
//! carries two kinds of state:
//! - persistent: result, revision, volatility, recorded dependencies, and
//!   tracking value, which survive across generations and into the journal;
//! - per generation: build status, staleness-check status, and the shared
//!   futures that make every concurrent caller observe a single build.

use futures::future::{BoxFuture, Shared};
use parking_lot::{Mutex, MutexGuard};
use serde_json::Value;
use tokio::sync::OwnedSemaphorePermit;

use crate::error::EngineError;
use crate::goal::Dependency;
use crate::journal::JournalEntry;
use crate::rule::PreBuildResult;

/// Shared handle to an in-flight build.
pub(crate) type SharedBuild = Shared<BoxFuture<'static, Result<Value, EngineError>>>;

/// Shared handle to an in-flight staleness check.
pub(crate) type SharedPreBuild = Shared<BoxFuture<'static, PreBuildResult>>;

/// Build status within the current generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    /// Not yet requested this generation.
    NotStarted,
    /// A build is in flight.
    Started,
    /// Built or found up to date.
    Finished,
    /// The build failed.
    Error,
}

/// Staleness-check status within the current generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreBuildStatus {
    /// No check yet.
    Unknown,
    /// A check is in flight.
    Checking,
    /// The check finished; see [`ProgressInfo::pre_build_result`].
    Decided,
}

/// Read-only snapshot of a goal's progress.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressInfo {
    /// Goal id.
    pub id: String,
    /// Whether the goal is user-visible.
    pub is_user: bool,
    /// Build status.
    pub status: BuildStatus,
    /// `true` while the goal waits on its dependencies with its slot released.
    pub halted: bool,
    /// Staleness-check status.
    pub pre_build_status: PreBuildStatus,
    /// Staleness verdict, meaningful once decided.
    pub pre_build_result: PreBuildResult,
    /// Whether the goal must be rebuilt regardless of its dependencies.
    pub volatile: bool,
    /// Generation of the last modifying build.
    pub revision: u64,
    /// Latest result.
    pub result: Option<Value>,
    /// Latest tracking value.
    pub tracking: Option<Value>,
    /// Dependency groups recorded by the latest build.
    pub dependencies: Vec<Vec<Dependency>>,
}

pub(crate) struct ProgressState {
    pub is_user: bool,
    pub status: BuildStatus,
    pub halts: usize,
    pub permit: Option<OwnedSemaphorePermit>,
    pub pre_build_status: PreBuildStatus,
    pub pre_build_result: PreBuildResult,
    pub dependencies: Vec<Vec<Dependency>>,
    pub volatile: bool,
    pub last_result: Option<Value>,
    pub result: Option<Value>,
    pub tracking: Option<Value>,
    pub revision: u64,
    /// Modification decision of the running build; `None` until decided.
    pub modified: Option<bool>,
    pub last_error: Option<EngineError>,
    pub build_future: Option<SharedBuild>,
    pub pre_build_future: Option<SharedPreBuild>,
}

/// Build state of a single goal.
pub struct Progress {
    id: String,
    state: Mutex<ProgressState>,
}

impl Progress {
    /// Fresh, volatile progress for `id`.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: Mutex::new(ProgressState {
                is_user: true,
                status: BuildStatus::NotStarted,
                halts: 0,
                permit: None,
                pre_build_status: PreBuildStatus::Unknown,
                pre_build_result: PreBuildResult::Yes,
                dependencies: Vec::new(),
                volatile: true,
                last_result: None,
                result: None,
                tracking: None,
                revision: 0,
                modified: None,
                last_error: None,
                build_future: None,
                pre_build_future: None,
            }),
        }
    }

    /// Goal id.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ProgressState> {
        self.state.lock()
    }

    /// Snapshot the current state.
    pub fn info(&self) -> ProgressInfo {
        let st = self.state.lock();
        ProgressInfo {
            id: self.id.clone(),
            is_user: st.is_user,
            status: st.status,
            halted: st.halts > 0,
            pre_build_status: st.pre_build_status,
            pre_build_result: st.pre_build_result,
            volatile: st.volatile,
            revision: st.revision,
            result: st.result.clone(),
            tracking: st.tracking.clone(),
            dependencies: st.dependencies.clone(),
        }
    }

    /// Generation of the last modifying build.
    pub fn revision(&self) -> u64 {
        self.state.lock().revision
    }

    /// Build status.
    pub fn status(&self) -> BuildStatus {
        self.state.lock().status
    }

    /// Whether the goal is user-visible.
    pub fn is_user(&self) -> bool {
        self.state.lock().is_user
    }

    pub(crate) fn set_user(&self, is_user: bool) {
        self.state.lock().is_user = is_user;
    }

    /// Forget everything tied to the current generation.
    ///
    /// Results, revisions, dependencies, and tracking values are kept.
    pub(crate) fn reset_build_status(&self) {
        let mut st = self.state.lock();
        st.status = BuildStatus::NotStarted;
        st.pre_build_status = PreBuildStatus::Unknown;
        st.pre_build_result = PreBuildResult::Yes;
        st.build_future = None;
        st.pre_build_future = None;
        st.last_error = None;
        st.modified = None;
        st.halts = 0;
        st.permit = None;
    }

    /// Record a successful build produced in generation `build_rev`.
    pub(crate) fn finish(&self, value: Value, build_rev: u64) {
        let mut st = self.state.lock();
        st.status = BuildStatus::Finished;
        st.result = Some(value);
        if st.modified.is_none() {
            st.revision = build_rev;
        }
    }

    /// Record a failed build.
    pub(crate) fn fail(&self, error: EngineError) {
        let mut st = self.state.lock();
        st.status = BuildStatus::Error;
        st.volatile = true;
        st.last_error = Some(error);
    }

    /// Record the staleness verdict.
    pub(crate) fn decide(&self, result: PreBuildResult) {
        let mut st = self.state.lock();
        st.pre_build_status = PreBuildStatus::Decided;
        st.pre_build_result = result;
    }

    /// Cached outcome of a settled build, if any.
    pub(crate) fn settled(&self) -> Option<Result<Value, EngineError>> {
        let st = self.state.lock();
        match st.status {
            BuildStatus::Finished => Some(Ok(st.result.clone().unwrap_or(Value::Null))),
            BuildStatus::Error => Some(Err(st.last_error.clone().unwrap_or_else(|| {
                EngineError::Cancelled {
                    id: self.id.clone(),
                }
            }))),
            BuildStatus::NotStarted | BuildStatus::Started => None,
        }
    }

    /// Journal form of this progress; `None` unless finished or untouched.
    pub(crate) fn to_entry(&self) -> Option<JournalEntry> {
        let st = self.state.lock();
        if !matches!(st.status, BuildStatus::Finished | BuildStatus::NotStarted) {
            return None;
        }
        let same_track = st.tracking.is_some() && st.tracking == st.result;
        Some(JournalEntry {
            id: self.id.clone(),
            volatile: st.volatile,
            result: st.result.clone(),
            last_returned_same_track: same_track,
            tracking: if same_track { None } else { st.tracking.clone() },
            dependencies: st.dependencies.clone(),
            revision: st.revision,
        })
    }

    /// Restore persistent state from the journal.
    pub(crate) fn apply_entry(&self, entry: &JournalEntry) {
        let mut st = self.state.lock();
        st.volatile = entry.volatile;
        st.result.clone_from(&entry.result);
        st.last_result.clone_from(&entry.result);
        st.tracking = if entry.last_returned_same_track {
            entry.result.clone()
        } else {
            entry.tracking.clone()
        };
        st.dependencies.clone_from(&entry.dependencies);
        st.revision = entry.revision;
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress")
            .field("id", &self.id)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_progress_is_volatile_and_unstarted() {
        let p = Progress::new("a");
        let info = p.info();
        assert!(info.volatile);
        assert_eq!(info.status, BuildStatus::NotStarted);
        assert_eq!(info.revision, 0);
    }

    #[test]
    fn undecided_build_counts_as_modified() {
        let p = Progress::new("a");
        p.finish(json!(1), 3);
        assert_eq!(p.revision(), 3);

        p.lock().modified = Some(false);
        p.finish(json!(1), 4);
        assert_eq!(p.revision(), 3);
    }

    #[test]
    fn failed_progress_is_not_journaled() {
        let p = Progress::new("a");
        p.fail(EngineError::Cancelled { id: "a".into() });
        assert!(p.to_entry().is_none());
        assert!(p.info().volatile);
    }

    #[test]
    fn tracking_equal_to_result_is_compacted() {
        let p = Progress::new("a");
        {
            let mut st = p.lock();
            st.tracking = Some(json!("x"));
        }
        p.finish(json!("x"), 1);
        let entry = p.to_entry().unwrap();
        assert!(entry.last_returned_same_track);
        assert!(entry.tracking.is_none());

        let restored = Progress::new("a");
        restored.apply_entry(&entry);
        assert_eq!(restored.info().tracking, Some(json!("x")));
        assert_eq!(restored.info().result, Some(json!("x")));
        assert_eq!(restored.lock().last_result, Some(json!("x")));
    }

    #[test]
    fn reset_keeps_persistent_state() {
        let p = Progress::new("a");
        p.finish(json!(7), 2);
        p.reset_build_status();
        let info = p.info();
        assert_eq!(info.status, BuildStatus::NotStarted);
        assert_eq!(info.result, Some(json!(7)));
        assert_eq!(info.revision, 2);
    }
}
