//! Capacity arbitration for running recipes.
//!
//! Each user-visible goal holds one slot while its recipe executes. A goal
//! that waits on dependencies halts: it hands its slot back so the
//! dependencies can run, and reacquires one before continuing. Halts nest;
//! only the outermost halt and unhalt touch the slot.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::EngineError;
use crate::progress::Progress;
use crate::reporter::Reporter;

/// Limits how many user goals execute at once.
pub struct Arbitrator {
    slots: RwLock<Option<Arc<Semaphore>>>,
}

impl Arbitrator {
    /// Arbitrator with `capacity` slots; `0` means unbounded.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: RwLock::new(Self::semaphore(capacity)),
        }
    }

    /// Change the capacity. Goals already holding a slot keep it.
    pub fn set_capacity(&self, capacity: usize) {
        *self.slots.write() = Self::semaphore(capacity);
    }

    fn semaphore(capacity: usize) -> Option<Arc<Semaphore>> {
        (capacity > 0).then(|| Arc::new(Semaphore::new(capacity)))
    }

    async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        let slots = self.slots.read().clone()?;
        slots.acquire_owned().await.ok()
    }

    /// Wait for a slot before running `progress`'s recipe.
    pub async fn start(&self, progress: &Progress, reporter: &dyn Reporter) {
        if progress.is_user() {
            reporter.target_start(progress.id());
            reporter.target_halt(progress.id());
            let permit = self.acquire().await;
            progress.lock().permit = permit;
            reporter.target_unhalt(progress.id());
        }
        tokio::task::yield_now().await;
    }

    /// Release the slot while waiting on dependencies.
    pub async fn halt(&self, progress: &Progress, reporter: &dyn Reporter) {
        if !progress.is_user() {
            return;
        }
        let released = {
            let mut st = progress.lock();
            st.halts += 1;
            if st.halts == 1 {
                st.permit = None;
                true
            } else {
                false
            }
        };
        if released {
            reporter.target_halt(progress.id());
        }
        tokio::task::yield_now().await;
    }

    /// Reacquire a slot after the outermost halt ends.
    pub async fn unhalt(&self, progress: &Progress, reporter: &dyn Reporter) {
        if !progress.is_user() {
            return;
        }
        let outermost = {
            let mut st = progress.lock();
            st.halts = st.halts.saturating_sub(1);
            st.halts == 0
        };
        if outermost {
            let permit = self.acquire().await;
            {
                let mut st = progress.lock();
                // Another halt may have begun while we waited.
                if st.halts == 0 {
                    st.permit = permit;
                }
            }
            reporter.target_unhalt(progress.id());
        }
        tokio::task::yield_now().await;
    }

    /// Release the slot after the recipe settles and report the outcome.
    pub async fn end(
        &self,
        progress: &Progress,
        error: Option<&EngineError>,
        reporter: &dyn Reporter,
    ) {
        progress.lock().permit = None;
        if progress.is_user() {
            match error {
                Some(error) => reporter.target_error(progress.id(), error),
                None => reporter.target_end(progress.id()),
            }
        }
        tokio::task::yield_now().await;
    }
}
