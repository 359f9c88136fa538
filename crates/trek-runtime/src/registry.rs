//! Thread registry: at most one live run per thread, bounded runs per
//! process.
//!
//! `begin` hands back an RAII [`RunGuard`]; dropping it releases both the
//! per-thread slot and the global concurrency permit, so a panicking or
//! cancelled run can never leak its slot.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::gauge;
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::RuntimeError;

struct ActiveRun {
    cancel: CancellationToken,
    _permit: OwnedSemaphorePermit,
}

/// Tracks live runs across all threads.
pub struct ThreadRegistry {
    max_concurrent: usize,
    run_semaphore: Arc<Semaphore>,
    active: Arc<Mutex<HashMap<String, ActiveRun>>>,
}

impl ThreadRegistry {
    /// Create a registry allowing `max_concurrent` simultaneous runs.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent,
            run_semaphore: Arc::new(Semaphore::new(max_concurrent)),
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Claim the run slot for a thread.
    ///
    /// Errors:
    /// - [`RuntimeError::ThreadBusy`] when the thread already has a run;
    ///   concurrent attempts are rejected, never queued.
    /// - [`RuntimeError::ServerBusy`] at the global concurrency cap.
    pub fn begin(&self, thread_id: &str) -> Result<RunGuard, RuntimeError> {
        let mut active = self.active.lock();
        if active.contains_key(thread_id) {
            warn!(thread_id, "rejected: thread already running");
            return Err(RuntimeError::ThreadBusy(thread_id.to_owned()));
        }
        let permit = Arc::clone(&self.run_semaphore)
            .try_acquire_owned()
            .map_err(|_| RuntimeError::ServerBusy {
                current: active.len(),
                max: self.max_concurrent,
            })?;
        let cancel = CancellationToken::new();
        let _ = active.insert(
            thread_id.to_owned(),
            ActiveRun {
                cancel: cancel.clone(),
                _permit: permit,
            },
        );
        #[allow(clippy::cast_precision_loss)]
        gauge!("runs_active").set(active.len() as f64);
        info!(thread_id, "run started");
        Ok(RunGuard {
            thread_id: thread_id.to_owned(),
            cancel,
            active: Arc::clone(&self.active),
        })
    }

    /// Whether a thread currently has a live run.
    pub fn is_busy(&self, thread_id: &str) -> bool {
        self.active.lock().contains_key(thread_id)
    }

    /// Number of live runs.
    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    /// Cancel a thread's live run, if any. Committed state is untouched;
    /// only frame emission stops.
    pub fn cancel(&self, thread_id: &str) -> bool {
        let active = self.active.lock();
        if let Some(run) = active.get(thread_id) {
            warn!(thread_id, "cancelling run");
            run.cancel.cancel();
            true
        } else {
            false
        }
    }

    /// Cancel every live run (shutdown path).
    pub fn cancel_all(&self) {
        for run in self.active.lock().values() {
            run.cancel.cancel();
        }
    }
}

/// RAII claim on a thread's run slot.
pub struct RunGuard {
    thread_id: String,
    cancel: CancellationToken,
    active: Arc<Mutex<HashMap<String, ActiveRun>>>,
}

impl RunGuard {
    /// The guarded thread.
    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    /// Cancellation token for this run.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl std::fmt::Debug for RunGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunGuard")
            .field("thread_id", &self.thread_id)
            .finish_non_exhaustive()
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut active = self.active.lock();
        let _ = active.remove(&self.thread_id);
        #[allow(clippy::cast_precision_loss)]
        gauge!("runs_active").set(active.len() as f64);
        debug!(thread_id = %self.thread_id, "run finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn second_run_on_same_thread_is_rejected() {
        let registry = ThreadRegistry::new(4);
        let guard = registry.begin("thr_a").unwrap();
        assert_matches!(
            registry.begin("thr_a"),
            Err(RuntimeError::ThreadBusy(id)) if id == "thr_a"
        );
        drop(guard);
        assert!(registry.begin("thr_a").is_ok());
    }

    #[test]
    fn capacity_is_enforced_globally() {
        let registry = ThreadRegistry::new(2);
        let _a = registry.begin("thr_a").unwrap();
        let _b = registry.begin("thr_b").unwrap();
        assert_matches!(
            registry.begin("thr_c"),
            Err(RuntimeError::ServerBusy { current: 2, max: 2 })
        );
    }

    #[test]
    fn guard_drop_releases_slot_and_permit() {
        let registry = ThreadRegistry::new(1);
        {
            let _guard = registry.begin("thr_a").unwrap();
            assert!(registry.is_busy("thr_a"));
            assert_eq!(registry.active_count(), 1);
        }
        assert!(!registry.is_busy("thr_a"));
        assert_eq!(registry.active_count(), 0);
        assert!(registry.begin("thr_b").is_ok());
    }

    #[test]
    fn cancel_flags_the_token_without_freeing_the_slot() {
        let registry = ThreadRegistry::new(2);
        let guard = registry.begin("thr_a").unwrap();
        assert!(registry.cancel("thr_a"));
        assert!(guard.cancel_token().is_cancelled());
        // Slot only frees when the run itself winds down.
        assert!(registry.is_busy("thr_a"));
        assert!(!registry.cancel("thr_missing"));
    }

    #[test]
    fn guard_debug_names_its_thread() {
        let registry = ThreadRegistry::new(1);
        let guard = registry.begin("thr_a").unwrap();
        assert!(format!("{guard:?}").contains("thr_a"));
    }
}
