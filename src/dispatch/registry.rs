//! Live dispatch state: timer handles and execution flags
//!
//! One registry instance owns all per-campaign runtime state for the process:
//! the live timer task per armed campaign and the cooperative cancellation
//! flag per in-flight sweep. Everything sits behind a single lock; none of it
//! survives a restart, which is why recovery re-arms from persisted records
//! instead of resuming sweeps.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use uuid::Uuid;

/// Cooperative cancellation signal for one in-flight sweep
///
/// The sweep loop reads it between targets; pause/delete callers set it.
/// Requesting a stop twice has the same effect as once.
#[derive(Debug, Clone, Default)]
pub struct ExecutionFlag(Arc<AtomicBool>);

impl ExecutionFlag {
    /// Create a fresh flag with no stop requested
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the owning sweep to stop at its next check
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether a stop has been requested
    pub fn stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct RegistryInner {
    timers: HashMap<Uuid, JoinHandle<()>>,
    flags: HashMap<Uuid, ExecutionFlag>,
}

/// Owned registry of live timers and execution flags, keyed by campaign id
#[derive(Default)]
pub struct DispatchRegistry {
    inner: Mutex<RegistryInner>,
}

impl DispatchRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the live timer for a campaign, replacing (and aborting) any
    /// previous one so re-arm stays idempotent
    pub fn install_timer(&self, id: Uuid, handle: JoinHandle<()>) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(old) = inner.timers.insert(id, handle) {
            old.abort();
        }
    }

    /// Cancel and remove the live timer if present; no-op if absent
    pub fn cancel_timer(&self, id: Uuid) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.timers.remove(&id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Remove a timer entry without aborting the task
    ///
    /// Used by the fire path to drop its own finished entry; aborting there
    /// would cancel the task that is currently executing the sweep.
    pub fn take_timer(&self, id: Uuid) -> Option<JoinHandle<()>> {
        self.inner.lock().unwrap().timers.remove(&id)
    }

    /// Whether a live timer exists for the campaign
    pub fn has_timer(&self, id: Uuid) -> bool {
        self.inner.lock().unwrap().timers.contains_key(&id)
    }

    /// Number of live timers
    pub fn timer_count(&self) -> usize {
        self.inner.lock().unwrap().timers.len()
    }

    /// Register the execution flag for a starting sweep
    ///
    /// Returns `None` when a sweep is already in flight for this campaign;
    /// at most one sweep per campaign may execute at a time.
    pub fn begin_execution(&self, id: Uuid) -> Option<ExecutionFlag> {
        let mut inner = self.inner.lock().unwrap();
        if inner.flags.contains_key(&id) {
            return None;
        }
        let flag = ExecutionFlag::new();
        inner.flags.insert(id, flag.clone());
        Some(flag)
    }

    /// Destroy the execution flag once the sweep has stopped
    pub fn end_execution(&self, id: Uuid) {
        self.inner.lock().unwrap().flags.remove(&id);
    }

    /// The execution flag for an in-flight sweep, if any
    pub fn execution_flag(&self, id: Uuid) -> Option<ExecutionFlag> {
        self.inner.lock().unwrap().flags.get(&id).cloned()
    }

    /// Whether a sweep is currently in flight for the campaign
    pub fn is_executing(&self, id: Uuid) -> bool {
        self.inner.lock().unwrap().flags.contains_key(&id)
    }

    /// Ids of all campaigns with an in-flight sweep
    pub fn executing_ids(&self) -> Vec<Uuid> {
        self.inner.lock().unwrap().flags.keys().copied().collect()
    }

    /// Abort every live timer and request a stop from every in-flight sweep
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock().unwrap();
        for (_, handle) in inner.timers.drain() {
            handle.abort();
        }
        for flag in inner.flags.values() {
            flag.request_stop();
        }
    }
}
