//! Exclusive locks over named resources.
//!
//! # Responsibilities
//! - Serialize access to named resources during cleanup
//! - Bound every wait and report contention timeouts as `false`, not errors
//! - Break detected wait cycles so shutdown cannot hang on itself

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Notify;

use crate::error::Error;
use crate::observability::metrics;
use crate::resources::deadlock::DeadlockDetector;

#[derive(Debug)]
struct LockEntry {
    holder: Option<String>,
    acquired_at: Option<Instant>,
    waiters: BTreeSet<String>,
    acquisitions: u64,
    contention: u64,
    forced_releases: u64,
    last_holder: Option<String>,
    notify: Arc<Notify>,
}

impl LockEntry {
    fn new() -> Self {
        Self {
            holder: None,
            acquired_at: None,
            waiters: BTreeSet::new(),
            acquisitions: 0,
            contention: 0,
            forced_releases: 0,
            last_holder: None,
            notify: Arc::new(Notify::new()),
        }
    }
}

/// Point-in-time view of one lock, for the observability surface.
#[derive(Debug, Clone, Serialize)]
pub struct LockStat {
    pub resource: String,
    pub holder: Option<String>,
    pub last_holder: Option<String>,
    pub waiters: usize,
    pub acquisitions: u64,
    pub contention: u64,
    pub forced_releases: u64,
    pub held_for: Option<Duration>,
}

/// Exclusive locks per named resource, with deadlock detection over the
/// wait-for graph of blocked holders.
pub struct ResourceLockManager {
    locks: Mutex<BTreeMap<String, LockEntry>>,
    detector: DeadlockDetector,
}

impl ResourceLockManager {
    pub fn new(check_interval: Duration) -> Self {
        Self {
            locks: Mutex::new(BTreeMap::new()),
            detector: DeadlockDetector::new(check_interval),
        }
    }

    /// Acquire `resource` for `holder`, blocking up to `max_wait`.
    ///
    /// Returns `Ok(false)` on contention timeout (not a deadlock) and
    /// `Err(Error::Deadlock)` when this holder's wait was broken by the
    /// detector. Re-acquiring a lock already held by `holder` succeeds.
    pub async fn acquire(
        &self,
        resource: &str,
        holder: &str,
        max_wait: Duration,
    ) -> Result<bool, Error> {
        let deadline = Instant::now() + max_wait;
        let mut registered = false;

        loop {
            if let Some(notice) = self.detector.take_victim(holder) {
                self.remove_waiter(resource, holder);
                return Err(Error::Deadlock {
                    resource: notice.resource,
                    victim: notice.victim,
                });
            }

            let notify = {
                let mut locks = self.locks.lock().expect("lock table mutex poisoned");
                let entry = locks
                    .entry(resource.to_string())
                    .or_insert_with(LockEntry::new);

                match entry.holder.clone() {
                    None => {
                        entry.holder = Some(holder.to_string());
                        entry.acquired_at = Some(Instant::now());
                        entry.acquisitions += 1;
                        entry.waiters.remove(holder);
                        self.detector.clear_wait(holder);
                        return Ok(true);
                    }
                    Some(current) if current == holder => return Ok(true),
                    Some(current) => {
                        if !registered {
                            entry.contention += 1;
                            registered = true;
                            metrics::record_lock_contention(resource);
                        }
                        entry.waiters.insert(holder.to_string());
                        self.detector.record_wait(holder, &current);
                        entry.notify.clone()
                    }
                }
            };

            if self.check_deadlocks() {
                // The break may have freed this lock or flagged this holder.
                continue;
            }

            let now = Instant::now();
            if now >= deadline {
                self.remove_waiter(resource, holder);
                self.detector.clear_wait(holder);
                tracing::warn!(
                    resource = %resource,
                    holder = %holder,
                    waited = ?max_wait,
                    "Lock acquisition timed out"
                );
                return Ok(false);
            }

            // Wake on release or after a slice, whichever comes first; slices
            // keep the deadlock check running while blocked.
            let slice = (deadline - now).min(self.detector.check_interval().max(Duration::from_millis(10)));
            let _ = tokio::time::timeout(slice, notify.notified()).await;
        }
    }

    /// Release `resource`. Only the declared holder may release; any other
    /// caller is refused.
    pub fn release(&self, resource: &str, holder: &str) -> bool {
        let mut locks = self.locks.lock().expect("lock table mutex poisoned");
        let Some(entry) = locks.get_mut(resource) else {
            return false;
        };

        match entry.holder.clone() {
            Some(current) if current == holder => {
                entry.holder = None;
                entry.acquired_at = None;
                entry.last_holder = Some(current);
                entry.notify.notify_waiters();
                true
            }
            current => {
                tracing::warn!(
                    resource = %resource,
                    caller = %holder,
                    holder = ?current,
                    "Refused lock release by non-holder"
                );
                false
            }
        }
    }

    /// Run the throttled deadlock check; on a detected cycle, force-release
    /// the lock held by the lexicographically-smallest holder on it.
    pub fn check_deadlocks(&self) -> bool {
        let Some(cycle) = self.detector.cycle_if_due() else {
            return false;
        };
        let Some(victim) = cycle.iter().min().cloned() else {
            return false;
        };

        let mut locks = self.locks.lock().expect("lock table mutex poisoned");
        let target = locks
            .iter()
            .find(|(_, entry)| {
                entry.holder.as_deref() == Some(victim.as_str())
                    && entry.waiters.iter().any(|w| cycle.contains(w))
            })
            .map(|(resource, _)| resource.clone());

        let Some(resource) = target else {
            tracing::warn!(victim = %victim, "Wait cycle detected but no matching lock; edges were stale");
            return false;
        };

        let Some(entry) = locks.get_mut(&resource) else {
            return false;
        };
        entry.holder = None;
        entry.acquired_at = None;
        entry.last_holder = Some(victim.clone());
        entry.forced_releases += 1;
        for waiter in &entry.waiters {
            if cycle.contains(waiter) {
                self.detector.mark_victim(waiter, &resource, &victim);
            }
        }
        entry.notify.notify_waiters();

        tracing::error!(
            resource = %resource,
            victim = %victim,
            "Deadlock detected; lock force-released"
        );
        metrics::record_deadlock(&resource);
        true
    }

    /// Current holder of `resource`, if any.
    pub fn holder(&self, resource: &str) -> Option<String> {
        self.locks
            .lock()
            .expect("lock table mutex poisoned")
            .get(resource)
            .and_then(|e| e.holder.clone())
    }

    /// Cycles detected since construction.
    pub fn deadlock_detections(&self) -> u64 {
        self.detector.detections()
    }

    /// Snapshot of every known lock.
    pub fn lock_stats(&self) -> Vec<LockStat> {
        self.locks
            .lock()
            .expect("lock table mutex poisoned")
            .iter()
            .map(|(resource, entry)| LockStat {
                resource: resource.clone(),
                holder: entry.holder.clone(),
                last_holder: entry.last_holder.clone(),
                waiters: entry.waiters.len(),
                acquisitions: entry.acquisitions,
                contention: entry.contention,
                forced_releases: entry.forced_releases,
                held_for: entry.acquired_at.map(|at| at.elapsed()),
            })
            .collect()
    }

    fn remove_waiter(&self, resource: &str, holder: &str) {
        let mut locks = self.locks.lock().expect("lock table mutex poisoned");
        if let Some(entry) = locks.get_mut(resource) {
            entry.waiters.remove(holder);
        }
    }
}
