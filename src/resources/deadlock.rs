//! Wait-for-graph deadlock detection.
//!
//! # Responsibilities
//! - Maintain the wait-for graph (edge A→B: holder A waits on a resource
//!   held by B)
//! - Run a throttled cycle check and flag the waiters whose wait was broken
//!
//! # Design Decisions
//! - Checks are throttled; lock traffic is far more frequent than deadlocks
//! - The first check after construction always runs, so tests and one-shot
//!   probes see the truth immediately

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Delivered to a waiter whose wait edge was part of a broken cycle.
#[derive(Debug, Clone)]
pub(crate) struct VictimNotice {
    pub resource: String,
    pub victim: String,
}

#[derive(Default)]
struct DetectorInner {
    /// Holder → the holders it currently waits on. One entry per waiter;
    /// re-registering replaces the previous wait.
    wait_for: BTreeMap<String, BTreeSet<String>>,
    last_check: Option<Instant>,
    victims: HashMap<String, VictimNotice>,
    detections: u64,
}

/// Detects lock-wait cycles among holders.
pub struct DeadlockDetector {
    check_interval: Duration,
    inner: Mutex<DetectorInner>,
}

impl DeadlockDetector {
    pub fn new(check_interval: Duration) -> Self {
        Self {
            check_interval,
            inner: Mutex::new(DetectorInner::default()),
        }
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    /// Total cycles detected since construction.
    pub fn detections(&self) -> u64 {
        self.inner.lock().expect("deadlock detector mutex poisoned").detections
    }

    pub(crate) fn record_wait(&self, waiter: &str, holder: &str) {
        let mut inner = self.inner.lock().expect("deadlock detector mutex poisoned");
        let mut on = BTreeSet::new();
        on.insert(holder.to_string());
        inner.wait_for.insert(waiter.to_string(), on);
    }

    pub(crate) fn clear_wait(&self, waiter: &str) {
        self.inner
            .lock()
            .expect("deadlock detector mutex poisoned")
            .wait_for
            .remove(waiter);
    }

    pub(crate) fn mark_victim(&self, waiter: &str, resource: &str, victim: &str) {
        let mut inner = self.inner.lock().expect("deadlock detector mutex poisoned");
        inner.wait_for.remove(waiter);
        inner.victims.insert(
            waiter.to_string(),
            VictimNotice {
                resource: resource.to_string(),
                victim: victim.to_string(),
            },
        );
    }

    pub(crate) fn take_victim(&self, waiter: &str) -> Option<VictimNotice> {
        self.inner
            .lock()
            .expect("deadlock detector mutex poisoned")
            .victims
            .remove(waiter)
    }

    /// Run the cycle check if the throttle interval has elapsed. Returns the
    /// holders on a detected cycle.
    pub(crate) fn cycle_if_due(&self) -> Option<Vec<String>> {
        let mut inner = self.inner.lock().expect("deadlock detector mutex poisoned");
        if let Some(last) = inner.last_check {
            if last.elapsed() < self.check_interval {
                return None;
            }
        }
        inner.last_check = Some(Instant::now());

        let cycle = Self::find_cycle(&inner.wait_for);
        if cycle.is_some() {
            inner.detections += 1;
        }
        cycle
    }

    /// Depth-first search over the wait-for graph, deterministic order. A
    /// neighbor already on the current path closes a cycle.
    fn find_cycle(wait_for: &BTreeMap<String, BTreeSet<String>>) -> Option<Vec<String>> {
        let neighbors = |node: &str| -> Vec<String> {
            wait_for
                .get(node)
                .map(|set| set.iter().cloned().collect())
                .unwrap_or_default()
        };

        let mut visited: HashSet<String> = HashSet::new();

        for start in wait_for.keys() {
            if visited.contains(start) {
                continue;
            }

            let mut stack: Vec<(String, Vec<String>, usize)> =
                vec![(start.clone(), neighbors(start), 0)];
            let mut on_path: HashSet<String> = HashSet::new();
            on_path.insert(start.clone());

            while let Some((_, nodes, next)) = stack.last_mut() {
                if *next < nodes.len() {
                    let candidate = nodes[*next].clone();
                    *next += 1;
                    if on_path.contains(&candidate) {
                        let pos = stack
                            .iter()
                            .position(|(n, _, _)| *n == candidate)
                            .unwrap_or(0);
                        return Some(stack[pos..].iter().map(|(n, _, _)| n.clone()).collect());
                    }
                    if !visited.contains(&candidate) {
                        on_path.insert(candidate.clone());
                        let candidate_neighbors = neighbors(&candidate);
                        stack.push((candidate, candidate_neighbors, 0));
                    }
                } else {
                    let (node, _, _) = stack.pop().expect("stack entry just inspected");
                    on_path.remove(&node);
                    visited.insert(node);
                }
            }
        }

        None
    }
}
