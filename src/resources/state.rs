//! Resource lifecycle state machine.
//!
//! # Responsibilities
//! - Validate every resource state transition against the legal set
//! - Track time spent in each state and transition counts for postmortem
//!   analysis of stuck resources

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use serde::Serialize;

use crate::error::Error;
use crate::observability::metrics;

/// Resource lifecycle states. `Cleaned` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ResourceState {
    Available,
    InUse,
    Cleaning,
    Failed,
    Cleaned,
}

impl ResourceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceState::Available => "AVAILABLE",
            ResourceState::InUse => "IN_USE",
            ResourceState::Cleaning => "CLEANING",
            ResourceState::Failed => "FAILED",
            ResourceState::Cleaned => "CLEANED",
        }
    }

    /// Legal transition targets from this state.
    fn allowed(&self) -> &'static [ResourceState] {
        match self {
            ResourceState::Available => &[ResourceState::InUse, ResourceState::Cleaning],
            ResourceState::InUse => &[ResourceState::Available, ResourceState::Cleaning],
            ResourceState::Cleaning => &[ResourceState::Cleaned, ResourceState::Failed],
            ResourceState::Failed => &[ResourceState::Cleaning],
            ResourceState::Cleaned => &[],
        }
    }
}

impl std::fmt::Display for ResourceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct StateEntry {
    state: ResourceState,
    since: Instant,
}

/// Validated state transitions with per-state duration tracking.
///
/// Unknown resources are treated as `Available`, matching first use.
#[derive(Default)]
pub struct ResourceStateMachine {
    states: Mutex<HashMap<String, StateEntry>>,
    transitions: Mutex<HashMap<(String, ResourceState, ResourceState), u64>>,
}

impl ResourceStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of `resource`, `Available` if never transitioned.
    pub fn current(&self, resource: &str) -> ResourceState {
        self.states
            .lock()
            .expect("state machine mutex poisoned")
            .get(resource)
            .map(|e| e.state)
            .unwrap_or(ResourceState::Available)
    }

    /// Transition `resource` to `to`, failing without any change if the
    /// transition is not in the legal set.
    pub fn transition(&self, resource: &str, to: ResourceState) -> Result<(), Error> {
        let mut states = self.states.lock().expect("state machine mutex poisoned");
        let now = Instant::now();

        let (from, since) = states
            .get(resource)
            .map(|e| (e.state, e.since))
            .unwrap_or((ResourceState::Available, now));

        if !from.allowed().contains(&to) {
            return Err(Error::InvalidTransition {
                resource: resource.to_string(),
                from,
                to,
            });
        }

        states.insert(
            resource.to_string(),
            StateEntry {
                state: to,
                since: now,
            },
        );
        drop(states);

        let held = now.duration_since(since);
        metrics::record_state_transition(resource, from, to, held);
        tracing::debug!(
            resource = %resource,
            from = %from,
            to = %to,
            held_for = ?held,
            "Resource state transition"
        );

        let mut transitions = self.transitions.lock().expect("state machine mutex poisoned");
        *transitions
            .entry((resource.to_string(), from, to))
            .or_insert(0) += 1;
        Ok(())
    }

    /// Count of observed `(resource, from, to)` transitions.
    pub fn transition_count(&self, resource: &str, from: ResourceState, to: ResourceState) -> u64 {
        self.transitions
            .lock()
            .expect("state machine mutex poisoned")
            .get(&(resource.to_string(), from, to))
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_resource_starts_available() {
        let machine = ResourceStateMachine::new();
        assert_eq!(machine.current("redis"), ResourceState::Available);
    }

    #[test]
    fn legal_cleanup_path() {
        let machine = ResourceStateMachine::new();
        machine.transition("redis", ResourceState::InUse).unwrap();
        machine.transition("redis", ResourceState::Cleaning).unwrap();
        machine.transition("redis", ResourceState::Cleaned).unwrap();
        assert_eq!(machine.current("redis"), ResourceState::Cleaned);
    }

    #[test]
    fn failed_resources_can_retry_cleaning() {
        let machine = ResourceStateMachine::new();
        machine.transition("plex", ResourceState::Cleaning).unwrap();
        machine.transition("plex", ResourceState::Failed).unwrap();
        machine.transition("plex", ResourceState::Cleaning).unwrap();
        assert_eq!(machine.current("plex"), ResourceState::Cleaning);
    }

    #[test]
    fn illegal_transition_leaves_state_unchanged() {
        let machine = ResourceStateMachine::new();
        machine.transition("redis", ResourceState::InUse).unwrap();

        let err = machine
            .transition("redis", ResourceState::Cleaned)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(machine.current("redis"), ResourceState::InUse);
    }

    #[test]
    fn cleaned_is_terminal() {
        let machine = ResourceStateMachine::new();
        machine.transition("redis", ResourceState::Cleaning).unwrap();
        machine.transition("redis", ResourceState::Cleaned).unwrap();

        for to in [
            ResourceState::Available,
            ResourceState::InUse,
            ResourceState::Cleaning,
            ResourceState::Failed,
        ] {
            assert!(machine.transition("redis", to).is_err());
        }
        assert_eq!(machine.current("redis"), ResourceState::Cleaned);
    }

    #[test]
    fn transitions_are_counted() {
        let machine = ResourceStateMachine::new();
        machine.transition("a", ResourceState::Cleaning).unwrap();
        machine.transition("a", ResourceState::Failed).unwrap();
        machine.transition("a", ResourceState::Cleaning).unwrap();

        assert_eq!(
            machine.transition_count("a", ResourceState::Failed, ResourceState::Cleaning),
            1
        );
        assert_eq!(
            machine.transition_count("a", ResourceState::Available, ResourceState::Cleaning),
            1
        );
    }
}
