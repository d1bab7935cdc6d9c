//! Worker lifecycle state machine.
//!
//! ```text
//! Parsed -> Installing -> Installed (waiting) -> Activating -> Activated -> Redundant
//!               |                 |                  |
//!               +-> Redundant     +-> Redundant      +-> Redundant
//! ```
//!
//! The host drives every transition; the worker only validates them. While
//! activated the worker is idle or handling events, tracked by
//! [`Lifecycle::begin_event`].

use crate::error::{Result, WorkerError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Lifecycle state of one worker instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Parsed,
    Installing,
    /// Installed and waiting to activate.
    Installed,
    Activating,
    Activated,
    /// Failed or superseded; never used again.
    Redundant,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        }
    }

    /// Check if a state transition is valid.
    pub fn can_transition_to(self, next: WorkerState) -> bool {
        use WorkerState::*;

        matches!(
            (self, next),
            (Parsed, Installing)
                | (Installing, Installed)
                | (Installing, Redundant)
                | (Installed, Activating)
                | (Installed, Redundant)
                | (Activating, Activated)
                | (Activating, Redundant)
                | (Activated, Redundant)
        )
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether an activated worker is currently running handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "status", content = "inFlight")]
pub enum Activity {
    Idle,
    Handling(usize),
}

/// State cell plus in-flight event counter for one worker.
#[derive(Debug)]
pub struct Lifecycle {
    state: Mutex<WorkerState>,
    in_flight: Arc<AtomicUsize>,
    skip_waiting: AtomicBool,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(WorkerState::Parsed),
            in_flight: Arc::new(AtomicUsize::new(0)),
            skip_waiting: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move to `next`, rejecting transitions the state machine does not allow.
    pub fn transition(&self, next: WorkerState) -> Result<WorkerState> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let from = *state;
        if !from.can_transition_to(next) {
            return Err(WorkerError::InvalidStateTransition { from, to: next });
        }
        *state = next;
        debug!("Worker state {} -> {}", from, next);
        Ok(from)
    }

    pub fn is_active(&self) -> bool {
        self.state() == WorkerState::Activated
    }

    /// Ask the host to activate without waiting for old clients to go away.
    pub fn request_skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::SeqCst);
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    /// Mark an event as in flight until the guard drops.
    pub fn begin_event(&self) -> ActivityGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        ActivityGuard {
            in_flight: self.in_flight.clone(),
        }
    }

    pub fn activity(&self) -> Activity {
        match self.in_flight.load(Ordering::SeqCst) {
            0 => Activity::Idle,
            n => Activity::Handling(n),
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight counter on drop.
#[derive(Debug)]
pub struct ActivityGuard {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
