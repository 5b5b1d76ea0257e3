//! Call lifecycle state machine with thread-safe transitions.
//!
//! Enforces valid state transitions for one streaming connection:
//! - Accumulating -> Finalizing (segment boundary received)
//! - Finalizing -> Accumulating (segment result emitted, buffer reset)
//! - Accumulating -> Closed (connection closed)
//! - Finalizing -> Closed (connection closed mid-finalize)

use std::fmt;
use std::sync::{Arc, Mutex};

use luna_core::error::LunaError;

/// Operational state of one streaming call connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallState {
    /// Collecting binary audio frames for the current segment.
    Accumulating,
    /// A segment boundary arrived; the transcribe/reply/synthesize pipeline
    /// is running for the buffered audio.
    Finalizing,
    /// Connection gone; any unfinalized buffer has been discarded.
    Closed,
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallState::Accumulating => write!(f, "Accumulating"),
            CallState::Finalizing => write!(f, "Finalizing"),
            CallState::Closed => write!(f, "Closed"),
        }
    }
}

impl CallState {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &CallState) -> bool {
        matches!(
            (self, target),
            (CallState::Accumulating, CallState::Finalizing)
                | (CallState::Finalizing, CallState::Accumulating)
                // Close is valid from any live state, and Closed is terminal.
                | (CallState::Accumulating, CallState::Closed)
                | (CallState::Finalizing, CallState::Closed)
        )
    }
}

/// Thread-safe state machine for call lifecycle transitions.
///
/// Cloning shares the underlying state, so a connection handler can observe
/// the state the session task drives.
#[derive(Debug, Clone)]
pub struct CallStateMachine {
    state: Arc<Mutex<CallState>>,
}

impl Default for CallStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl CallStateMachine {
    /// Create a new state machine. A fresh connection starts out
    /// accumulating with an empty buffer.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(CallState::Accumulating)),
        }
    }

    /// Returns the current state.
    pub fn current(&self) -> CallState {
        *self.state.lock().expect("state mutex poisoned")
    }

    /// Attempt to transition to the target state.
    pub fn transition(&self, target: CallState) -> Result<(), LunaError> {
        let mut state = self.state.lock().expect("state mutex poisoned");
        if state.can_transition_to(&target) {
            tracing::debug!("Call state: {} -> {}", *state, target);
            *state = target;
            Ok(())
        } else {
            Err(LunaError::Call(format!(
                "Invalid state transition: {} -> {}",
                *state, target
            )))
        }
    }
}
