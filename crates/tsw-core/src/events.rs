//! Switch event stream
//!
//! Observers (status display, event hooks) receive lifecycle and switch
//! events through a broadcast channel. Sending never blocks the
//! coordinator and it is fine for nobody to listen.

use serde::{Deserialize, Serialize};

/// Events emitted by the coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SwitchEvent {
    /// An input reported the outcome of its start
    InputStarted {
        /// Input index
        index: usize,
        /// Whether the start succeeded
        success: bool,
    },

    /// An input reported it stopped
    InputStopped {
        /// Input index
        index: usize,
        /// False if the input stopped on error
        success: bool,
    },

    /// The current input changed
    CurrentChanged {
        /// Previous current input
        from: usize,
        /// New current input
        to: usize,
    },

    /// A queued switch was abandoned because its target failed to start
    SwitchAborted {
        /// Input that failed
        target: usize,
    },

    /// A full pass through all inputs completed
    CycleCompleted {
        /// New cycle counter value
        cycle: u64,
    },

    /// Termination began
    Terminating {
        /// Reported exit status
        success: bool,
    },
}

impl SwitchEvent {
    /// Input this event is about, if any
    pub fn input_index(&self) -> Option<usize> {
        match self {
            SwitchEvent::InputStarted { index, .. } | SwitchEvent::InputStopped { index, .. } => {
                Some(*index)
            }
            SwitchEvent::CurrentChanged { to, .. } => Some(*to),
            SwitchEvent::SwitchAborted { target } => Some(*target),
            _ => None,
        }
    }

    /// Whether this event reports a failure
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            SwitchEvent::InputStarted { success: false, .. }
                | SwitchEvent::InputStopped { success: false, .. }
                | SwitchEvent::SwitchAborted { .. }
                | SwitchEvent::Terminating { success: false }
        )
    }
}
