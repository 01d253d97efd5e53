//! Input lifecycle state tracking

use serde::{Deserialize, Serialize};

/// Lifecycle of one input, as seen by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InputState {
    /// Never started in this run
    #[default]
    NotStarted,
    /// Start requested, waiting for the worker to report
    Starting,
    /// Started successfully, producing packets
    Running,
    /// Stop requested, waiting for the worker to report
    Stopping,
    /// Stopped cleanly (end of stream or on request)
    Stopped,
    /// Failed to start or stopped on error
    Failed,
}

impl InputState {
    /// Started or starting, and not asked to stop
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }

    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::NotStarted => "not started",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

/// Snapshot of one input for status display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputStatus {
    /// Input index
    pub index: usize,
    /// Lifecycle state
    pub state: InputState,
    /// Whether the output currently draws from this input
    pub current: bool,
}

impl InputStatus {
    /// Running but not selected for output
    pub fn is_standby(&self) -> bool {
        self.state == InputState::Running && !self.current
    }

    /// Format for display: "running (current)", "running (standby)", ...
    pub fn display(&self) -> String {
        match self.state {
            InputState::Running if self.current => "running (current)".to_string(),
            InputState::Running => "running (standby)".to_string(),
            other => other.name().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_states() {
        assert!(InputState::Starting.is_active());
        assert!(InputState::Running.is_active());
        assert!(!InputState::Stopping.is_active());
        assert!(!InputState::Failed.is_active());
        assert!(!InputState::NotStarted.is_active());
    }

    #[test]
    fn test_status_display() {
        let current = InputStatus {
            index: 0,
            state: InputState::Running,
            current: true,
        };
        let standby = InputStatus {
            current: false,
            ..current
        };
        assert_eq!(current.display(), "running (current)");
        assert!(standby.is_standby());
        assert_eq!(standby.display(), "running (standby)");
    }
}
