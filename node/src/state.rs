//! Node lifecycle state.

/// Node operational state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Built, schedulers not started.
    Starting,
    /// Schedulers running.
    Running,
    /// Shutdown signalled, waiting for in-flight cycles.
    ShuttingDown,
    Stopped,
}

impl NodeState {
    /// Check if the schedulers should keep running.
    pub fn is_operational(&self) -> bool {
        matches!(self, NodeState::Running)
    }

    /// Check if the node is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeState::Stopped)
    }
}
