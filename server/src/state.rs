//! Server lifecycle states.

/// Server operational state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Rates are loaded but the listener is not serving yet.
    Starting,
    /// Serving requests and pushing rate updates.
    Running,
    /// Shutdown requested; open streams are being closed.
    ShuttingDown,
    /// All background tasks have finished.
    Stopped,
}

impl ServerState {
    /// Check if the server is accepting new calls.
    pub fn accepts_requests(&self) -> bool {
        matches!(self, ServerState::Running)
    }

    /// Check if every background task has finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServerState::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_running_accepts_requests() {
        assert!(ServerState::Running.accepts_requests());
        assert!(!ServerState::Starting.accepts_requests());
        assert!(!ServerState::ShuttingDown.accepts_requests());
        assert!(!ServerState::Stopped.accepts_requests());
    }

    #[test]
    fn test_terminal_state() {
        assert!(ServerState::Stopped.is_terminal());
        assert!(!ServerState::ShuttingDown.is_terminal());
    }
}
