use lockstep_common::ConnectionState;
use tracing::{debug, warn};

/// Tracks a connection's lifecycle through
/// `PreConnecting -> Connecting -> Connected -> NotConnected`.
///
/// Transitions only move forward; `NotConnected` is terminal. An illegal
/// transition is a programming error in the transport and is logged and
/// ignored rather than panicking the tick thread.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    state: ConnectionState,
}

impl ConnectionTracker {
    /// Start at `PreConnecting` (network connections).
    pub fn new() -> Self {
        Self {
            state: ConnectionState::PreConnecting,
        }
    }

    /// Start directly at a given state (local echo and replay start
    /// `Connected`).
    pub fn with_state(state: ConnectionState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Attempt a transition. Returns whether the state actually changed.
    pub fn advance_to(&mut self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        if next == self.state {
            return false;
        }
        let legal = match (self.state, next) {
            (NotConnected, _) => false,
            (_, NotConnected) => true,
            (PreConnecting, Connecting) => true,
            (Connecting, Connected) => true,
            _ => false,
        };
        if !legal {
            warn!(from = ?self.state, to = ?next, "ignoring illegal connection transition");
            return false;
        }
        debug!(from = ?self.state, to = ?next, "connection state change");
        self.state = next;
        true
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;

    #[test]
    fn full_lifecycle_is_legal() {
        let mut t = ConnectionTracker::new();
        assert_eq!(t.state(), PreConnecting);
        assert!(t.advance_to(Connecting));
        assert!(t.advance_to(Connected));
        assert!(t.advance_to(NotConnected));
        assert_eq!(t.state(), NotConnected);
    }

    #[test]
    fn not_connected_is_terminal() {
        let mut t = ConnectionTracker::new();
        t.advance_to(NotConnected);
        assert!(!t.advance_to(Connecting));
        assert!(!t.advance_to(Connected));
        assert_eq!(t.state(), NotConnected);
    }

    #[test]
    fn skipping_forward_is_rejected() {
        let mut t = ConnectionTracker::new();
        assert!(!t.advance_to(Connected));
        assert_eq!(t.state(), PreConnecting);
    }

    #[test]
    fn moving_backwards_is_rejected() {
        let mut t = ConnectionTracker::with_state(Connected);
        assert!(!t.advance_to(Connecting));
        assert_eq!(t.state(), Connected);
    }

    #[test]
    fn any_state_may_fail_to_not_connected() {
        for start in [PreConnecting, Connecting, Connected] {
            let mut t = ConnectionTracker::with_state(start);
            assert!(t.advance_to(NotConnected));
        }
    }
}
