use serde::{Deserialize, Serialize};

/// Unique identifier for a session participant.
///
/// Assigned once when the participant joins and immutable afterwards.
/// Command ordering within a frame is keyed on this id, so it must be
/// totally ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub u32);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client {}", self.0)
    }
}

/// Simulation frame number. One per committed step, never reused.
pub type Frame = u64;

/// Lifecycle of a command source.
///
/// `NotConnected` is terminal: reconnecting requires a new connection
/// instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    PreConnecting,
    Connecting,
    Connected,
    NotConnected,
}

impl ConnectionState {
    /// Whether any further transition is possible from this state.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::NotConnected)
    }
}

/// An immutable instruction tagged with the frame it must apply on.
///
/// The payload is opaque to the synchronization layer; only the issuer and
/// target frame participate in ordering and readiness decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub issuer: ClientId,
    pub frame: Frame,
    pub payload: Vec<u8>,
}

impl Command {
    pub fn new(issuer: ClientId, frame: Frame, payload: Vec<u8>) -> Self {
        Self {
            issuer,
            frame,
            payload,
        }
    }

    /// A command with an empty payload. Applying it must not mutate
    /// simulation state.
    pub fn noop(issuer: ClientId, frame: Frame) -> Self {
        Self::new(issuer, frame, Vec::new())
    }

    pub fn is_noop(&self) -> bool {
        self.payload.is_empty()
    }
}
