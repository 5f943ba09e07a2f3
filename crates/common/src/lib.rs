//! Shared types for the lockstep engine.
//!
//! # Invariants
//! - `Frame` numbers are monotonically increasing; frame 0 means "nothing committed".
//! - A `Command` is immutable once issued.
//! - A client's `index` never changes after assignment.

pub mod session;
pub mod types;

pub use session::{Client, LobbyInfo};
pub use types::{ClientId, Command, ConnectionState, Frame};
