//! Command sources for the lockstep engine.
//!
//! A [`Connection`] delivers per-frame command batches and out-of-band sync
//! reports. Three kinds exist: the in-memory network relay here, the local
//! echo here, and the replay reader in `lockstep-replay`. All are polled;
//! nothing blocks the tick thread.
//!
//! # Invariants
//! - Every participant receives identical command streams, including an
//!   echo of its own batches.
//! - `NotConnected` is terminal; a new connection instance is required to
//!   reconnect.

pub mod connection;
pub mod local;
pub mod network;
pub mod state;
pub mod wire;

pub use connection::{Connection, Inbound};
pub use local::LocalConnection;
pub use network::{NetworkConnection, RelayHub};
pub use state::ConnectionTracker;
pub use wire::{NetError, WireMessage};
