//! The lockstep core.
//!
//! Every participant executes the exact same command sequence on the exact
//! same simulation frame. The [`FrameBuffer`] holds the barrier (a frame
//! commits only when every expected participant has submitted or is marked
//! absent), the [`OrderManager`] owns the commit path, the [`TickScheduler`]
//! converts wall-clock time into a frame budget, and [`Session`] composes
//! them into one per-iteration pump.
//!
//! # Invariants
//! - Committed frame numbers are strictly ascending with no gaps.
//! - Commands apply in one total order: issuer id, then arrival sequence.
//! - There is no speculation and no rollback. A frame that is not ready
//!   simply does not commit this iteration.
//! - Exactly one thread drives commits; transport threads only feed the
//!   frame buffer through its synchronized entry point.

pub mod actions;
pub mod frame_buffer;
pub mod manager;
pub mod scheduler;
pub mod session;
pub mod transport;

pub use actions::ActionQueue;
pub use frame_buffer::{BufferError, FrameBuffer};
pub use manager::{EngineEvent, OrderError, OrderManager};
pub use scheduler::{Cadence, SchedulerConfig, TickScheduler};
pub use session::{PumpOutcome, Session};
pub use transport::Transport;
