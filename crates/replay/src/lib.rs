//! Replay recording and playback.
//!
//! A replay file captures everything a deterministic session needs to be
//! reproduced exactly: the session header (seed, roster, engine version) and
//! one record per committed frame holding the full command list that frame
//! executed. Playing a replay feeds those records through the same commit
//! path a live session uses, so the simulation cannot tell the difference.
//!
//! # Invariants
//! - Records are written in strictly ascending frame order.
//! - Playback rejects files with frame gaps. A gap means the committed
//!   stream is incomplete and deterministic re-execution is impossible.
//! - A truncated trailing record (crash mid-write) is tolerated and treated
//!   as end of file.

pub mod connection;
pub mod format;
pub mod reader;
pub mod writer;

pub use connection::{ReplayConnection, SPECTATOR};
pub use format::{ReplayError, ReplayHeader, ReplayRecord, FORMAT_VERSION};
pub use reader::ReplayReader;
pub use writer::ReplayWriter;
