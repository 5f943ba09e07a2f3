//! Simulation seam for the lockstep engine.
//!
//! The synchronization core never inspects simulation state directly; it
//! drives any [`World`] implementation through a single advance-one-frame
//! entry point and reads back a structural digest via the [`SyncGuard`].
//!
//! # Invariants
//! - Everything that feeds the state digest must be bit-identical across
//!   participants for the same command sequence and seed.
//! - The simulation-shared random generator is only reachable inside the
//!   guard's synced sections; the cosmetic generator only outside them.

pub mod demo;
pub mod rng;
pub mod sync;
pub mod world;

pub use demo::{DemoCommand, DemoWorld};
pub use rng::SyncRandom;
pub use sync::{StateHasher, SyncGuard, SyncReport};
pub use world::World;
