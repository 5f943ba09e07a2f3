use lockstep_common::{Command, Frame};

use crate::rng::SyncRandom;
use crate::sync::StateHasher;

/// The simulation advanced by the lockstep core.
///
/// The order manager owns the attached world exclusively: once attached, no
/// other component mutates it. `advance` is the single entry point, called
/// exactly once per committed frame with that frame's commands in their
/// total order.
pub trait World {
    /// Apply `commands` in the given order, then advance one simulation
    /// step. `shared` is the simulation-shared random generator; drawing
    /// from any other randomness source here breaks cross-participant
    /// determinism.
    fn advance(&mut self, frame: Frame, commands: &[Command], shared: &mut SyncRandom);

    /// Feed every piece of state that must stay bit-identical across
    /// participants into the hasher. Participant-local state (cameras,
    /// caches, cosmetic randomness) must not be written here.
    fn hash_state(&self, hasher: &mut StateHasher);
}
