use lockstep_common::Frame;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::rng::SyncRandom;
use crate::world::World;

/// Incremental SHA-256 hasher over sync-relevant state, truncated to a
/// `u64` for cheap comparison and wire transfer.
///
/// Callers feed fields in a fixed order; the digest is only meaningful when
/// every participant feeds identical bytes.
#[derive(Default)]
pub struct StateHasher {
    inner: Sha256,
}

impl StateHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
    }

    pub fn write_u64(&mut self, value: u64) {
        self.inner.update(value.to_le_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.inner.update(value.to_le_bytes());
    }

    /// Consume the hasher and return the truncated digest.
    pub fn finish(self) -> u64 {
        let digest = self.inner.finalize();
        u64::from_le_bytes(digest[..8].try_into().expect("digest is 32 bytes"))
    }
}

/// Per-frame synchronization report.
///
/// Produced once per committed frame, immutable afterwards, and used only
/// for comparison against peer reports — never as simulation input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub frame: Frame,
    pub hash: u64,
    pub shared_random_calls: u64,
}

/// Boundary between synchronized simulation code and participant-local
/// code.
///
/// Holds both random generators: the simulation-shared one (seeded
/// identically on every participant) is handed out only by [`run_synced`];
/// the cosmetic one (seeded independently per participant) only by
/// [`run_unsynced`]. The borrow checker enforces that neither leaks into
/// the other section.
///
/// [`run_synced`]: SyncGuard::run_synced
/// [`run_unsynced`]: SyncGuard::run_unsynced
#[derive(Debug)]
pub struct SyncGuard {
    shared: SyncRandom,
    cosmetic: SyncRandom,
}

impl SyncGuard {
    /// `shared_seed` comes from the lobby and must match on every
    /// participant; `cosmetic_seed` is local (wall clock, process id,
    /// anything).
    pub fn new(shared_seed: u64, cosmetic_seed: u64) -> Self {
        Self {
            shared: SyncRandom::new(shared_seed),
            cosmetic: SyncRandom::new(cosmetic_seed),
        }
    }

    /// Run simulation-affecting code with access to the shared generator.
    pub fn run_synced<R>(&mut self, f: impl FnOnce(&mut SyncRandom) -> R) -> R {
        f(&mut self.shared)
    }

    /// Run participant-local code with access to the cosmetic generator.
    pub fn run_unsynced<R>(&mut self, f: impl FnOnce(&mut SyncRandom) -> R) -> R {
        f(&mut self.cosmetic)
    }

    /// Compute the structural digest of `world` for `frame` and wrap it in
    /// a report. The shared generator's state participates in the digest,
    /// so divergent RNG consumption shows up even when the visible state
    /// still agrees.
    pub fn checksum<W: World + ?Sized>(&self, frame: Frame, world: &W) -> SyncReport {
        let mut hasher = StateHasher::new();
        hasher.write_u64(frame);
        world.hash_state(&mut hasher);
        hasher.write_u64(self.shared.state_hash());
        SyncReport {
            frame,
            hash: hasher.finish(),
            shared_random_calls: self.shared.calls(),
        }
    }

    pub fn shared_seed(&self) -> u64 {
        self.shared.seed()
    }
}
