use serde::{Deserialize, Serialize};

/// Deterministic pseudo-random generator for simulation use.
///
/// Splitmix64 based: fast, high quality, and reproducible across platforms
/// without depending on floating-point behaviour. Tracks how many values
/// have been drawn so a sync report can record RNG consumption alongside
/// the state digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRandom {
    seed: u64,
    state: u64,
    calls: u64,
}

impl SyncRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            state: seed,
            calls: 0,
        }
    }

    /// The seed this generator was constructed with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of values drawn since construction.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    /// The current internal state. Two generators with the same seed and
    /// the same draw sequence have equal state hashes.
    pub fn state_hash(&self) -> u64 {
        self.state
    }

    /// Draw the next value.
    pub fn next_u64(&mut self) -> u64 {
        self.calls += 1;
        self.state = self.state.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }

    /// Draw a value in `0..bound`. Returns 0 for `bound == 0`.
    pub fn next_below(&mut self, bound: u64) -> u64 {
        if bound == 0 {
            return 0;
        }
        self.next_u64() % bound
    }

    /// Draw a signed offset in `-range..=range`.
    pub fn next_offset(&mut self, range: i64) -> i64 {
        if range <= 0 {
            return 0;
        }
        let span = (2 * range + 1) as u64;
        self.next_below(span) as i64 - range
    }
}
