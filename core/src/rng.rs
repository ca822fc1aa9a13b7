//! Deterministic random number generation.
//!
//! RULE: Nothing in the pipeline may call any platform RNG.
//! All randomness flows through StreamRng instances derived
//! from the single `random_seed` in the hyperparameters.
//!
//! Each consumer gets its own stream, seeded deterministically
//! from (master_seed XOR slot XOR tree index). This means:
//!   - Trees can be built in any order, on any thread, with identical results.
//!   - Adding trees never changes the streams of existing trees.

use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;

/// A named, deterministic RNG for a single consumer.
pub struct StreamRng {
    pub name: &'static str,
    inner: Pcg64Mcg,
}

impl StreamRng {
    /// Create a stream from the master seed and a stable stream index.
    pub fn new(master_seed: u64, stream_index: u64) -> Self {
        let derived_seed = master_seed ^ (stream_index.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        Self {
            name: "unnamed",
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Roll a usize in [0, n).
    pub fn next_below(&mut self, n: usize) -> usize {
        use rand::RngCore;
        assert!(n > 0, "n must be > 0");
        (self.inner.next_u64() % n as u64) as usize
    }

    /// In-place Fisher-Yates shuffle.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.next_below(i + 1);
            items.swap(i, j);
        }
    }

    /// Draw `k` distinct indices from [0, n) in draw order.
    pub fn sample_indices(&mut self, n: usize, k: usize) -> Vec<usize> {
        let k = k.min(n);
        let mut pool: Vec<usize> = (0..n).collect();
        for i in 0..k {
            let j = i + self.next_below(n - i);
            pool.swap(i, j);
        }
        pool.truncate(k);
        pool
    }
}

/// All RNG streams for a single training run.
pub struct RngBank {
    master_seed: u64,
}

impl RngBank {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn for_slot(&self, slot: StreamSlot) -> StreamRng {
        StreamRng::new(self.master_seed, slot as u64).with_name(slot.name())
    }

    /// Stream for one tree of the ensemble. Tree streams live above the
    /// fixed slots so they never alias them.
    pub fn for_tree(&self, slot: StreamSlot, tree_index: usize) -> StreamRng {
        let index = ((tree_index as u64 + 1) << 8) | slot as u64;
        StreamRng::new(self.master_seed, index).with_name(slot.name())
    }
}

/// Stable stream slot assignments.
/// NEVER reorder or remove entries; only append.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum StreamSlot {
    HoldoutSplit    = 0,
    Bootstrap       = 1,
    FeatureSampling = 2,
}

impl StreamSlot {
    pub fn name(&self) -> &'static str {
        match self {
            Self::HoldoutSplit    => "holdout_split",
            Self::Bootstrap       => "bootstrap",
            Self::FeatureSampling => "feature_sampling",
        }
    }
}
