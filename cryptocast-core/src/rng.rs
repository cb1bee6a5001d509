//! Deterministic RNG hierarchy.
//!
//! A master seed generates deterministic sub-seeds for each `(stream, index)`
//! pair, e.g. `("lstm-init", 0)` or `("dropout", epoch)`. Sub-seeds are derived
//! via BLAKE3 hashing, so they do not depend on the order they are requested in.

use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Debug, Clone)]
pub struct RngHierarchy {
    master_seed: u64,
}

impl RngHierarchy {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Derive a deterministic sub-seed for a named stream and index.
    pub fn sub_seed(&self, stream: &str, index: u64) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(stream.as_bytes());
        hasher.update(&index.to_le_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(bytes)
    }

    /// Create a seeded StdRng for a stream and index.
    pub fn rng_for(&self, stream: &str, index: u64) -> StdRng {
        StdRng::seed_from_u64(self.sub_seed(stream, index))
    }
}
