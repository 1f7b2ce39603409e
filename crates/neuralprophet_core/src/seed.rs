//! Seeds for reproducible fitting.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// A seed for deterministic parameter initialization and batch shuffling.
///
/// Two fits on the same data with the same seed produce identical models.
/// Without a seed, every fit draws fresh initial weights.
///
/// # Example
///
/// ```rust
/// use neuralprophet_core::Seed;
/// use rand::Rng;
///
/// let mut a = Seed::new(7).derive("init").to_rng();
/// let mut b = Seed::new(7).derive("init").to_rng();
/// assert_eq!(a.gen::<f32>(), b.gen::<f32>());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Seed(u64);

impl Seed {
    /// Create a new seed with the given value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Create a seed from the current system time.
    ///
    /// Used when no seed was configured.
    #[must_use]
    pub fn from_entropy() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        Self(nanos)
    }

    /// Use `value` when set, otherwise a seed from entropy.
    #[must_use]
    pub fn or_entropy(value: Option<u64>) -> Self {
        value.map_or_else(Self::from_entropy, Self::new)
    }

    /// Get the underlying seed value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Create a ChaCha8 generator from this seed.
    #[must_use]
    pub fn to_rng(&self) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.0)
    }

    /// Derive an independent stream for one consumer of randomness.
    ///
    /// The forecaster derives `"init"` for parameters and `"shuffle"` for the
    /// training loader so that changing the batch size does not change the
    /// initial weights.
    #[must_use]
    pub fn derive(&self, key: &str) -> Self {
        // FNV-1a keeps derived values stable across Rust releases.
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in self.0.to_le_bytes().iter().chain(key.as_bytes()) {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Self(hash)
    }
}

impl Default for Seed {
    fn default() -> Self {
        Self::new(0)
    }
}

impl From<u64> for Seed {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl From<Seed> for u64 {
    fn from(seed: Seed) -> Self {
        seed.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_same_seed_same_stream() {
        let mut rng1 = Seed::new(42).to_rng();
        let mut rng2 = Seed::new(42).to_rng();

        for _ in 0..50 {
            assert_eq!(rng1.gen::<f64>(), rng2.gen::<f64>());
        }
    }

    #[test]
    fn test_derive_is_stable_and_keyed() {
        let master = Seed::new(42);
        assert_eq!(master.derive("init"), master.derive("init"));
        assert_ne!(master.derive("init"), master.derive("shuffle"));
        assert_ne!(master.derive("init"), Seed::new(43).derive("init"));
    }

    #[test]
    fn test_or_entropy_prefers_value() {
        assert_eq!(Seed::or_entropy(Some(5)), Seed::new(5));
    }

    #[test]
    fn test_seed_serialization() {
        let seed = Seed::new(12345);
        let json = serde_json::to_string(&seed).unwrap();
        let restored: Seed = serde_json::from_str(&json).unwrap();
        assert_eq!(seed, restored);
    }
}
