//! Derivation of per-environment seeds.
use crate::error::ScholaError;
use anyhow::Result;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Derives `n` 32-bit seeds from `seed`.
///
/// The result only depends on `seed` and `n`, and the first `k` seeds are the
/// same for every `n >= k`.
pub fn spawn_seeds(seed: u64, n: usize) -> Vec<u64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen::<u32>() as u64).collect()
}

/// Seeds given to a vectorized reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seeds {
    /// One seed, expanded with [`spawn_seeds`].
    Single(u64),

    /// One seed per environment.
    PerEnv(Vec<u64>),
}

impl Seeds {
    /// Returns exactly `n` seeds.
    pub fn resolve(self, n: usize) -> Result<Vec<u64>> {
        match self {
            Self::Single(seed) => Ok(spawn_seeds(seed, n)),
            Self::PerEnv(seeds) if seeds.len() == n => Ok(seeds),
            Self::PerEnv(seeds) => Err(ScholaError::InvalidSeeds {
                expected: n,
                got: seeds.len(),
            }
            .into()),
        }
    }
}

impl From<u64> for Seeds {
    fn from(seed: u64) -> Self {
        Self::Single(seed)
    }
}

impl From<Vec<u64>> for Seeds {
    fn from(seeds: Vec<u64>) -> Self {
        Self::PerEnv(seeds)
    }
}
