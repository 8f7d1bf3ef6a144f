use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::FaceIdError;

/// Draws candidate identity ids.
pub trait IdSource: Send {
    /// Return a value in `min..=max`.
    fn sample(&mut self, min: i64, max: i64) -> i64;
}

/// Uniform random ids from a seedable RNG.
#[derive(Debug)]
pub struct RandomIds {
    rng: StdRng,
}

impl RandomIds {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic sequence, for tests and reproducible runs.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomIds {
    fn default() -> Self {
        Self::new()
    }
}

impl IdSource for RandomIds {
    fn sample(&mut self, min: i64, max: i64) -> i64 {
        self.rng.gen_range(min..=max)
    }
}

/// Sample ids until `is_taken` rejects none, up to `attempts` draws.
pub fn generate_identity_id(
    source: &mut dyn IdSource,
    min: i64,
    max: i64,
    attempts: usize,
    mut is_taken: impl FnMut(i64) -> bool,
) -> Result<i64, FaceIdError> {
    for attempt in 0..attempts {
        let id = source.sample(min, max);
        if !is_taken(id) {
            return Ok(id);
        }
        debug!(id, attempt, "faceid: identity id collision");
    }
    Err(FaceIdError::IdentifierExhausted { attempts })
}
