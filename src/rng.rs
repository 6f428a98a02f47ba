//! Seeded RNG shared by `note_generator`, `judge`, and `monster` so a
//! full run is reproducible from `(StageConfig, seed)` per Testable
//! Property 1.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}
