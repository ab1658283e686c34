//! Deterministic Random Number Generator
//!
//! Uses Xorshift128+ for fast, deterministic randomness.
//! Spawn jitter and the reshuffle coin flip both draw from here, so a
//! recorded event stream replays to the same teams and positions.

use serde::{Serialize, Deserialize};
use sha2::{Sha256, Digest};

/// Deterministic PRNG using Xorshift128+ algorithm.
///
/// # Example
///
/// ```
/// use dogfight::core::rng::DeterministicRng;
///
/// let mut a = DeterministicRng::new(12345);
/// let mut b = DeterministicRng::new(12345);
/// assert_eq!(a.next_u64(), b.next_u64());
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: [u64; 2],
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DeterministicRng {
    /// Create a new RNG from a 64-bit seed.
    ///
    /// Uses SplitMix64 to initialize the internal state, ensuring
    /// good distribution even from weak seeds.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let state0 = splitmix64(&mut s);
        let state1 = splitmix64(&mut s);

        // Ensure state is never all zeros
        let state = if state0 == 0 && state1 == 0 {
            [1, 1]
        } else {
            [state0, state1]
        };

        Self { state }
    }

    /// Create the RNG for one match of a server run.
    pub fn for_match(server_seed: u64, sequence: u32) -> Self {
        Self::new(derive_match_seed(server_seed, sequence))
    }

    /// Generate the next 64-bit random value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);

        result
    }

    /// Generate a random integer in range [0, max).
    #[inline]
    pub fn next_int(&mut self, max: u32) -> u32 {
        if max == 0 {
            return 0;
        }
        // Simple modulo - slight bias for very large max, but acceptable
        (self.next_u64() % max as u64) as u32
    }

    /// Generate a random integer in range [min, max], both ends inclusive.
    #[inline]
    pub fn next_int_range(&mut self, min: i32, max: i32) -> i32 {
        if min >= max {
            return min;
        }
        let range = (max as i64 - min as i64 + 1) as u32;
        (min as i64 + self.next_int(range) as i64) as i32
    }

    /// Fair coin.
    #[inline]
    pub fn coin_flip(&mut self) -> bool {
        self.next_int(2) == 0
    }
}

/// SplitMix64 for seed initialization.
/// Produces well-distributed values from sequential seeds.
#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Derive the seed for a single match.
///
/// Mixing the match sequence into the server seed keeps consecutive
/// matches independent while the whole run stays reproducible.
pub fn derive_match_seed(server_seed: u64, sequence: u32) -> u64 {
    let mut hasher = Sha256::new();

    // Domain separator
    hasher.update(b"DOGFIGHT_MATCH_SEED_V1");
    hasher.update(server_seed.to_le_bytes());
    hasher.update(sequence.to_le_bytes());

    let hash = hasher.finalize();

    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash[0..8]);
    u64::from_le_bytes(bytes)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rng_determinism() {
        let mut rng1 = DeterministicRng::new(12345);
        let mut rng2 = DeterministicRng::new(12345);

        for _ in 0..1000 {
            assert_eq!(rng1.next_u64(), rng2.next_u64());
        }
    }

    #[test]
    fn test_rng_different_seeds() {
        let mut rng1 = DeterministicRng::new(12345);
        let mut rng2 = DeterministicRng::new(54321);

        assert_ne!(rng1.next_u64(), rng2.next_u64());
    }

    #[test]
    fn test_next_int() {
        let mut rng = DeterministicRng::new(1234);

        for _ in 0..1000 {
            assert!(rng.next_int(100) < 100);
        }

        assert_eq!(rng.next_int(0), 0);
        assert_eq!(rng.next_int(1), 0);
    }

    #[test]
    fn test_next_int_range_is_inclusive() {
        let mut rng = DeterministicRng::new(5678);
        let mut seen_min = false;
        let mut seen_max = false;

        for _ in 0..2000 {
            let val = rng.next_int_range(-3, 3);
            assert!((-3..=3).contains(&val));
            seen_min |= val == -3;
            seen_max |= val == 3;
        }

        assert!(seen_min && seen_max);
        assert_eq!(rng.next_int_range(5, 5), 5);
    }

    #[test]
    fn test_coin_flip_hits_both_sides() {
        let mut rng = DeterministicRng::new(42);
        let heads = (0..200).filter(|_| rng.coin_flip()).count();
        assert!(heads > 0 && heads < 200);
    }

    #[test]
    fn test_derive_match_seed() {
        let seed1 = derive_match_seed(7, 1);
        let seed2 = derive_match_seed(7, 1);
        assert_eq!(seed1, seed2);

        assert_ne!(seed1, derive_match_seed(7, 2));
        assert_ne!(seed1, derive_match_seed(8, 1));
    }
}
