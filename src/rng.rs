//! Deterministic Random Number Generator
//!
//! PCG (Permuted Congruential Generator) used to shuffle the solver's
//! contact visitation order. The sequence depends only on the seed, so two
//! worlds built and stepped the same way produce identical results.
//!
//! # Example
//!
//! ```
//! use rigid_merge::rng::DeterministicRng;
//!
//! let mut rng = DeterministicRng::new(42);
//! let mut order = [0usize, 1, 2, 3, 4];
//! rng.shuffle(&mut order);
//! ```

/// Deterministic RNG using PCG-XSH-RR (32-bit output)
#[derive(Clone, Debug)]
pub struct DeterministicRng {
    state: u64,
    inc: u64,
}

impl DeterministicRng {
    /// PCG multiplier
    const MULTIPLIER: u64 = 6364136223846793005;

    /// Create RNG with the given seed
    #[must_use]
    pub fn new(seed: u64) -> Self {
        let mut rng = Self {
            state: 0,
            inc: (seed << 1) | 1, // Must be odd
        };
        rng.next_u32();
        rng.state = rng.state.wrapping_add(seed);
        rng.next_u32();
        rng
    }

    /// Generate next u32 value
    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        let old_state = self.state;
        self.state = old_state
            .wrapping_mul(Self::MULTIPLIER)
            .wrapping_add(self.inc);
        // XSH-RR output function
        let xorshifted = (((old_state >> 18) ^ old_state) >> 27) as u32;
        let rot = (old_state >> 59) as u32;
        xorshifted.rotate_right(rot)
    }

    /// Generate random value in [0, max) as u32
    #[inline]
    pub fn next_bounded(&mut self, max: u32) -> u32 {
        if max == 0 {
            return 0;
        }
        // Rejection sampling for uniform distribution
        let threshold = max.wrapping_neg() % max;
        loop {
            let r = self.next_u32();
            if r >= threshold {
                return r % max;
            }
        }
    }

    /// Fisher–Yates shuffle in place
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.next_bounded((i + 1) as u32) as usize;
            items.swap(i, j);
        }
    }
}
