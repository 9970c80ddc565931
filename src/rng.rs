//! Random number generation for conditional evaluation and lane effectors.
//!
//! The BMS preprocessor (`#RANDOM`, `#SWITCH`) and the lane permutation
//! effectors both need a random source that is reproducible from a caller
//! supplied seed. There is no process-global state: every loader call and
//! every effector pass owns its generator.
//!
//! # Implementations
//!
//! - [`RngMock`] replays a fixed value sequence, for tests.
//! - [`SplitMix64`] is the dependency-free seeded generator used by default.
//! - [`RandRng`] wraps any [`rand::Rng`] (behind the `rand` feature).

use core::ops::RangeInclusive;

/// A random number source.
///
/// The generated number must lie within the requested `range` (inclusive).
pub trait Rng {
    /// Generates a random integer within `range`.
    fn generate(&mut self, range: RangeInclusive<u64>) -> u64;
}

impl<T: Rng + ?Sized> Rng for Box<T> {
    fn generate(&mut self, range: RangeInclusive<u64>) -> u64 {
        T::generate(self, range)
    }
}

impl<T: Rng + ?Sized> Rng for &mut T {
    fn generate(&mut self, range: RangeInclusive<u64>) -> u64 {
        T::generate(self, range)
    }
}

/// A deterministic mock generator returning predefined values in rotation.
///
/// ```
/// use chart_rs::rng::{Rng, RngMock};
///
/// let mut rng = RngMock([1u64, 2u64]);
/// assert_eq!(rng.generate(0..=10), 1);
/// assert_eq!(rng.generate(0..=10), 2);
/// assert_eq!(rng.generate(0..=10), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RngMock<const N: usize>(pub [u64; N]);

impl<const N: usize> Rng for RngMock<N> {
    fn generate(&mut self, _range: RangeInclusive<u64>) -> u64 {
        let Some(first) = self.0.first().copied() else {
            return 0;
        };
        self.0.rotate_left(1);
        first
    }
}

/// The default seeded generator, a SplitMix64 sequence.
///
/// Cheap, stateless beyond one word, and identical output for identical
/// seeds on every platform, which is all the preprocessor and the
/// effectors require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SplitMix64 {
    state: u64,
}

impl SplitMix64 {
    /// Creates a generator from `seed`.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Returns the next raw 64-bit value of the sequence.
    pub const fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }
}

impl Rng for SplitMix64 {
    fn generate(&mut self, range: RangeInclusive<u64>) -> u64 {
        let start = *range.start();
        let end = *range.end();
        let width = end.wrapping_sub(start).wrapping_add(1);
        if width == 0 {
            // Full u64 range.
            self.next_u64()
        } else {
            (self.next_u64() % width) + start
        }
    }
}

/// A generator backed by the [`rand`] crate.
///
/// ```
/// # #[cfg(feature = "rand")] {
/// use chart_rs::rng::{RandRng, Rng};
/// use rand::{SeedableRng, rngs::StdRng};
///
/// let mut rng = RandRng(StdRng::seed_from_u64(42));
/// let n = rng.generate(1..=10);
/// assert!((1..=10).contains(&n));
/// # }
/// ```
///
/// [`rand`]: https://crates.io/crates/rand
#[cfg(feature = "rand")]
pub struct RandRng<R>(pub R);

#[cfg(feature = "rand")]
impl<R: rand::Rng> Rng for RandRng<R> {
    fn generate(&mut self, range: RangeInclusive<u64>) -> u64 {
        let start = *range.start();
        let end = *range.end();
        let width = end.wrapping_sub(start).wrapping_add(1);
        if width == 0 {
            self.0.next_u64()
        } else {
            (self.0.next_u64() % width) + start
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splitmix_is_reproducible() {
        let mut a = SplitMix64::new(7);
        let mut b = SplitMix64::new(7);
        for _ in 0..32 {
            assert_eq!(a.generate(1..=6), b.generate(1..=6));
        }
    }

    #[test]
    fn splitmix_stays_in_range() {
        let mut rng = SplitMix64::new(0xDEAD_BEEF);
        for _ in 0..1000 {
            let n = rng.generate(1..=6);
            assert!((1..=6).contains(&n));
        }
    }

    #[test]
    fn mock_rotates() {
        let mut rng = RngMock([3, 1]);
        assert_eq!(rng.generate(0..=9), 3);
        assert_eq!(rng.generate(0..=9), 1);
        assert_eq!(rng.generate(0..=9), 3);
    }
}
