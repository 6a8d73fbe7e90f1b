//! Random source used by the speed and glitch models.
//!
//! Production playback draws from a seeded `StdRng`; tests replay a fixed
//! list of samples so mode sequences are exact.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;

/// Abstraction over the randomness consumed during playback.
pub trait RandomSource: Send {
    /// Uniform sample in `[0.0, 1.0)`.
    fn next_f64(&mut self) -> f64;

    /// Uniform integer in `[min, max]` inclusive.
    fn range_u64(&mut self, min: u64, max: u64) -> u64;
}

/// `RandomSource` backed by `rand`'s standard generator.
#[derive(Debug, Clone)]
pub struct StdSource(StdRng);

impl StdSource {
    /// Seed from the operating system.
    pub fn from_entropy() -> Self {
        Self(StdRng::from_entropy())
    }

    /// Seed deterministically.
    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl RandomSource for StdSource {
    fn next_f64(&mut self) -> f64 {
        self.0.gen::<f64>()
    }

    fn range_u64(&mut self, min: u64, max: u64) -> u64 {
        if min >= max {
            return min;
        }
        self.0.gen_range(min..=max)
    }
}

/// Replays a fixed list of samples in order.
///
/// Range requests map the next sample onto the range, so `0.0` picks the
/// minimum and anything close to `1.0` picks the maximum. Once the list is
/// exhausted the last sample repeats.
#[derive(Debug, Clone)]
pub struct SequenceSource {
    samples: VecDeque<f64>,
    last: f64,
}

impl SequenceSource {
    pub fn new(samples: impl IntoIterator<Item = f64>) -> Self {
        Self {
            samples: samples.into_iter().collect(),
            last: 0.5,
        }
    }

    /// Number of samples not yet consumed.
    pub fn remaining(&self) -> usize {
        self.samples.len()
    }

    fn next_sample(&mut self) -> f64 {
        if let Some(sample) = self.samples.pop_front() {
            self.last = sample.clamp(0.0, 0.999_999);
        }
        self.last
    }
}

impl RandomSource for SequenceSource {
    fn next_f64(&mut self) -> f64 {
        self.next_sample()
    }

    fn range_u64(&mut self, min: u64, max: u64) -> u64 {
        let sample = self.next_sample();
        if min >= max {
            return min;
        }
        let span = (max - min + 1) as f64;
        (min + (sample * span) as u64).min(max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_std_source_range_is_inclusive() {
        let mut source = StdSource::seeded(11);
        for _ in 0..500 {
            let value = source.range_u64(3, 5);
            assert!((3..=5).contains(&value));
        }
        assert_eq!(source.range_u64(7, 7), 7);
    }

    #[test]
    fn test_sequence_source_maps_ranges() {
        let mut source = SequenceSource::new([0.0, 0.999, 0.5]);
        assert_eq!(source.range_u64(200, 500), 200);
        assert_eq!(source.range_u64(200, 500), 500);
        assert_eq!(source.range_u64(0, 9), 5);
        assert_eq!(source.remaining(), 0);
    }

    #[test]
    fn test_sequence_source_repeats_last_sample() {
        let mut source = SequenceSource::new([0.25]);
        assert_eq!(source.next_f64(), 0.25);
        assert_eq!(source.next_f64(), 0.25);
    }
}
