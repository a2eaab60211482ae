use std::fmt;
use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of randomness for backoff jitter and recommendation shuffling.
///
/// Production code uses [`ThreadRandom`]; tests inject [`SeededRandom`] or a
/// hand-written source so sequences are reproducible.
pub trait RandomSource: Send + Sync + fmt::Debug {
    /// Uniform sample in `[0, 1)`.
    fn unit(&self) -> f64;

    /// Uniform index in `[0, upper)`. `upper` is always greater than zero.
    fn index(&self, upper: usize) -> usize;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn unit(&self) -> f64 {
        rand::rng().random::<f64>()
    }

    fn index(&self, upper: usize) -> usize {
        rand::rng().random_range(0..upper)
    }
}

/// Deterministic source backed by a seeded `StdRng`.
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandom {
    fn unit(&self) -> f64 {
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .random::<f64>()
    }

    fn index(&self, upper: usize) -> usize {
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .random_range(0..upper)
    }
}

/// Fisher-Yates shuffle driven by an injected source.
pub fn shuffle<T>(items: &mut [T], random: &dyn RandomSource) {
    for i in (1..items.len()).rev() {
        let j = random.index(i + 1);
        items.swap(i, j);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_shuffle_is_reproducible() {
        let mut first: Vec<u32> = (0..20).collect();
        let mut second = first.clone();

        shuffle(&mut first, &SeededRandom::new(7));
        shuffle(&mut second, &SeededRandom::new(7));

        assert_eq!(first, second);
    }

    #[test]
    fn test_shuffle_keeps_every_item() {
        let mut items: Vec<u32> = (0..50).collect();
        shuffle(&mut items, &ThreadRandom);

        let mut sorted = items.clone();
        sorted.sort();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_shuffle_handles_empty_and_single() {
        let mut empty: Vec<u32> = vec![];
        shuffle(&mut empty, &ThreadRandom);
        assert!(empty.is_empty());

        let mut single = vec![1];
        shuffle(&mut single, &ThreadRandom);
        assert_eq!(single, vec![1]);
    }

    #[test]
    fn test_unit_range() {
        let random = SeededRandom::new(42);
        for _ in 0..1000 {
            let value = random.unit();
            assert!((0.0..1.0).contains(&value));
        }
    }
}
