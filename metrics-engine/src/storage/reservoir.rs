//! A uniform sampling reservoir.

use std::sync::atomic::{
    AtomicI64, AtomicU64,
    Ordering::{AcqRel, Acquire, Relaxed, Release},
};

use parking_lot::RwLock;

use super::{fastrand, Reservoir, Sample};
use crate::error::MetricsError;

/// A uniform sampling reservoir.
///
/// [Reservoir sampling][rs] is a technique used to produce a statistically representative sample of a data stream, in a
/// fixed space, without knowing the length of the stream in advance. `UniformReservoir` is a thread-safe version of a
/// sampling reservoir, based on Vitter's ["Algorithm R"][vitter_paper].
///
/// The first `capacity` observations are always kept.  Observation `n > capacity` replaces a uniformly chosen slot with
/// probability `capacity / n`, so every observation has the same chance of being in the final sample.  Updates are a
/// single atomic increment plus, at most, one atomic store, and use a fast, thread-local PRNG
/// ([Xoshiro256**][xoshiro256starstar]) to limit the per-call sampling overhead.
///
/// Updates run concurrently under the shared side of a lock, while snapshots and resets take the exclusive side, so a
/// snapshot never sees a slot that has been counted but not yet written.
///
/// [rs]: https://en.wikipedia.org/wiki/Reservoir_sampling
/// [vitter_paper]: https://www.cs.umd.edu/~samir/498/vitter.pdf
/// [xoshiro256starstar]: https://prng.di.unimi.it
pub struct UniformReservoir {
    values: Box<[AtomicI64]>,
    count: AtomicU64,
    publish: RwLock<()>,
}

impl UniformReservoir {
    /// Creates a new `UniformReservoir` that stores up to `capacity` samples.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::InvalidMeasurement`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, MetricsError> {
        if capacity == 0 {
            return Err(MetricsError::invalid("reservoir capacity must be greater than zero"));
        }

        let values = (0..capacity).map(|_| AtomicI64::new(0)).collect::<Vec<_>>();
        Ok(Self {
            values: values.into_boxed_slice(),
            count: AtomicU64::new(0),
            publish: RwLock::new(()),
        })
    }

    /// Maximum number of samples retained.
    pub fn capacity(&self) -> usize {
        self.values.len()
    }
}

impl Reservoir for UniformReservoir {
    fn update(&self, value: i64) {
        let _guard = self.publish.read();
        let seen = self.count.fetch_add(1, AcqRel);
        let capacity = self.values.len() as u64;
        if seen < capacity {
            self.values[seen as usize].store(value, Release);
        } else {
            let maybe_idx = fastrand(seen + 1);
            if maybe_idx < capacity {
                self.values[maybe_idx as usize].store(value, Release);
            }
        }
    }

    fn snapshot(&self) -> Sample {
        let _guard = self.publish.write();
        let count = self.count.load(Acquire);
        let len = count.min(self.values.len() as u64) as usize;
        let values = self.values[..len].iter().map(|v| v.load(Acquire)).collect();
        Sample::uniform(values, count)
    }

    fn size(&self) -> usize {
        let count = self.count.load(Relaxed);
        count.min(self.values.len() as u64) as usize
    }

    fn reset(&self) {
        let _guard = self.publish.write();
        for value in self.values.iter() {
            value.store(0, Relaxed);
        }
        self.count.store(0, Release);
    }
}

#[cfg(test)]
mod tests {
    use super::UniformReservoir;
    use crate::storage::Reservoir;
    use proptest::prelude::*;
    use std::sync::Arc;

    #[test]
    fn test_rejects_zero_capacity() {
        assert!(UniformReservoir::new(0).is_err());
    }

    #[test]
    fn test_overflow_keeps_capacity() {
        let reservoir = UniformReservoir::new(100).unwrap();
        for i in 0..10_000 {
            reservoir.update(i);
        }

        let sample = reservoir.snapshot();
        assert_eq!(sample.len(), 100);
        assert_eq!(sample.count(), 10_000);
        assert!(sample.values().iter().all(|v| (0..10_000).contains(v)));
        assert_eq!(reservoir.size(), 100);
    }

    #[test]
    fn test_capacity_of_one() {
        let reservoir = UniformReservoir::new(1).unwrap();
        for i in 0..50 {
            reservoir.update(i);
        }
        let sample = reservoir.snapshot();
        assert_eq!(sample.len(), 1);
        assert_eq!(sample.count(), 50);
    }

    #[test]
    fn test_reset() {
        let reservoir = UniformReservoir::new(8).unwrap();
        reservoir.update(3);
        reservoir.reset();
        assert!(reservoir.snapshot().is_empty());

        reservoir.update(9);
        assert_eq!(reservoir.snapshot().values(), &[9]);
    }

    #[test]
    fn test_inclusion_frequency_converges() {
        // Stream 0..N through a reservoir of C slots many times; each value should be retained in
        // roughly C/N of the trials.
        const CAPACITY: usize = 10;
        const STREAM: i64 = 50;
        const TRIALS: usize = 20_000;

        let mut hits = [0usize; STREAM as usize];
        for _ in 0..TRIALS {
            let reservoir = UniformReservoir::new(CAPACITY).unwrap();
            for i in 0..STREAM {
                reservoir.update(i);
            }
            for value in reservoir.snapshot().values() {
                hits[*value as usize] += 1;
            }
        }

        let expected = CAPACITY as f64 / STREAM as f64;
        for (value, count) in hits.iter().enumerate() {
            let observed = *count as f64 / TRIALS as f64;
            assert!(
                (observed - expected).abs() < 0.03,
                "value {} observed at {:.4}, expected {:.4}",
                value,
                observed,
                expected
            );
        }
    }

    #[test]
    fn test_concurrent_updates() {
        let reservoir = Arc::new(UniformReservoir::new(64).unwrap());
        let handles = (0..4)
            .map(|t| {
                let reservoir = Arc::clone(&reservoir);
                std::thread::spawn(move || {
                    for i in 0..1_000 {
                        reservoir.update(t * 1_000 + i);
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().expect("producer panicked");
        }

        let sample = reservoir.snapshot();
        assert_eq!(sample.count(), 4_000);
        assert_eq!(sample.len(), 64);
    }

    #[test]
    fn test_snapshots_only_see_written_slots() {
        let reservoir = Arc::new(UniformReservoir::new(256).unwrap());
        for _ in 0..256 {
            reservoir.update(-1);
        }
        reservoir.reset();

        let handles = (0..4)
            .map(|_| {
                let reservoir = Arc::clone(&reservoir);
                std::thread::spawn(move || {
                    for i in 1..=2_000 {
                        reservoir.update(i);
                    }
                })
            })
            .collect::<Vec<_>>();

        for _ in 0..500 {
            let sample = reservoir.snapshot();
            assert!(sample.values().iter().all(|v| *v > 0), "unwritten slot in {:?}", sample);
        }
        for handle in handles {
            handle.join().expect("producer panicked");
        }
        assert_eq!(reservoir.snapshot().count(), 8_000);
    }

    proptest! {
        #[test]
        fn property_no_loss_below_capacity(
            values in prop::collection::vec(any::<i64>(), 0..256),
            headroom in 0usize..64,
        ) {
            let capacity = values.len().max(1) + headroom;
            let reservoir = UniformReservoir::new(capacity).unwrap();
            for value in &values {
                reservoir.update(*value);
            }

            let mut expected = values.clone();
            expected.sort_unstable();
            let sample = reservoir.snapshot();
            prop_assert_eq!(sample.values(), expected.as_slice());
            prop_assert_eq!(sample.count(), values.len() as u64);
        }
    }
}
