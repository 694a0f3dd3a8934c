//! An exponentially decaying sampling reservoir.

use std::collections::BTreeMap;
use std::mem;
use std::sync::atomic::{
    AtomicU64,
    Ordering::{AcqRel, Acquire, Release},
};
use std::time::Duration;

use ordered_float::OrderedFloat;
use parking_lot::{Mutex, RwLock};
use quanta::{Clock, Instant};

use super::{fastrand_unit, Reservoir, Sample};
use crate::error::MetricsError;

const RESCALE_THRESHOLD: Duration = Duration::from_secs(60 * 60);

// Priorities divide a weight by a uniform draw in `(0, 1]`, which can be as small as 2^-53.
// With this much headroom below `f64::MAX`, no priority within a rescale window is infinite.
const PRIORITY_HEADROOM: f64 = 64.0 * std::f64::consts::LN_2;

/// Largest decay factor whose weights stay finite over a full rescale window.
pub fn max_decay_alpha() -> f64 {
    (f64::MAX.ln() - PRIORITY_HEADROOM) / RESCALE_THRESHOLD.as_secs_f64()
}

pub(crate) fn validate_alpha(alpha: f64) -> Result<(), MetricsError> {
    if !alpha.is_finite() || alpha <= 0.0 {
        return Err(MetricsError::invalid(format!(
            "decay factor must be a finite positive number, got {}",
            alpha
        )));
    }
    if alpha >= max_decay_alpha() {
        return Err(MetricsError::invalid(format!(
            "decay factor {} would overflow sample weights, must be below {:.4}",
            alpha,
            max_decay_alpha()
        )));
    }
    Ok(())
}

#[derive(Clone, Copy, Debug)]
struct WeightedSample {
    value: i64,
    weight: f64,
}

/// A reservoir biased towards recent observations.
///
/// Implements the forward-decaying priority sampling described by Cormode et al. in
/// ["Forward Decay: A Practical Time Decay Model for Streaming Systems"][paper].  Each observation
/// is weighted by `exp(alpha * t)`, where `t` is the number of seconds since the current landmark,
/// and kept if its randomized priority ranks among the `size` highest.
///
/// Weights grow without bound as time moves away from the landmark, so once an hour the landmark is
/// moved forward by the first update that notices, and every retained weight is scaled down by
/// the same factor.  Updates and snapshots share a read lock; only the rescale pass takes the
/// write side.  Samples whose weight underflows to zero during a rescale are dropped, so long idle
/// periods fade old data out once new observations arrive.  Snapshots never rescale: reading a
/// reservoir does not change its contents.
///
/// [paper]: http://dimacs.rutgers.edu/~graham/pubs/papers/fwddecay.pdf
pub struct ExponentiallyDecayingReservoir {
    values: Mutex<BTreeMap<OrderedFloat<f64>, WeightedSample>>,
    rescale_lock: RwLock<()>,
    alpha: f64,
    size: usize,
    // Total observations since creation or the last reset.
    count: AtomicU64,
    // Landmark, in whole seconds since `origin`.
    start_time: AtomicU64,
    // Nanoseconds since `origin`.
    next_scale_time: AtomicU64,
    clock: Clock,
    origin: Instant,
}

impl ExponentiallyDecayingReservoir {
    /// Creates a new `ExponentiallyDecayingReservoir`.
    ///
    /// `size` is the number of samples retained, and `alpha` is the decay factor: the higher it is,
    /// the more the sample is biased towards newer values.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::InvalidMeasurement`] if `size` is zero, or `alpha` is not a finite,
    /// positive number below [`max_decay_alpha`].
    pub fn new(size: usize, alpha: f64, clock: Clock) -> Result<Self, MetricsError> {
        if size == 0 {
            return Err(MetricsError::invalid("reservoir capacity must be greater than zero"));
        }
        validate_alpha(alpha)?;

        let origin = clock.now();
        Ok(Self {
            values: Mutex::new(BTreeMap::new()),
            rescale_lock: RwLock::new(()),
            alpha,
            size,
            count: AtomicU64::new(0),
            start_time: AtomicU64::new(0),
            next_scale_time: AtomicU64::new(duration_as_nanos(RESCALE_THRESHOLD)),
            clock,
            origin,
        })
    }

    /// Maximum number of samples retained.
    pub fn capacity(&self) -> usize {
        self.size
    }

    fn now_nanos(&self) -> u64 {
        duration_as_nanos(self.clock.now().duration_since(self.origin))
    }

    fn now_secs(&self) -> u64 {
        self.clock.now().duration_since(self.origin).as_secs()
    }

    fn weight(&self, elapsed_secs: u64) -> f64 {
        // An update racing a rescale can see slightly more than one window since the landmark.
        let elapsed = elapsed_secs.min(RESCALE_THRESHOLD.as_secs());
        (self.alpha * elapsed as f64).exp()
    }

    fn rescale_if_needed(&self) {
        let now = self.now_nanos();
        let next = self.next_scale_time.load(Acquire);
        if now >= next {
            self.rescale(now, next);
        }
    }

    fn rescale(&self, now: u64, next: u64) {
        let _guard = self.rescale_lock.write();

        // Someone else may have rescaled while we waited for the lock.
        let target = now.saturating_add(duration_as_nanos(RESCALE_THRESHOLD));
        if self.next_scale_time.compare_exchange(next, target, AcqRel, Acquire).is_err() {
            return;
        }

        let old_start = self.start_time.load(Acquire);
        let new_start = self.now_secs();
        self.start_time.store(new_start, Release);

        let factor = (-self.alpha * new_start.saturating_sub(old_start) as f64).exp();

        let mut values = self.values.lock();
        let old = mem::take(&mut *values);
        if factor > 0.0 {
            for (priority, sample) in old {
                let weight = sample.weight * factor;
                if weight > 0.0 {
                    values.insert(
                        OrderedFloat(priority.0 * factor),
                        WeightedSample { value: sample.value, weight },
                    );
                }
            }
        }
    }
}

impl Reservoir for ExponentiallyDecayingReservoir {
    fn update(&self, value: i64) {
        self.rescale_if_needed();

        let _guard = self.rescale_lock.read();
        let elapsed = self.now_secs().saturating_sub(self.start_time.load(Acquire));
        let weight = self.weight(elapsed);
        let priority = OrderedFloat(weight / fastrand_unit());
        let sample = WeightedSample { value, weight };

        self.count.fetch_add(1, AcqRel);
        let mut values = self.values.lock();
        if values.len() < self.size {
            values.insert(priority, sample);
        } else if let Some((first, _)) = values.first_key_value() {
            if *first < priority && !values.contains_key(&priority) {
                values.insert(priority, sample);
                values.pop_first();
            }
        }
    }

    fn snapshot(&self) -> Sample {
        let _guard = self.rescale_lock.read();
        let values = self.values.lock();
        let pairs = values.values().map(|s| (s.value, s.weight)).collect();
        Sample::weighted(pairs, self.count.load(Acquire))
    }

    fn size(&self) -> usize {
        self.values.lock().len()
    }

    fn reset(&self) {
        let _guard = self.rescale_lock.write();
        self.values.lock().clear();
        self.count.store(0, Release);
        self.start_time.store(self.now_secs(), Release);
        self.next_scale_time
            .store(self.now_nanos().saturating_add(duration_as_nanos(RESCALE_THRESHOLD)), Release);
    }
}

fn duration_as_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}
