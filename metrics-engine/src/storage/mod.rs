//! Sampling reservoirs backing histograms and timers.

use std::cell::UnsafeCell;
use std::sync::Arc;

use quanta::Clock;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

use crate::error::MetricsError;

mod decaying;
pub use self::decaying::{max_decay_alpha, ExponentiallyDecayingReservoir};

mod reservoir;
pub use self::reservoir::UniformReservoir;

mod sample;
pub use self::sample::Sample;

/// Default number of samples retained by a reservoir.
///
/// 1028 samples offer a 99.9% confidence level with a 5% margin of error, assuming a normal
/// distribution.
pub const DEFAULT_RESERVOIR_SIZE: usize = 1028;

/// Default decay factor for [`ExponentiallyDecayingReservoir`].
///
/// Heavily biases the reservoir towards the last five minutes of observations.
pub const DEFAULT_DECAY_ALPHA: f64 = 0.015;

thread_local! {
    static FAST_RNG: UnsafeCell<Xoshiro256StarStar> = {
        UnsafeCell::new(Xoshiro256StarStar::from_rng(&mut rand::rng()))
    };
}

fn with_rng<T>(f: impl FnOnce(&mut Xoshiro256StarStar) -> T) -> T {
    FAST_RNG.with(|rng| {
        // SAFETY: We know it's safe to take a mutable reference since we're getting a pointer to a thread-local value,
        // and the reference never outlives the closure executing on this thread.
        let rng = unsafe { &mut *rng.get() };
        f(rng)
    })
}

/// Uniform integer in `[0, upper)`.
pub(crate) fn fastrand(upper: u64) -> u64 {
    with_rng(|rng| rng.random_range(0..upper))
}

/// Uniform float in `(0, 1]`.
pub(crate) fn fastrand_unit() -> f64 {
    with_rng(|rng| 1.0 - rng.random::<f64>())
}

/// A fixed-capacity statistical sample of an unbounded stream of values.
///
/// Implementations must be safe to update from many threads at once, and must never retain more
/// values than their configured capacity.
pub trait Reservoir: Send + Sync {
    /// Records a single observation.
    fn update(&self, value: i64);

    /// Takes an immutable snapshot of the retained values.
    fn snapshot(&self) -> Sample;

    /// Number of values currently retained.
    fn size(&self) -> usize;

    /// Discards every retained value.
    fn reset(&self);
}

/// How histograms and timers sample the values recorded into them.
#[derive(Clone, Debug, PartialEq)]
pub enum SamplingPolicy {
    /// Every observation has an equal chance of being retained.
    Uniform {
        /// Number of samples retained.
        size: usize,
    },

    /// Recent observations are favoured over older ones.
    ExponentiallyDecaying {
        /// Number of samples retained.
        size: usize,
        /// Decay factor; higher values forget older observations faster.
        alpha: f64,
    },
}

impl SamplingPolicy {
    /// Checks that the policy describes a constructible reservoir.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::InvalidMeasurement`] for a zero size, or a decay factor that is not
    /// a finite, positive number below [`max_decay_alpha`].
    pub fn validate(&self) -> Result<(), MetricsError> {
        match *self {
            SamplingPolicy::Uniform { size } | SamplingPolicy::ExponentiallyDecaying { size, .. }
                if size == 0 =>
            {
                Err(MetricsError::invalid("reservoir capacity must be greater than zero"))
            }
            SamplingPolicy::ExponentiallyDecaying { alpha, .. } => decaying::validate_alpha(alpha),
            SamplingPolicy::Uniform { .. } => Ok(()),
        }
    }

    /// Builds a reservoir for this policy.
    pub fn build(&self, clock: &Clock) -> Result<Arc<dyn Reservoir>, MetricsError> {
        self.validate()?;

        let reservoir: Arc<dyn Reservoir> = match *self {
            SamplingPolicy::Uniform { size } => Arc::new(UniformReservoir::new(size)?),
            SamplingPolicy::ExponentiallyDecaying { size, alpha } => {
                Arc::new(ExponentiallyDecayingReservoir::new(size, alpha, clock.clone())?)
            }
        };
        Ok(reservoir)
    }
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        SamplingPolicy::ExponentiallyDecaying {
            size: DEFAULT_RESERVOIR_SIZE,
            alpha: DEFAULT_DECAY_ALPHA,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{fastrand, fastrand_unit, max_decay_alpha, SamplingPolicy};
    use crate::error::MetricsError;
    use quanta::Clock;

    #[test]
    fn test_policy_validation() {
        assert!(SamplingPolicy::default().validate().is_ok());
        assert!(SamplingPolicy::Uniform { size: 10 }.validate().is_ok());

        let zero = SamplingPolicy::Uniform { size: 0 };
        assert!(matches!(zero.validate(), Err(MetricsError::InvalidMeasurement { .. })));

        for alpha in [0.0, -0.5, 1.0, max_decay_alpha(), f64::NAN, f64::INFINITY] {
            let policy = SamplingPolicy::ExponentiallyDecaying { size: 10, alpha };
            assert!(policy.build(&Clock::new()).is_err(), "alpha {} accepted", alpha);
        }
    }

    #[test]
    fn test_policy_build() {
        let (clock, _mock) = Clock::mock();
        let reservoir = SamplingPolicy::Uniform { size: 4 }.build(&clock).unwrap();
        for i in 0..3 {
            reservoir.update(i);
        }
        assert_eq!(reservoir.size(), 3);

        let reservoir = SamplingPolicy::default().build(&clock).unwrap();
        reservoir.update(5);
        assert_eq!(reservoir.snapshot().values(), &[5]);
    }

    #[test]
    fn test_fastrand_bounds() {
        for _ in 0..1_000 {
            assert!(fastrand(7) < 7);
            let unit = fastrand_unit();
            assert!(unit > 0.0 && unit <= 1.0);
        }
    }
}
