use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::state::MetricsSwitch;

/// Callback producing the current value of a [`Gauge`].
pub type GaugeFn = Arc<dyn Fn() -> f64 + Send + Sync>;

/// A gauge whose value is supplied by its registrant.
///
/// The callback runs on every read while metrics are enabled.  Once they are disabled, the gauge
/// keeps reporting the last value it read.  A callback that panics reads as `NaN` rather than
/// taking the reading thread down with it.
pub struct Gauge {
    f: GaugeFn,
    last: AtomicU64,
    has_last: AtomicBool,
    switch: MetricsSwitch,
}

impl Gauge {
    pub(crate) fn new(f: GaugeFn, switch: MetricsSwitch) -> Gauge {
        Gauge { f, last: AtomicU64::new(0), has_last: AtomicBool::new(false), switch }
    }

    /// Gets the current value.
    pub fn value(&self) -> f64 {
        if !self.switch.is_enabled() && self.has_last.load(Ordering::Acquire) {
            return f64::from_bits(self.last.load(Ordering::Acquire));
        }

        let value = self.compute();
        self.last.store(value.to_bits(), Ordering::Release);
        self.has_last.store(true, Ordering::Release);
        value
    }

    fn compute(&self) -> f64 {
        match catch_unwind(AssertUnwindSafe(|| (self.f)())) {
            Ok(value) => value,
            Err(_) => {
                warn!("Gauge callback panicked, reporting NaN.");
                f64::NAN
            }
        }
    }
}

impl fmt::Debug for Gauge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gauge")
            .field("last", &f64::from_bits(self.last.load(Ordering::Relaxed)))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::Gauge;
    use crate::state::MetricsSwitch;
    use quanta::Clock;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    fn source_gauge(switch: MetricsSwitch) -> (Arc<AtomicU64>, Gauge) {
        let source = Arc::new(AtomicU64::new(1));
        let reader = Arc::clone(&source);
        let gauge = Gauge::new(Arc::new(move || reader.load(Ordering::Relaxed) as f64), switch);
        (source, gauge)
    }

    #[test]
    fn test_recomputed_on_each_read() {
        let (source, gauge) = source_gauge(MetricsSwitch::default());
        assert_eq!(gauge.value(), 1.0);
        source.store(42, Ordering::Relaxed);
        assert_eq!(gauge.value(), 42.0);
    }

    #[test]
    fn test_frozen_once_disabled() {
        let switch = MetricsSwitch::default();
        let (source, gauge) = source_gauge(switch.clone());
        source.store(7, Ordering::Relaxed);
        assert_eq!(gauge.value(), 7.0);

        switch.disable(Clock::new().now());
        source.store(8, Ordering::Relaxed);
        assert_eq!(gauge.value(), 7.0);
    }

    #[test]
    fn test_panicking_callback_reads_nan() {
        let gauge = Gauge::new(Arc::new(|| -> f64 { panic!("boom") }), MetricsSwitch::default());
        assert!(gauge.value().is_nan());
    }
}
