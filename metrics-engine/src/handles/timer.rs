use std::time::Duration;

use quanta::{Clock, Instant};

use super::{Histogram, HistogramValue, Meter, MeterValue};
use crate::error::MetricsError;

/// Point-in-time reading of a [`Timer`].
///
/// Durations in the histogram reading are in nanoseconds; the accessors convert them back into
/// [`Duration`]s.
#[derive(Clone, Debug, PartialEq)]
pub struct TimerValue {
    /// Rate of completed operations.
    pub rate: MeterValue,
    /// Distribution of operation durations, in nanoseconds.
    pub durations: HistogramValue,
}

impl TimerValue {
    /// Number of operations timed.
    pub fn count(&self) -> u64 {
        self.durations.count
    }

    /// Shortest retained duration.
    pub fn min(&self) -> Duration {
        nanos_to_duration(self.durations.min as f64)
    }

    /// Longest retained duration.
    pub fn max(&self) -> Duration {
        nanos_to_duration(self.durations.max as f64)
    }

    /// Mean of the retained durations.
    pub fn mean(&self) -> Duration {
        nanos_to_duration(self.durations.mean)
    }

    /// Median of the retained durations.
    pub fn median(&self) -> Duration {
        nanos_to_duration(self.durations.median)
    }

    /// Duration at a configured quantile.
    pub fn quantile(&self, q: f64) -> Option<Duration> {
        self.durations.quantile(q).map(nanos_to_duration)
    }
}

fn nanos_to_duration(nanos: f64) -> Duration {
    if nanos.is_finite() && nanos > 0.0 {
        Duration::from_nanos(nanos.round() as u64)
    } else {
        Duration::ZERO
    }
}

/// Measures how long operations take and how often they happen.
///
/// A timer is a [`Meter`] of completed operations paired with a [`Histogram`] of their
/// durations, recorded in nanoseconds.
#[derive(Debug)]
pub struct Timer {
    meter: Meter,
    histogram: Histogram,
    clock: Clock,
}

impl Timer {
    pub(crate) fn new(meter: Meter, histogram: Histogram, clock: Clock) -> Timer {
        Timer { meter, histogram, clock }
    }

    /// Records the duration of a completed operation.
    pub fn record(&self, duration: Duration) {
        let nanos = i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX);
        self.record_valid(nanos);
    }

    /// Records a duration given in nanoseconds.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::InvalidMeasurement`] if `nanos` is negative.
    pub fn record_nanos(&self, nanos: i64) -> Result<(), MetricsError> {
        if nanos < 0 {
            return Err(MetricsError::invalid(format!("negative duration: {}ns", nanos)));
        }

        self.record_valid(nanos);
        Ok(())
    }

    /// Records the time elapsed between two instants.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::InvalidMeasurement`] if `end` is before `start`.
    pub fn record_between(&self, start: Instant, end: Instant) -> Result<(), MetricsError> {
        if end < start {
            return Err(MetricsError::invalid("end of timed operation precedes its start"));
        }

        self.record(end.duration_since(start));
        Ok(())
    }

    /// Starts timing an operation.
    ///
    /// The elapsed time is recorded when the returned guard is stopped or dropped.
    pub fn start(&self) -> TimerGuard<'_> {
        TimerGuard { timer: self, start: self.clock.now(), stopped: false }
    }

    /// Runs `f`, recording how long it took.
    pub fn time<F, T>(&self, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        let _guard = self.start();
        f()
    }

    /// Gets the current reading.
    pub fn value(&self) -> TimerValue {
        TimerValue { rate: self.meter.value(), durations: self.histogram.value() }
    }

    fn record_valid(&self, nanos: i64) {
        self.histogram.update(nanos);
        self.meter.mark(1);
    }
}

/// Times an operation in progress.  Records the elapsed time once, on [`stop`](Self::stop) or drop.
#[must_use = "dropping the guard immediately records a near-zero duration"]
pub struct TimerGuard<'a> {
    timer: &'a Timer,
    start: Instant,
    stopped: bool,
}

impl TimerGuard<'_> {
    /// Stops timing, records and returns the elapsed time.
    pub fn stop(mut self) -> Duration {
        self.finish()
    }

    fn finish(&mut self) -> Duration {
        self.stopped = true;
        let elapsed = self.timer.clock.now().duration_since(self.start);
        self.timer.record(elapsed);
        elapsed
    }
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        if !self.stopped {
            self.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Timer;
    use crate::error::MetricsError;
    use crate::handles::{Histogram, Meter};
    use crate::quantile::parse_quantiles;
    use crate::state::MetricsSwitch;
    use crate::storage::UniformReservoir;
    use quanta::Clock;
    use std::sync::Arc;
    use std::time::Duration;

    fn timer(clock: Clock) -> Timer {
        let switch = MetricsSwitch::default();
        let reservoir = Arc::new(UniformReservoir::new(64).unwrap());
        let histogram =
            Histogram::new(reservoir, parse_quantiles(&[0.5, 0.99]).into(), switch.clone());
        Timer::new(Meter::new(clock.clone(), switch), histogram, clock)
    }

    #[test]
    fn test_interpolated_median() {
        let (clock, _mock) = Clock::mock();
        let timer = timer(clock);
        for ms in [10, 20, 30, 40] {
            timer.record(Duration::from_millis(ms));
        }

        let value = timer.value();
        assert_eq!(value.count(), 4);
        assert_eq!(value.rate.count, 4);
        assert_eq!(value.min(), Duration::from_millis(10));
        assert_eq!(value.max(), Duration::from_millis(40));
        assert_eq!(value.median(), Duration::from_millis(25));
        assert_eq!(value.quantile(0.5), Some(Duration::from_millis(25)));
    }

    #[test]
    fn test_rejects_negative_durations() {
        let (clock, mock) = Clock::mock();
        let timer = timer(clock.clone());

        let result = timer.record_nanos(-1);
        assert!(matches!(result, Err(MetricsError::InvalidMeasurement { .. })));

        let start = clock.now();
        mock.increment(Duration::from_millis(3));
        let end = clock.now();
        assert!(timer.record_between(end, start).is_err());
        assert!(timer.record_between(start, end).is_ok());

        assert_eq!(timer.value().count(), 1);
        assert_eq!(timer.value().max(), Duration::from_millis(3));
    }

    #[test]
    fn test_guard_records_on_drop() {
        let (clock, mock) = Clock::mock();
        let timer = timer(clock);

        {
            let _guard = timer.start();
            mock.increment(Duration::from_millis(7));
        }

        let guard = timer.start();
        mock.increment(Duration::from_millis(2));
        assert_eq!(guard.stop(), Duration::from_millis(2));

        let result = timer.time(|| {
            mock.increment(Duration::from_millis(5));
            "done"
        });
        assert_eq!(result, "done");

        let value = timer.value();
        assert_eq!(value.count(), 3);
        assert_eq!(value.min(), Duration::from_millis(2));
        assert_eq!(value.max(), Duration::from_millis(7));
    }
}
