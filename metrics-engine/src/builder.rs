use std::sync::Arc;

use quanta::Clock;

use crate::error::MetricsError;
use crate::handles::{Counter, Gauge, GaugeFn, Histogram, Meter, Timer};
use crate::quantile::{parse_quantiles, Quantile, DEFAULT_QUANTILES};
use crate::state::MetricsSwitch;
use crate::storage::SamplingPolicy;

/// Constructs ready-to-use metric handles.
///
/// Every handle built by the same builder shares its clock and disable switch.  Building a metric
/// touches no shared mutable state, so a builder can be used from any thread without
/// synchronization.
#[derive(Clone, Debug)]
pub struct MetricsBuilder {
    clock: Clock,
    sampling: SamplingPolicy,
    quantiles: Arc<[Quantile]>,
    switch: MetricsSwitch,
}

impl MetricsBuilder {
    /// Creates a new `MetricsBuilder`.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::InvalidMeasurement`] if the sampling policy is invalid.
    pub fn new(
        clock: Clock,
        sampling: SamplingPolicy,
        quantiles: &[f64],
        switch: MetricsSwitch,
    ) -> Result<MetricsBuilder, MetricsError> {
        sampling.validate()?;
        Ok(MetricsBuilder { clock, sampling, quantiles: parse_quantiles(quantiles).into(), switch })
    }

    /// Clock handed to meters, timers and decaying reservoirs.
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Default sampling policy for histograms and timers.
    pub fn sampling(&self) -> &SamplingPolicy {
        &self.sampling
    }

    /// Quantiles reported by histograms and timers.
    pub fn quantiles(&self) -> &[Quantile] {
        &self.quantiles
    }

    /// Switch consulted by every handle on update.
    pub fn switch(&self) -> &MetricsSwitch {
        &self.switch
    }

    /// Builds a counter.
    pub fn counter(&self) -> Counter {
        Counter::new(self.switch.clone())
    }

    /// Builds a gauge reading from `f`.
    pub fn gauge(&self, f: GaugeFn) -> Gauge {
        Gauge::new(f, self.switch.clone())
    }

    /// Builds a meter.
    pub fn meter(&self) -> Meter {
        Meter::new(self.clock.clone(), self.switch.clone())
    }

    /// Builds a histogram using the default sampling policy.
    pub fn histogram(&self) -> Result<Histogram, MetricsError> {
        self.histogram_with(&self.sampling)
    }

    /// Builds a histogram using the given sampling policy.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::InvalidMeasurement`] if the sampling policy is invalid.
    pub fn histogram_with(&self, policy: &SamplingPolicy) -> Result<Histogram, MetricsError> {
        let reservoir = policy.build(&self.clock)?;
        Ok(Histogram::new(reservoir, Arc::clone(&self.quantiles), self.switch.clone()))
    }

    /// Builds a timer using the default sampling policy.
    pub fn timer(&self) -> Result<Timer, MetricsError> {
        self.timer_with(&self.sampling)
    }

    /// Builds a timer using the given sampling policy.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::InvalidMeasurement`] if the sampling policy is invalid.
    pub fn timer_with(&self, policy: &SamplingPolicy) -> Result<Timer, MetricsError> {
        let histogram = self.histogram_with(policy)?;
        Ok(Timer::new(self.meter(), histogram, self.clock.clone()))
    }
}

impl Default for MetricsBuilder {
    fn default() -> Self {
        MetricsBuilder {
            clock: Clock::new(),
            sampling: SamplingPolicy::default(),
            quantiles: parse_quantiles(&DEFAULT_QUANTILES).into(),
            switch: MetricsSwitch::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MetricsBuilder;
    use crate::state::MetricsSwitch;
    use crate::storage::SamplingPolicy;
    use quanta::Clock;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_rejects_invalid_policy() {
        let result = MetricsBuilder::new(
            Clock::new(),
            SamplingPolicy::Uniform { size: 0 },
            &[0.5],
            MetricsSwitch::default(),
        );
        assert!(result.is_err());

        let builder = MetricsBuilder::default();
        let bad = SamplingPolicy::ExponentiallyDecaying { size: 8, alpha: -1.0 };
        assert!(builder.histogram_with(&bad).is_err());
        assert!(builder.timer_with(&bad).is_err());
    }

    #[test]
    fn test_handles_share_switch() {
        let switch = MetricsSwitch::default();
        let builder =
            MetricsBuilder::new(Clock::new(), SamplingPolicy::default(), &[0.5], switch.clone())
                .unwrap();

        let counter = builder.counter();
        let histogram = builder.histogram().unwrap();
        counter.increment(1);
        histogram.update(1);

        switch.disable(Clock::new().now());
        counter.increment(1);
        histogram.update(1);
        assert_eq!(counter.value(), 1);
        assert_eq!(histogram.count(), 1);
    }

    #[test]
    fn test_configured_quantiles() {
        let (clock, _mock) = Clock::mock();
        let builder = MetricsBuilder::new(
            clock,
            SamplingPolicy::Uniform { size: 32 },
            &[0.5, 0.999],
            MetricsSwitch::default(),
        )
        .unwrap();
        assert_eq!(builder.quantiles().len(), 2);

        let timer = builder.timer().unwrap();
        timer.record(Duration::from_millis(4));
        let value = timer.value();
        assert_eq!(value.durations.quantiles.len(), 2);
        assert_eq!(value.durations.quantiles[1].0.label(), "p999");

        let gauge = builder.gauge(Arc::new(|| 1.5));
        assert_eq!(gauge.value(), 1.5);
    }
}
