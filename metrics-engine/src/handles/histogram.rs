use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use crate::quantile::Quantile;
use crate::state::MetricsSwitch;
use crate::storage::{Reservoir, Sample};

/// Point-in-time reading of a [`Histogram`].
#[derive(Clone, Debug, PartialEq)]
pub struct HistogramValue {
    /// Total number of values recorded.
    pub count: u64,
    /// Number of values retained by the reservoir.
    pub sample_size: usize,
    /// The most recently recorded value.
    pub last_value: i64,
    /// Smallest retained value.
    pub min: i64,
    /// Largest retained value.
    pub max: i64,
    /// Mean of the retained values.
    pub mean: f64,
    /// Standard deviation of the retained values.
    pub std_dev: f64,
    /// Median of the retained values.
    pub median: f64,
    /// One reading per configured quantile, in configuration order.
    pub quantiles: Vec<(Quantile, f64)>,
}

impl HistogramValue {
    pub(crate) fn from_sample(
        sample: &Sample,
        count: u64,
        last_value: i64,
        quantiles: &[Quantile],
    ) -> HistogramValue {
        HistogramValue {
            count,
            sample_size: sample.len(),
            last_value,
            min: sample.min(),
            max: sample.max(),
            mean: sample.mean(),
            std_dev: sample.std_dev(),
            median: sample.median(),
            quantiles: quantiles.iter().map(|q| (q.clone(), sample.quantile(q.value()))).collect(),
        }
    }

    /// Looks up the reading for a configured quantile.
    pub fn quantile(&self, q: f64) -> Option<f64> {
        self.quantiles.iter().find(|(quantile, _)| quantile.value() == q).map(|(_, v)| *v)
    }
}

/// Tracks the distribution of a stream of values.
///
/// Values are fed into a bounded [`Reservoir`], so memory use stays fixed no matter how many
/// values are recorded.  Statistics are computed from the reservoir's current sample on every read.
pub struct Histogram {
    reservoir: Arc<dyn Reservoir>,
    count: AtomicU64,
    last_value: AtomicI64,
    quantiles: Arc<[Quantile]>,
    switch: MetricsSwitch,
}

impl Histogram {
    pub(crate) fn new(
        reservoir: Arc<dyn Reservoir>,
        quantiles: Arc<[Quantile]>,
        switch: MetricsSwitch,
    ) -> Histogram {
        Histogram {
            reservoir,
            count: AtomicU64::new(0),
            last_value: AtomicI64::new(0),
            quantiles,
            switch,
        }
    }

    /// Records a value.
    pub fn update(&self, value: i64) {
        if !self.switch.is_enabled() {
            return;
        }

        self.reservoir.update(value);
        self.last_value.store(value, Ordering::Release);
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    /// Total number of values recorded.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    /// Takes a snapshot of the underlying reservoir.
    pub fn sample(&self) -> Sample {
        self.reservoir.snapshot()
    }

    /// Gets the current reading.
    pub fn value(&self) -> HistogramValue {
        let sample = self.reservoir.snapshot();
        HistogramValue::from_sample(
            &sample,
            self.count(),
            self.last_value.load(Ordering::Acquire),
            &self.quantiles,
        )
    }

    /// Clears every recorded value.
    pub fn reset(&self) {
        if !self.switch.is_enabled() {
            return;
        }

        self.reservoir.reset();
        self.count.store(0, Ordering::Release);
        self.last_value.store(0, Ordering::Release);
    }
}

impl fmt::Debug for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Histogram")
            .field("count", &self.count())
            .field("sample_size", &self.reservoir.size())
            .finish_non_exhaustive()
    }
}
