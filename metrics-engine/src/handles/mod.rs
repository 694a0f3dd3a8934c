//! Metric handles.
//!
//! Handles are the typed, thread-safe value holders that application code updates.  Every handle
//! consults the owning context's [`MetricsSwitch`](crate::MetricsSwitch) before applying an
//! update, and becomes read-only once metrics are disabled.

use std::sync::Arc;

use crate::kind::MetricKind;

mod counter;
pub use self::counter::Counter;

mod gauge;
pub use self::gauge::{Gauge, GaugeFn};

mod histogram;
pub use self::histogram::{Histogram, HistogramValue};

mod meter;
pub use self::meter::{Meter, MeterValue, TICK_INTERVAL};

mod timer;
pub use self::timer::{Timer, TimerGuard, TimerValue};

/// A registered metric of any kind.
///
/// Cloning a `Metric` clones the handle, not the underlying state.
#[derive(Clone, Debug)]
pub enum Metric {
    /// A counter.
    Counter(Arc<Counter>),
    /// A gauge.
    Gauge(Arc<Gauge>),
    /// A meter.
    Meter(Arc<Meter>),
    /// A histogram.
    Histogram(Arc<Histogram>),
    /// A timer.
    Timer(Arc<Timer>),
}

impl Metric {
    /// Gets the kind of this metric.
    pub fn kind(&self) -> MetricKind {
        match self {
            Metric::Counter(_) => MetricKind::Counter,
            Metric::Gauge(_) => MetricKind::Gauge,
            Metric::Meter(_) => MetricKind::Meter,
            Metric::Histogram(_) => MetricKind::Histogram,
            Metric::Timer(_) => MetricKind::Timer,
        }
    }

    /// Reads the current value.
    pub fn value(&self) -> MetricValue {
        match self {
            Metric::Counter(c) => MetricValue::Counter(c.value()),
            Metric::Gauge(g) => MetricValue::Gauge(g.value()),
            Metric::Meter(m) => MetricValue::Meter(m.value()),
            Metric::Histogram(h) => MetricValue::Histogram(h.value()),
            Metric::Timer(t) => MetricValue::Timer(t.value()),
        }
    }

    /// Gets the counter, if this is one.
    pub fn as_counter(&self) -> Option<&Arc<Counter>> {
        match self {
            Metric::Counter(c) => Some(c),
            _ => None,
        }
    }

    /// Gets the gauge, if this is one.
    pub fn as_gauge(&self) -> Option<&Arc<Gauge>> {
        match self {
            Metric::Gauge(g) => Some(g),
            _ => None,
        }
    }

    /// Gets the meter, if this is one.
    pub fn as_meter(&self) -> Option<&Arc<Meter>> {
        match self {
            Metric::Meter(m) => Some(m),
            _ => None,
        }
    }

    /// Gets the histogram, if this is one.
    pub fn as_histogram(&self) -> Option<&Arc<Histogram>> {
        match self {
            Metric::Histogram(h) => Some(h),
            _ => None,
        }
    }

    /// Gets the timer, if this is one.
    pub fn as_timer(&self) -> Option<&Arc<Timer>> {
        match self {
            Metric::Timer(t) => Some(t),
            _ => None,
        }
    }
}

/// A point-in-time reading of a [`Metric`].
#[derive(Clone, Debug, PartialEq)]
pub enum MetricValue {
    /// Counter reading.
    Counter(i64),
    /// Gauge reading.
    Gauge(f64),
    /// Meter reading.
    Meter(MeterValue),
    /// Histogram reading.
    Histogram(HistogramValue),
    /// Timer reading.
    Timer(TimerValue),
}

impl MetricValue {
    /// Gets the kind of metric this reading came from.
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Counter(_) => MetricKind::Counter,
            MetricValue::Gauge(_) => MetricKind::Gauge,
            MetricValue::Meter(_) => MetricKind::Meter,
            MetricValue::Histogram(_) => MetricKind::Histogram,
            MetricValue::Timer(_) => MetricKind::Timer,
        }
    }

    /// Gets the counter reading, if this is one.
    pub fn as_counter(&self) -> Option<i64> {
        match self {
            MetricValue::Counter(v) => Some(*v),
            _ => None,
        }
    }

    /// Gets the gauge reading, if this is one.
    pub fn as_gauge(&self) -> Option<f64> {
        match self {
            MetricValue::Gauge(v) => Some(*v),
            _ => None,
        }
    }

    /// Gets the meter reading, if this is one.
    pub fn as_meter(&self) -> Option<&MeterValue> {
        match self {
            MetricValue::Meter(v) => Some(v),
            _ => None,
        }
    }

    /// Gets the histogram reading, if this is one.
    pub fn as_histogram(&self) -> Option<&HistogramValue> {
        match self {
            MetricValue::Histogram(v) => Some(v),
            _ => None,
        }
    }

    /// Gets the timer reading, if this is one.
    pub fn as_timer(&self) -> Option<&TimerValue> {
        match self {
            MetricValue::Timer(v) => Some(v),
            _ => None,
        }
    }
}
