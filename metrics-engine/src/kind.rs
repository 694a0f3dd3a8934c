use std::fmt;
use std::ops::BitOr;

/// Metric kind.
///
/// Defines the kind, or type, of a metric:
/// - counters
/// - gauges
/// - meters
/// - histograms
/// - timers
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub enum MetricKind {
    /// Counter type.
    Counter,
    /// Gauge type.
    Gauge,
    /// Meter type.
    Meter,
    /// Histogram type.
    Histogram,
    /// Timer type.
    Timer,
}

impl MetricKind {
    /// Gets the lowercase name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Meter => "meter",
            MetricKind::Histogram => "histogram",
            MetricKind::Timer => "timer",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metric kind mask.
///
/// Useful for matching against a kind, or kinds, of metrics.
///
/// In order to use for defining multiple metric kinds, can be used in a bitmask fashion, as this
/// type implements bitwise OR support, and checking for inclusion of a specific kind within another
/// kind value can be checked via [`matches`](MetricKindMask::matches):
///
/// ```rust
/// # use metrics_engine::{MetricKind, MetricKindMask};
/// // Let's only match counters and timers:
/// let mask = MetricKindMask::COUNTER | MetricKindMask::TIMER;
///
/// assert!(!mask.matches(MetricKind::Gauge));
/// assert!(mask.matches(MetricKind::Counter));
/// assert!(mask.matches(MetricKind::Timer));
///
/// assert!(!MetricKindMask::NONE.matches(MetricKind::Meter));
/// assert!(MetricKindMask::ALL.matches(MetricKind::Histogram));
/// ```
#[derive(Debug, Eq, PartialEq, Hash, Clone, Copy, Ord, PartialOrd)]
pub struct MetricKindMask(u8);

impl MetricKindMask {
    /// No metric kinds.
    pub const NONE: MetricKindMask = MetricKindMask(0);

    /// The counter kind.
    pub const COUNTER: MetricKindMask = MetricKindMask(1);

    /// The gauge kind.
    pub const GAUGE: MetricKindMask = MetricKindMask(2);

    /// The meter kind.
    pub const METER: MetricKindMask = MetricKindMask(4);

    /// The histogram kind.
    pub const HISTOGRAM: MetricKindMask = MetricKindMask(8);

    /// The timer kind.
    pub const TIMER: MetricKindMask = MetricKindMask(16);

    /// All metric kinds.
    pub const ALL: MetricKindMask = MetricKindMask(31);

    /// Whether or not this metric kind contains the specified kind.
    pub fn matches(&self, kind: MetricKind) -> bool {
        let bit = match kind {
            MetricKind::Counter => MetricKindMask::COUNTER,
            MetricKind::Gauge => MetricKindMask::GAUGE,
            MetricKind::Meter => MetricKindMask::METER,
            MetricKind::Histogram => MetricKindMask::HISTOGRAM,
            MetricKind::Timer => MetricKindMask::TIMER,
        };
        self.0 & bit.0 != 0
    }
}

impl Default for MetricKindMask {
    fn default() -> Self {
        MetricKindMask::ALL
    }
}

impl BitOr for MetricKindMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::{MetricKind, MetricKindMask};

    #[test]
    fn test_matching() {
        let cmask = MetricKindMask::COUNTER;
        let tmask = MetricKindMask::TIMER;
        let nmask = MetricKindMask::NONE;
        let amask = MetricKindMask::ALL;

        assert!(cmask.matches(MetricKind::Counter));
        assert!(!cmask.matches(MetricKind::Gauge));
        assert!(!cmask.matches(MetricKind::Timer));

        assert!(tmask.matches(MetricKind::Timer));
        assert!(!tmask.matches(MetricKind::Histogram));
        assert!(!tmask.matches(MetricKind::Meter));

        let combined = MetricKindMask::METER | MetricKindMask::HISTOGRAM;
        assert!(combined.matches(MetricKind::Meter));
        assert!(combined.matches(MetricKind::Histogram));
        assert!(!combined.matches(MetricKind::Counter));

        for kind in [
            MetricKind::Counter,
            MetricKind::Gauge,
            MetricKind::Meter,
            MetricKind::Histogram,
            MetricKind::Timer,
        ] {
            assert!(amask.matches(kind));
            assert!(!nmask.matches(kind));
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(MetricKind::Histogram.to_string(), "histogram");
        assert_eq!(MetricKind::Timer.as_str(), "timer");
    }
}
