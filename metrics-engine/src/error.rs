use thiserror::Error;

use crate::kind::MetricKind;

/// Errors surfaced by the registry, builder and metric handles.
///
/// Structural mistakes (name conflicts, bad sampling parameters, negative durations) are returned
/// to the caller at the point of misuse.  Health check failures are never returned as errors: they
/// are turned into a degraded health status instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MetricsError {
    /// A metric was requested under a name that already holds a metric of another kind.
    #[error("metric `{group}/{name}` is already registered as a {existing}, not a {requested}")]
    NameConflict {
        /// Group the metric lives in.
        group: String,
        /// Name of the metric within its group.
        name: String,
        /// Kind of the metric already registered.
        existing: MetricKind,
        /// Kind that was requested.
        requested: MetricKind,
    },

    /// A measurement or configuration value was outside its valid range.
    #[error("invalid measurement: {reason}")]
    InvalidMeasurement {
        /// What was wrong with the value.
        reason: String,
    },

    /// A registration factory produced a metric of a different kind than the one requested.
    #[error("factory for `{name}` produced a {actual}, expected a {expected}")]
    FactoryMismatch {
        /// Name of the metric being registered.
        name: String,
        /// Kind passed to the registration call.
        expected: MetricKind,
        /// Kind the factory actually built.
        actual: MetricKind,
    },

    /// A health check probe failed to run.
    #[error("health check `{name}` failed: {reason}")]
    ProbeFailure {
        /// Name the probe was registered under.
        name: String,
        /// Failure description reported by the probe.
        reason: String,
    },
}

impl MetricsError {
    pub(crate) fn invalid<S: Into<String>>(reason: S) -> Self {
        MetricsError::InvalidMeasurement { reason: reason.into() }
    }
}
