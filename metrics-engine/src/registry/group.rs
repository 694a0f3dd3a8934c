use std::sync::Arc;

use tracing::warn;

use super::Shards;
use crate::builder::MetricsBuilder;
use crate::error::MetricsError;
use crate::filter::SnapshotFilter;
use crate::handles::{Counter, Gauge, Histogram, Meter, Metric, Timer};
use crate::kind::MetricKind;
use crate::snapshot::GroupSnapshot;
use crate::storage::SamplingPolicy;

/// A named collection of metrics, such as all the metrics of one subsystem.
///
/// Names are unique within a group.  Asking for an existing name with the same kind returns the
/// existing metric; asking for it with a different kind fails with
/// [`MetricsError::NameConflict`].
pub struct MetricGroup {
    name: String,
    metrics: Shards<Metric>,
    builder: MetricsBuilder,
}

impl MetricGroup {
    pub(crate) fn new(name: String, builder: MetricsBuilder) -> MetricGroup {
        MetricGroup { name, metrics: Shards::new(), builder }
    }

    /// Name of this group.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets the metric registered under `name`, registering the one built by `factory` if there is
    /// none.
    ///
    /// Concurrent calls for the same name all receive the same metric, and `factory` runs at most
    /// once across all of them.  It does not run at all if the name is already taken.
    ///
    /// `factory` runs while a lock on part of this group is held.  It must not register, look up or
    /// remove metrics in this group, or it may deadlock; build the metric from a [`MetricsBuilder`]
    /// instead.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::NameConflict`] if `name` holds a metric of a different kind,
    /// [`MetricsError::FactoryMismatch`] if `factory` builds a metric of a kind other than `kind`,
    /// and passes through any error returned by `factory`.
    pub fn register_or_get<F>(
        &self,
        name: &str,
        kind: MetricKind,
        factory: F,
    ) -> Result<Metric, MetricsError>
    where
        F: FnOnce() -> Result<Metric, MetricsError>,
    {
        let metric = self.metrics.get_or_try_insert_with(name, || {
            let metric = factory()?;
            if metric.kind() != kind {
                return Err(MetricsError::FactoryMismatch {
                    name: name.to_string(),
                    expected: kind,
                    actual: metric.kind(),
                });
            }
            Ok(metric)
        })?;

        if metric.kind() != kind {
            return Err(self.conflict(name, metric.kind(), kind));
        }
        Ok(metric)
    }

    /// Gets or registers a counter.
    pub fn counter(&self, name: &str) -> Result<Arc<Counter>, MetricsError> {
        let metric = self.register_or_get(name, MetricKind::Counter, || {
            Ok(Metric::Counter(Arc::new(self.builder.counter())))
        })?;
        match metric {
            Metric::Counter(counter) => Ok(counter),
            other => Err(self.conflict(name, other.kind(), MetricKind::Counter)),
        }
    }

    /// Gets or registers a gauge reading from `f`.
    ///
    /// If a gauge is already registered under `name`, it is returned and `f` is dropped.
    pub fn gauge<F>(&self, name: &str, f: F) -> Result<Arc<Gauge>, MetricsError>
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        let metric = self.register_or_get(name, MetricKind::Gauge, || {
            Ok(Metric::Gauge(Arc::new(self.builder.gauge(Arc::new(f)))))
        })?;
        match metric {
            Metric::Gauge(gauge) => Ok(gauge),
            other => Err(self.conflict(name, other.kind(), MetricKind::Gauge)),
        }
    }

    /// Gets or registers a meter.
    pub fn meter(&self, name: &str) -> Result<Arc<Meter>, MetricsError> {
        let metric = self.register_or_get(name, MetricKind::Meter, || {
            Ok(Metric::Meter(Arc::new(self.builder.meter())))
        })?;
        match metric {
            Metric::Meter(meter) => Ok(meter),
            other => Err(self.conflict(name, other.kind(), MetricKind::Meter)),
        }
    }

    /// Gets or registers a histogram sampled with the default policy.
    pub fn histogram(&self, name: &str) -> Result<Arc<Histogram>, MetricsError> {
        self.histogram_with(name, self.builder.sampling())
    }

    /// Gets or registers a histogram sampled with `policy`.
    ///
    /// `policy` only applies if the histogram is created by this call.
    pub fn histogram_with(
        &self,
        name: &str,
        policy: &SamplingPolicy,
    ) -> Result<Arc<Histogram>, MetricsError> {
        let metric = self.register_or_get(name, MetricKind::Histogram, || {
            Ok(Metric::Histogram(Arc::new(self.builder.histogram_with(policy)?)))
        })?;
        match metric {
            Metric::Histogram(histogram) => Ok(histogram),
            other => Err(self.conflict(name, other.kind(), MetricKind::Histogram)),
        }
    }

    /// Gets or registers a timer sampled with the default policy.
    pub fn timer(&self, name: &str) -> Result<Arc<Timer>, MetricsError> {
        self.timer_with(name, self.builder.sampling())
    }

    /// Gets or registers a timer sampled with `policy`.
    ///
    /// `policy` only applies if the timer is created by this call.
    pub fn timer_with(
        &self,
        name: &str,
        policy: &SamplingPolicy,
    ) -> Result<Arc<Timer>, MetricsError> {
        let metric = self.register_or_get(name, MetricKind::Timer, || {
            Ok(Metric::Timer(Arc::new(self.builder.timer_with(policy)?)))
        })?;
        match metric {
            Metric::Timer(timer) => Ok(timer),
            other => Err(self.conflict(name, other.kind(), MetricKind::Timer)),
        }
    }

    /// Gets the metric registered under `name`.
    pub fn get(&self, name: &str) -> Option<Metric> {
        self.metrics.get(name)
    }

    /// Removes the metric registered under `name`.
    ///
    /// Returns `true` if there was one.  Handles already given out keep working, but are no longer
    /// reported.
    pub fn remove(&self, name: &str) -> bool {
        self.metrics.remove(name)
    }

    /// Names of every metric in this group, sorted.
    pub fn names(&self) -> Vec<String> {
        self.metrics.keys()
    }

    /// Number of metrics in this group.
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    /// Whether this group holds no metrics.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads every metric in this group, in name order.
    pub fn snapshot(&self) -> GroupSnapshot {
        self.snapshot_with(&SnapshotFilter::default())
    }

    /// Reads every metric in this group matching `filter`, in name order.
    ///
    /// Only the metric filters apply; the group filter is the registry's concern.
    pub fn snapshot_with(&self, filter: &SnapshotFilter) -> GroupSnapshot {
        let metrics = self
            .metrics
            .entries()
            .into_iter()
            .filter(|(name, metric)| filter.matches_metric(name, metric.kind()))
            .map(|(name, metric)| (name, metric.value()))
            .collect();
        GroupSnapshot::new(self.name.clone(), metrics)
    }

    fn conflict(&self, name: &str, existing: MetricKind, requested: MetricKind) -> MetricsError {
        warn!(
            group = %self.name,
            metric = name,
            %existing,
            %requested,
            "Metric name already registered with a different kind."
        );
        MetricsError::NameConflict {
            group: self.name.clone(),
            name: name.to_string(),
            existing,
            requested,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MetricGroup;
    use crate::builder::MetricsBuilder;
    use crate::error::MetricsError;
    use crate::filter::{Matcher, SnapshotFilter};
    use crate::handles::{Metric, MetricValue};
    use crate::kind::{MetricKind, MetricKindMask};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn group() -> MetricGroup {
        MetricGroup::new("test".to_string(), MetricsBuilder::default())
    }

    #[test]
    fn test_register_is_idempotent() {
        let group = group();
        let first = group.counter("requests").unwrap();
        let second = group.counter("requests").unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        first.increment(2);
        assert_eq!(second.value(), 2);
        assert_eq!(group.len(), 1);
    }

    #[test]
    fn test_kind_conflict() {
        let group = group();
        group.counter("requests").unwrap();

        match group.timer("requests") {
            Err(MetricsError::NameConflict { group, name, existing, requested }) => {
                assert_eq!(group, "test");
                assert_eq!(name, "requests");
                assert_eq!(existing, MetricKind::Counter);
                assert_eq!(requested, MetricKind::Timer);
            }
            other => panic!("expected a name conflict, got {:?}", other),
        }

        // The original metric is untouched.
        assert_eq!(group.get("requests").map(|m| m.kind()), Some(MetricKind::Counter));
    }

    #[test]
    fn test_factory_runs_only_for_new_names() {
        let group = group();
        let calls = AtomicUsize::new(0);
        let builder = MetricsBuilder::default();

        for _ in 0..3 {
            group
                .register_or_get("events", MetricKind::Meter, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Metric::Meter(Arc::new(builder.meter())))
                })
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_factory_kind_mismatch() {
        let group = group();
        let builder = MetricsBuilder::default();
        let result = group.register_or_get("events", MetricKind::Meter, || {
            Ok(Metric::Counter(Arc::new(builder.counter())))
        });
        assert!(matches!(
            result,
            Err(MetricsError::FactoryMismatch {
                expected: MetricKind::Meter,
                actual: MetricKind::Counter,
                ..
            })
        ));
        assert!(group.is_empty());
    }

    #[test]
    fn test_failed_factory_registers_nothing() {
        let group = group();
        let result = group.register_or_get("latency", MetricKind::Histogram, || {
            Err(MetricsError::InvalidMeasurement { reason: "bad".to_string() })
        });
        assert!(result.is_err());
        assert!(group.get("latency").is_none());
    }

    #[test]
    fn test_gauge_keeps_first_callback() {
        let group = group();
        group.gauge("temperature", || 21.5).unwrap();
        let gauge = group.gauge("temperature", || 99.0).unwrap();
        assert_eq!(gauge.value(), 21.5);
    }

    #[test]
    fn test_remove() {
        let group = group();
        group.meter("events").unwrap();
        assert!(group.remove("events"));
        assert!(!group.remove("events"));
        assert!(group.is_empty());
    }

    #[test]
    fn test_snapshot_ordered_by_name() {
        let group = group();
        group.counter("b").unwrap().increment(2);
        group.counter("a").unwrap().increment(1);
        group.gauge("c", || 3.0).unwrap();
        group.histogram("d").unwrap().update(4);

        let snapshot = group.snapshot();
        let names = snapshot.metrics().iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
        assert_eq!(snapshot.get("a"), Some(&MetricValue::Counter(1)));
        assert_eq!(snapshot.get("c"), Some(&MetricValue::Gauge(3.0)));

        let filter = SnapshotFilter::default()
            .with_kinds(MetricKindMask::COUNTER)
            .with_name(Matcher::Suffix("b".into()));
        let filtered = group.snapshot_with(&filter);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.get("b"), Some(&MetricValue::Counter(2)));
    }
}
