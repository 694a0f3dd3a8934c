//! Point-in-time captures of a context.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::environment::EnvironmentInfo;
use crate::handles::MetricValue;
use crate::health::HealthReport;
use crate::state::MetricsState;

/// Fully-qualified name of a metric.
///
/// Ordered by group, then by name.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct MetricName {
    group: String,
    name: String,
}

impl MetricName {
    /// Creates a new `MetricName`.
    pub fn new<G, N>(group: G, name: N) -> MetricName
    where
        G: Into<String>,
        N: Into<String>,
    {
        MetricName { group: group.into(), name: name.into() }
    }

    /// Group the metric belongs to.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Name of the metric within its group.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

/// Readings of every metric in one group, ordered by metric name.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupSnapshot {
    name: String,
    metrics: Vec<(String, MetricValue)>,
}

impl GroupSnapshot {
    pub(crate) fn new(name: String, mut metrics: Vec<(String, MetricValue)>) -> GroupSnapshot {
        metrics.sort_by(|(a, _), (b, _)| a.cmp(b));
        GroupSnapshot { name, metrics }
    }

    /// Name of the group.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every reading, ordered by metric name.
    pub fn metrics(&self) -> &[(String, MetricValue)] {
        &self.metrics
    }

    /// Gets the reading for the named metric.
    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        self.metrics
            .binary_search_by(|(n, _)| n.as_str().cmp(name))
            .ok()
            .map(|idx| &self.metrics[idx].1)
    }

    /// Number of readings.
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    /// Whether the group has no readings.
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

/// An immutable, point-in-time capture of a context.
///
/// Holds a reading of every metric, the health report and the environment metadata.  A snapshot
/// owns all of its data: it never changes once taken, no matter what happens to the metrics it was
/// read from.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricsSnapshot {
    timestamp: DateTime<Utc>,
    state: MetricsState,
    environment: EnvironmentInfo,
    groups: Vec<GroupSnapshot>,
    health: HealthReport,
}

impl MetricsSnapshot {
    pub(crate) fn new(
        timestamp: DateTime<Utc>,
        state: MetricsState,
        environment: EnvironmentInfo,
        groups: Vec<GroupSnapshot>,
        health: HealthReport,
    ) -> MetricsSnapshot {
        MetricsSnapshot { timestamp, state, environment, groups, health }
    }

    /// When the snapshot was taken.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// State of the context when the snapshot was taken.
    pub fn state(&self) -> MetricsState {
        self.state
    }

    /// Environment metadata.
    pub fn environment(&self) -> &EnvironmentInfo {
        &self.environment
    }

    /// Readings, group by group, ordered by group name.
    pub fn groups(&self) -> &[GroupSnapshot] {
        &self.groups
    }

    /// Gets the readings for the named group.
    pub fn group(&self, name: &str) -> Option<&GroupSnapshot> {
        self.groups
            .binary_search_by(|g| g.name.as_str().cmp(name))
            .ok()
            .map(|idx| &self.groups[idx])
    }

    /// Gets the reading for a single metric.
    pub fn get(&self, group: &str, name: &str) -> Option<&MetricValue> {
        self.group(group).and_then(|g| g.get(name))
    }

    /// Iterates over every reading, ordered by [`MetricName`].
    pub fn iter(&self) -> impl Iterator<Item = (MetricName, &MetricValue)> + '_ {
        self.groups.iter().flat_map(|group| {
            group
                .metrics
                .iter()
                .map(move |(name, value)| (MetricName::new(&group.name, name), value))
        })
    }

    /// Number of readings across all groups.
    pub fn len(&self) -> usize {
        self.groups.iter().map(GroupSnapshot::len).sum()
    }

    /// Whether there are no readings.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Health report.  Empty when health checks are disabled.
    pub fn health(&self) -> &HealthReport {
        &self.health
    }
}
