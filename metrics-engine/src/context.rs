use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use quanta::Clock;

use crate::builder::MetricsBuilder;
use crate::environment::{EnvironmentInfo, EnvironmentInfoProvider, ProcessEnvironment};
use crate::error::MetricsError;
use crate::filter::SnapshotFilter;
use crate::health::{
    HealthCheck, HealthCheckManager, HealthCheckRegistry, HealthCheckResult, HealthReport,
    ProbeError,
};
use crate::quantile::DEFAULT_QUANTILES;
use crate::registry::{MetricGroup, Registry};
use crate::snapshot::MetricsSnapshot;
use crate::state::{MetricsState, MetricsSwitch};
use crate::storage::SamplingPolicy;

/// Builder for [`MetricsContext`].
pub struct MetricsContextBuilder {
    clock: Clock,
    environment: Box<dyn EnvironmentInfoProvider>,
    sampling: SamplingPolicy,
    quantiles: Vec<f64>,
    health_checks: bool,
    enabled: bool,
}

impl MetricsContextBuilder {
    /// Creates a new `MetricsContextBuilder`.
    ///
    /// Defaults to the system clock, process environment discovery, exponentially decaying
    /// sampling, the default quantiles, health checks enabled and metrics enabled.
    pub fn new() -> MetricsContextBuilder {
        MetricsContextBuilder {
            clock: Clock::new(),
            environment: Box::new(ProcessEnvironment),
            sampling: SamplingPolicy::default(),
            quantiles: DEFAULT_QUANTILES.to_vec(),
            health_checks: true,
            enabled: true,
        }
    }

    /// Sets the clock used by meters, timers and decaying reservoirs.
    ///
    /// Use [`Clock::mock`] for deterministic tests.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the provider of the environment metadata attached to snapshots.
    ///
    /// The provider is called once, by [`build`](Self::build).
    pub fn with_environment_provider<P>(mut self, provider: P) -> Self
    where
        P: EnvironmentInfoProvider + 'static,
    {
        self.environment = Box::new(provider);
        self
    }

    /// Sets fixed environment metadata to attach to snapshots.
    pub fn with_environment(self, environment: EnvironmentInfo) -> Self {
        self.with_environment_provider(environment)
    }

    /// Sets the default sampling policy for histograms and timers.
    pub fn with_sampling(mut self, sampling: SamplingPolicy) -> Self {
        self.sampling = sampling;
        self
    }

    /// Sets the quantiles reported by histograms and timers.
    ///
    /// Values are clamped to `[0.0, 1.0]`.
    pub fn with_quantiles(mut self, quantiles: &[f64]) -> Self {
        self.quantiles = quantiles.to_vec();
        self
    }

    /// Enables or disables running health checks when taking snapshots.
    ///
    /// When disabled, snapshots carry an empty health report.
    pub fn with_health_checks(mut self, enabled: bool) -> Self {
        self.health_checks = enabled;
        self
    }

    /// Sets whether the context starts out enabled.
    ///
    /// A context built disabled can never be enabled.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Builds the context.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::InvalidMeasurement`] if the sampling policy is invalid.
    pub fn build(self) -> Result<MetricsContext, MetricsError> {
        let state = if self.enabled { MetricsState::Enabled } else { MetricsState::Disabled };
        let switch = MetricsSwitch::new(state);
        let builder = MetricsBuilder::new(self.clock, self.sampling, &self.quantiles, switch)?;
        let environment = self.environment.environment_info();

        Ok(MetricsContext {
            registry: Arc::new(Registry::new(builder, environment)),
            health: HealthCheckManager::new(Arc::new(HealthCheckRegistry::new())),
            health_checks: self.health_checks,
        })
    }
}

impl Default for MetricsContextBuilder {
    fn default() -> Self {
        MetricsContextBuilder::new()
    }
}

/// Entry point for recording metrics and taking snapshots.
///
/// A context ties together the [`Registry`], the health checks and the enabled/disabled state.
/// Every context starts out [`Enabled`](MetricsState::Enabled); calling
/// [`completely_disable_metrics`](Self::completely_disable_metrics) moves it to
/// [`Disabled`](MetricsState::Disabled) for good.  While disabled, every metric update is ignored
/// and snapshots report the values metrics had when they were disabled.  Health checks keep running.
///
/// Contexts are cheap to clone; clones share all state.
#[derive(Clone)]
pub struct MetricsContext {
    registry: Arc<Registry>,
    health: HealthCheckManager,
    health_checks: bool,
}

impl MetricsContext {
    /// Creates a [`MetricsContextBuilder`].
    pub fn builder() -> MetricsContextBuilder {
        MetricsContextBuilder::new()
    }

    /// Gets the group with the given name, creating it if it does not yet exist.
    pub fn group(&self, name: &str) -> Arc<MetricGroup> {
        self.registry.group(name)
    }

    /// Underlying registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Environment metadata attached to every snapshot.
    pub fn environment(&self) -> &EnvironmentInfo {
        self.registry.environment()
    }

    /// Gets the current state.
    pub fn state(&self) -> MetricsState {
        self.registry.state()
    }

    /// Disables every metric update, permanently.
    ///
    /// Returns `true` if this call performed the transition.
    pub fn completely_disable_metrics(&self) -> bool {
        self.registry.completely_disable_metrics()
    }

    /// Registry of health checks.
    pub fn health_checks(&self) -> &Arc<HealthCheckRegistry> {
        self.health.registry()
    }

    /// Whether snapshots run health checks.
    pub fn health_checks_enabled(&self) -> bool {
        self.health_checks
    }

    /// Registers a health check.  See [`HealthCheckRegistry::register`].
    pub fn register_health_check<C>(&self, name: &str, check: C) -> bool
    where
        C: HealthCheck + 'static,
    {
        self.health.registry().register(name, check)
    }

    /// Registers a closure as a health check.  See [`HealthCheckRegistry::register_fn`].
    pub fn register_health_check_fn<F>(&self, name: &str, f: F) -> bool
    where
        F: Fn() -> Result<HealthCheckResult, ProbeError> + Send + Sync + 'static,
    {
        self.health.registry().register_fn(name, f)
    }

    /// Runs every health check.
    ///
    /// Returns an empty report if health checks are disabled.
    pub fn run_health_checks(&self) -> HealthReport {
        if self.health_checks {
            self.health.run_all()
        } else {
            HealthReport::empty()
        }
    }

    /// Takes a snapshot of every metric.
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.snapshot_with(&SnapshotFilter::default())
    }

    /// Takes a snapshot of every metric matching `filter`.
    ///
    /// Health checks run as part of the snapshot, unless they are disabled.
    pub fn snapshot_with(&self, filter: &SnapshotFilter) -> MetricsSnapshot {
        let timestamp = Utc::now();
        let state = self.state();
        let groups = self.registry.snapshot(filter);
        let health = self.run_health_checks();

        MetricsSnapshot::new(timestamp, state, self.environment().clone(), groups, health)
    }
}

impl fmt::Debug for MetricsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsContext")
            .field("state", &self.state())
            .field("groups", &self.registry.group_count())
            .field("health_checks", &self.health_checks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::MetricsContext;
    use crate::environment::EnvironmentInfo;
    use crate::error::MetricsError;
    use crate::handles::MetricValue;
    use crate::health::{HealthCheckResult, HealthStatus};
    use crate::state::MetricsState;
    use crate::storage::SamplingPolicy;
    use crate::test_util::MockEnvironmentSource;
    use quanta::Clock;

    fn context() -> MetricsContext {
        MetricsContext::builder()
            .with_clock(Clock::mock().0)
            .with_environment(EnvironmentInfo::new().with("app", "test"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_rejects_invalid_sampling() {
        let result = MetricsContext::builder()
            .with_sampling(SamplingPolicy::ExponentiallyDecaying { size: 0, alpha: 0.015 })
            .build();
        assert!(matches!(result, Err(MetricsError::InvalidMeasurement { .. })));
    }

    #[test]
    fn test_snapshot_contents() {
        let ctx = context();
        ctx.group("http").counter("requests").unwrap().increment(3);
        ctx.register_health_check_fn("db", || Ok(HealthCheckResult::healthy()));

        let snapshot = ctx.snapshot();
        assert_eq!(snapshot.state(), MetricsState::Enabled);
        assert_eq!(snapshot.get("http", "requests"), Some(&MetricValue::Counter(3)));
        assert_eq!(snapshot.environment().get("app"), Some("test"));
        assert_eq!(snapshot.health().len(), 1);
        assert_eq!(snapshot.health().status(), HealthStatus::Healthy);
    }

    #[test]
    fn test_starts_disabled() {
        let ctx = MetricsContext::builder().enabled(false).build().unwrap();
        assert_eq!(ctx.state(), MetricsState::Disabled);

        let counter = ctx.group("app").counter("events").unwrap();
        counter.increment(1);
        assert_eq!(counter.value(), 0);
        assert!(!ctx.completely_disable_metrics());
    }

    #[test]
    fn test_health_still_runs_when_disabled() {
        let ctx = context();
        ctx.register_health_check_fn("db", || Ok(HealthCheckResult::degraded("slow")));
        ctx.completely_disable_metrics();

        let snapshot = ctx.snapshot();
        assert_eq!(snapshot.state(), MetricsState::Disabled);
        assert_eq!(snapshot.health().status(), HealthStatus::Degraded);
    }

    #[test]
    fn test_environment_provider_called_once() {
        let mut provider = MockEnvironmentSource::new();
        provider
            .expect_environment_info()
            .times(1)
            .returning(|| EnvironmentInfo::new().with("host.name", "web-1"));

        let ctx = MetricsContext::builder().with_environment_provider(provider).build().unwrap();
        for _ in 0..3 {
            assert_eq!(ctx.snapshot().environment().get("host.name"), Some("web-1"));
        }
    }

    #[test]
    fn test_health_checks_disabled() {
        let ctx = MetricsContext::builder()
            .with_environment(EnvironmentInfo::new())
            .with_health_checks(false)
            .build()
            .unwrap();
        ctx.register_health_check_fn("db", || Ok(HealthCheckResult::unhealthy("down")));

        let snapshot = ctx.snapshot();
        assert!(snapshot.health().is_empty());
        assert!(snapshot.health().is_healthy());
        assert_eq!(ctx.health_checks().len(), 1);
    }

    #[test]
    fn test_clones_share_state() {
        let ctx = context();
        let clone = ctx.clone();
        clone.group("app").counter("events").unwrap().increment(2);
        clone.completely_disable_metrics();

        assert_eq!(ctx.state(), MetricsState::Disabled);
        assert_eq!(ctx.snapshot().get("app", "events"), Some(&MetricValue::Counter(2)));
    }
}
