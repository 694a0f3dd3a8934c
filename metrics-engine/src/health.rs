//! Health checks.
//!
//! Probes are registered by name in a [`HealthCheckRegistry`] and run by a [`HealthCheckManager`],
//! which turns their outcomes into a [`HealthReport`].  A probe that fails, by returning an error
//! or by panicking, is reported as [`HealthStatus::Degraded`] and never stops the other probes
//! from running.

use std::any::Any;
use std::error::Error;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::MetricsError;

/// Error returned by a failing probe.
pub type ProbeError = Box<dyn Error + Send + Sync>;

/// Outcome of a health check.
///
/// Ordered from best to worst, so the aggregate status of several checks is their maximum.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum HealthStatus {
    /// Working as expected.
    Healthy,
    /// Working, but impaired.
    Degraded,
    /// Not working.
    Unhealthy,
}

impl HealthStatus {
    /// Gets the lowercase name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of running a single probe.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HealthCheckResult {
    status: HealthStatus,
    message: String,
}

impl HealthCheckResult {
    /// Creates a result with the given status and message.
    pub fn new<S: Into<String>>(status: HealthStatus, message: S) -> HealthCheckResult {
        HealthCheckResult { status, message: message.into() }
    }

    /// A healthy result with no message.
    pub fn healthy() -> HealthCheckResult {
        HealthCheckResult::new(HealthStatus::Healthy, "")
    }

    /// A degraded result.
    pub fn degraded<S: Into<String>>(message: S) -> HealthCheckResult {
        HealthCheckResult::new(HealthStatus::Degraded, message)
    }

    /// An unhealthy result.
    pub fn unhealthy<S: Into<String>>(message: S) -> HealthCheckResult {
        HealthCheckResult::new(HealthStatus::Unhealthy, message)
    }

    /// Status reported by the probe.
    pub fn status(&self) -> HealthStatus {
        self.status
    }

    /// Message reported by the probe.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A health probe.
///
/// Implemented for any `Fn() -> Result<HealthCheckResult, ProbeError>` closure.  The core imposes
/// no timeout, so probes should return quickly.
pub trait HealthCheck: Send + Sync {
    /// Runs the probe.
    fn check(&self) -> Result<HealthCheckResult, ProbeError>;
}

impl<F> HealthCheck for F
where
    F: Fn() -> Result<HealthCheckResult, ProbeError> + Send + Sync,
{
    fn check(&self) -> Result<HealthCheckResult, ProbeError> {
        (self)()
    }
}

/// Holds registered probes by name, in registration order.
#[derive(Default)]
pub struct HealthCheckRegistry {
    checks: RwLock<IndexMap<String, Arc<dyn HealthCheck>>>,
}

impl HealthCheckRegistry {
    /// Creates an empty `HealthCheckRegistry`.
    pub fn new() -> HealthCheckRegistry {
        HealthCheckRegistry::default()
    }

    /// Registers a probe under `name`.
    ///
    /// If a probe is already registered under `name`, it is replaced: the last registration wins,
    /// and the new probe takes over the old one's place in the run order.  Returns `true` if a
    /// probe was replaced.
    pub fn register<C>(&self, name: &str, check: C) -> bool
    where
        C: HealthCheck + 'static,
    {
        let replaced = self.checks.write().insert(name.to_string(), Arc::new(check)).is_some();
        if replaced {
            debug!(check = name, "Replaced existing health check.");
        }
        replaced
    }

    /// Registers a closure as a probe under `name`.
    ///
    /// Behaves exactly like [`register`](Self::register).
    pub fn register_fn<F>(&self, name: &str, f: F) -> bool
    where
        F: Fn() -> Result<HealthCheckResult, ProbeError> + Send + Sync + 'static,
    {
        self.register(name, f)
    }

    /// Removes the probe registered under `name`.
    ///
    /// Returns `true` if there was one.
    pub fn unregister(&self, name: &str) -> bool {
        self.checks.write().shift_remove(name).is_some()
    }

    /// Names of every registered probe, in run order.
    pub fn names(&self) -> Vec<String> {
        self.checks.read().keys().cloned().collect()
    }

    /// Number of registered probes.
    pub fn len(&self) -> usize {
        self.checks.read().len()
    }

    /// Whether no probes are registered.
    pub fn is_empty(&self) -> bool {
        self.checks.read().is_empty()
    }

    fn get(&self, name: &str) -> Option<Arc<dyn HealthCheck>> {
        self.checks.read().get(name).cloned()
    }

    fn checks(&self) -> Vec<(String, Arc<dyn HealthCheck>)> {
        self.checks.read().iter().map(|(name, check)| (name.clone(), Arc::clone(check))).collect()
    }
}

impl fmt::Debug for HealthCheckRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthCheckRegistry").field("names", &self.names()).finish()
    }
}

/// Outcome of one probe within a [`HealthReport`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HealthEntry {
    /// Name the probe is registered under.
    pub name: String,
    /// Status the probe reported.
    pub status: HealthStatus,
    /// Message the probe reported, or the failure description.
    pub message: String,
}

/// Outcome of running every registered probe.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HealthReport {
    status: HealthStatus,
    entries: Vec<HealthEntry>,
}

impl HealthReport {
    /// A report with no entries.
    pub fn empty() -> HealthReport {
        HealthReport { status: HealthStatus::Healthy, entries: Vec::new() }
    }

    fn from_entries(entries: Vec<HealthEntry>) -> HealthReport {
        let status = entries.iter().map(|e| e.status).max().unwrap_or(HealthStatus::Healthy);
        HealthReport { status, entries }
    }

    /// Worst status across all entries.  An empty report is healthy.
    pub fn status(&self) -> HealthStatus {
        self.status
    }

    /// Whether every probe reported healthy.
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }

    /// Every entry, in run order.
    pub fn entries(&self) -> &[HealthEntry] {
        &self.entries
    }

    /// Gets the entry for the named probe.
    pub fn get(&self, name: &str) -> Option<&HealthEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for HealthReport {
    fn default() -> Self {
        HealthReport::empty()
    }
}

/// Runs registered probes.
#[derive(Clone, Debug, Default)]
pub struct HealthCheckManager {
    registry: Arc<HealthCheckRegistry>,
}

impl HealthCheckManager {
    /// Creates a manager running the probes in `registry`.
    pub fn new(registry: Arc<HealthCheckRegistry>) -> HealthCheckManager {
        HealthCheckManager { registry }
    }

    /// Registry of probes run by this manager.
    pub fn registry(&self) -> &Arc<HealthCheckRegistry> {
        &self.registry
    }

    /// Runs every registered probe, sequentially and in registration order.
    ///
    /// The registry is not locked while probes run, so a probe may itself register or remove
    /// probes; such changes take effect on the next run.
    pub fn run_all(&self) -> HealthReport {
        let entries = self
            .registry
            .checks()
            .into_iter()
            .map(|(name, check)| run_check(name, &*check))
            .collect();
        HealthReport::from_entries(entries)
    }

    /// Runs the probe registered under `name`, if any.
    pub fn run(&self, name: &str) -> Option<HealthEntry> {
        self.registry.get(name).map(|check| run_check(name.to_string(), &*check))
    }
}

fn run_check(name: String, check: &dyn HealthCheck) -> HealthEntry {
    let reason = match catch_unwind(AssertUnwindSafe(|| check.check())) {
        Ok(Ok(result)) => {
            return HealthEntry { name, status: result.status, message: result.message };
        }
        Ok(Err(e)) => e.to_string(),
        Err(payload) => format!("probe panicked: {}", panic_message(payload.as_ref())),
    };

    let message = MetricsError::ProbeFailure { name: name.clone(), reason }.to_string();
    warn!(check = %name, %message, "Health check failed.");
    HealthEntry { name, status: HealthStatus::Degraded, message }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
