//! Delivery of snapshots to reporters.
//!
//! A [`ReportingPipeline`] takes snapshots from a [`MetricsContext`] and hands each one to every
//! configured [`Reporter`], either on demand or on a fixed interval from a background thread.

use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use thiserror::Error;
use tracing::{debug, error};

use crate::context::MetricsContext;
use crate::filter::SnapshotFilter;
use crate::health::panic_message;
use crate::snapshot::MetricsSnapshot;

/// Errors that could occur while delivering a snapshot.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Writing the report did not succeed.
    #[error("failed to write report: {0}")]
    Io(#[from] io::Error),

    /// The reporter rejected or could not deliver the snapshot.
    #[error("reporter `{reporter}` failed: {reason}")]
    Failed {
        /// Name of the reporter.
        reporter: String,
        /// Failure description.
        reason: String,
    },
}

/// Consumes snapshots.
///
/// Reporters only ever see immutable snapshots, and hold no registry state.
pub trait Reporter: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Delivers a snapshot.
    fn report(&self, snapshot: &MetricsSnapshot) -> Result<(), ReportError>;
}

/// Builder for [`ReportingPipeline`].
#[derive(Default)]
pub struct ReportingPipelineBuilder {
    reporters: Vec<Arc<dyn Reporter>>,
    filter: SnapshotFilter,
}

impl ReportingPipelineBuilder {
    /// Creates a new `ReportingPipelineBuilder` with no reporters.
    pub fn new() -> ReportingPipelineBuilder {
        ReportingPipelineBuilder::default()
    }

    /// Adds a reporter.
    pub fn add_reporter<R>(mut self, reporter: R) -> Self
    where
        R: Reporter + 'static,
    {
        self.reporters.push(Arc::new(reporter));
        self
    }

    /// Restricts the metrics included in each snapshot.
    pub fn with_filter(mut self, filter: SnapshotFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Builds the pipeline.
    pub fn build(self) -> ReportingPipeline {
        ReportingPipeline { reporters: self.reporters, filter: self.filter }
    }
}

/// Fans snapshots out to a set of reporters.
///
/// Every reporter receives every snapshot; a reporter that fails or panics is logged and skipped,
/// and never prevents the others from receiving theirs.
pub struct ReportingPipeline {
    reporters: Vec<Arc<dyn Reporter>>,
    filter: SnapshotFilter,
}

impl ReportingPipeline {
    /// Creates a [`ReportingPipelineBuilder`].
    pub fn builder() -> ReportingPipelineBuilder {
        ReportingPipelineBuilder::new()
    }

    /// Number of reporters.
    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    /// Whether the pipeline has no reporters.
    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }

    /// Takes a snapshot of `ctx` and delivers it to every reporter.
    ///
    /// Returns the errors of every reporter that failed.
    pub fn report_once(&self, ctx: &MetricsContext) -> Vec<ReportError> {
        let snapshot = ctx.snapshot_with(&self.filter);
        self.report(&snapshot)
    }

    /// Delivers an existing snapshot to every reporter.
    ///
    /// Returns the errors of every reporter that failed.  A reporter that panics is reported as
    /// [`ReportError::Failed`].
    pub fn report(&self, snapshot: &MetricsSnapshot) -> Vec<ReportError> {
        let mut failures = Vec::new();
        for reporter in &self.reporters {
            let result = catch_unwind(AssertUnwindSafe(|| reporter.report(snapshot)))
                .unwrap_or_else(|payload| {
                    Err(ReportError::Failed {
                        reporter: reporter.name().to_string(),
                        reason: format!("reporter panicked: {}", panic_message(payload.as_ref())),
                    })
                });
            if let Err(e) = result {
                error!(reporter = reporter.name(), error = %e, "Failed to deliver snapshot.");
                failures.push(e);
            }
        }

        debug!(
            reporters = self.reporters.len(),
            failures = failures.len(),
            metrics = snapshot.len(),
            "Finished delivering snapshot."
        );
        failures
    }

    /// Reports `ctx` every `interval` from a background thread.
    ///
    /// The first report happens one interval after spawning.  The thread runs until the returned
    /// handle is stopped or dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread could not be spawned.
    pub fn spawn(self, ctx: MetricsContext, interval: Duration) -> io::Result<ReportingHandle> {
        let shutdown = Arc::new(Shutdown::default());
        let thread_shutdown = Arc::clone(&shutdown);

        let thread = std::thread::Builder::new()
            .name("metrics-engine-reporter".to_string())
            .spawn(move || {
                while thread_shutdown.wait(interval) {
                    self.report_once(&ctx);
                }
                debug!("Reporting thread stopped.");
            })?;

        Ok(ReportingHandle { shutdown, thread: Some(thread) })
    }
}

#[derive(Default)]
struct Shutdown {
    stopped: Mutex<bool>,
    signal: Condvar,
}

impl Shutdown {
    /// Waits up to `timeout`, returning `false` if shutdown was requested.
    fn wait(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        let mut stopped = self.stopped.lock();
        while !*stopped {
            if self.signal.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        !*stopped
    }

    fn trigger(&self) {
        *self.stopped.lock() = true;
        self.signal.notify_all();
    }
}

/// Handle to a background reporting thread.
///
/// Dropping the handle stops the thread without waiting for it.
pub struct ReportingHandle {
    shutdown: Arc<Shutdown>,
    thread: Option<JoinHandle<()>>,
}

impl ReportingHandle {
    /// Stops the reporting thread and waits for it to exit.
    ///
    /// A report already in progress is allowed to finish.
    pub fn stop(mut self) {
        self.shutdown.trigger();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Reporting thread panicked.");
            }
        }
    }
}

impl Drop for ReportingHandle {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}
