//! An in-process metrics engine.
//!
//! Application code registers named counters, gauges, meters, histograms and timers in groups, and
//! updates them concurrently from any number of threads.  At any point, a consistent snapshot of
//! every metric, the health of the application and the environment it runs in can be taken and
//! handed to reporters.
//!
//! # Overview
//!
//! Everything starts with a [`MetricsContext`], built once at startup:
//!
//! ```rust
//! use metrics_engine::{HealthCheckResult, MetricsContext};
//!
//! let ctx = MetricsContext::builder().build().expect("valid configuration");
//!
//! let http = ctx.group("http");
//! http.counter("requests").expect("not registered as another kind").increment(1);
//! http.timer("latency").expect("not registered as another kind").time(|| {
//!     // handle the request
//! });
//!
//! ctx.register_health_check_fn("database", || Ok(HealthCheckResult::healthy()));
//!
//! let snapshot = ctx.snapshot();
//! assert_eq!(snapshot.get("http", "requests").and_then(|v| v.as_counter()), Some(1));
//! assert!(snapshot.health().is_healthy());
//! ```
//!
//! # Sampling
//!
//! Histograms and timers keep a bounded sample of the values recorded into them, rather than every
//! value.  [`SamplingPolicy`] selects between a uniform reservoir, where every value has the same
//! chance of being kept, and an exponentially decaying reservoir that favours recent values and is
//! the better fit for long-running processes.
//!
//! # Disabling
//!
//! [`MetricsContext::completely_disable_metrics`] turns every update into a no-op, for good.
//! Snapshots keep working and report the values metrics had when they were disabled.
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod builder;
pub use self::builder::MetricsBuilder;

mod context;
pub use self::context::{MetricsContext, MetricsContextBuilder};

mod environment;
pub use self::environment::{EnvironmentInfo, EnvironmentInfoProvider, ProcessEnvironment};

mod error;
pub use self::error::MetricsError;

mod filter;
pub use self::filter::{Matcher, SnapshotFilter};

pub mod handles;
pub use self::handles::{Metric, MetricValue};

pub mod health;
pub use self::health::{
    HealthCheck, HealthCheckManager, HealthCheckRegistry, HealthCheckResult, HealthReport,
    HealthStatus,
};

mod kind;
pub use self::kind::{MetricKind, MetricKindMask};

mod quantile;
pub use self::quantile::{parse_quantiles, Quantile, DEFAULT_QUANTILES};

pub mod registry;
pub use self::registry::{MetricGroup, Registry};

pub mod reporting;
pub use self::reporting::{ReportError, Reporter, ReportingPipeline};

mod snapshot;
pub use self::snapshot::{GroupSnapshot, MetricName, MetricsSnapshot};

mod state;
pub use self::state::{MetricsState, MetricsSwitch};

pub mod storage;
pub use self::storage::{Reservoir, Sample, SamplingPolicy};

pub use quanta::Clock;

#[cfg(test)]
mod test_util;
