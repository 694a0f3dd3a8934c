use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use quanta::{Clock, Instant};

use crate::state::MetricsSwitch;

/// How often the moving averages advance.
pub const TICK_INTERVAL: Duration = Duration::from_secs(5);

const TICK_NANOS: u64 = 5_000_000_000;

/// An exponentially-weighted moving average of an event rate, in events per second.
///
/// Only one thread ever ticks a given average at a time: ticking is gated by the owning meter.
#[derive(Debug)]
struct Ewma {
    alpha: f64,
    uncounted: AtomicU64,
    rate: AtomicU64,
    initialized: AtomicBool,
}

impl Ewma {
    fn over_minutes(minutes: f64) -> Ewma {
        let interval = TICK_INTERVAL.as_secs_f64();
        Ewma {
            alpha: 1.0 - (-interval / 60.0 / minutes).exp(),
            uncounted: AtomicU64::new(0),
            rate: AtomicU64::new(0.0f64.to_bits()),
            initialized: AtomicBool::new(false),
        }
    }

    fn update(&self, n: u64) {
        self.uncounted.fetch_add(n, Ordering::AcqRel);
    }

    /// Advances the average by `ticks` intervals.
    ///
    /// Only the first interval carries the uncounted events; the rest decay the rate towards zero.
    fn tick(&self, ticks: u64) {
        if ticks == 0 {
            return;
        }

        let count = self.uncounted.swap(0, Ordering::AcqRel);
        let instant_rate = count as f64 / TICK_INTERVAL.as_secs_f64();

        let mut rate = if self.initialized.swap(true, Ordering::AcqRel) {
            let rate = self.rate();
            rate + self.alpha * (instant_rate - rate)
        } else {
            instant_rate
        };

        if ticks > 1 {
            rate *= (1.0 - self.alpha).powf((ticks - 1) as f64);
        }
        self.rate.store(rate.to_bits(), Ordering::Release);
    }

    fn rate(&self) -> f64 {
        f64::from_bits(self.rate.load(Ordering::Acquire))
    }
}

/// Point-in-time reading of a [`Meter`].
///
/// All rates are in events per second.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeterValue {
    /// Total number of events marked.
    pub count: u64,
    /// Lifetime average rate.
    pub mean_rate: f64,
    /// One-minute exponentially-weighted moving average rate.
    pub one_minute_rate: f64,
    /// Five-minute exponentially-weighted moving average rate.
    pub five_minute_rate: f64,
    /// Fifteen-minute exponentially-weighted moving average rate.
    pub fifteen_minute_rate: f64,
}

/// Measures the rate at which a set of events occur.
///
/// Tracks a total count alongside 1, 5 and 15 minute moving averages, the same windows used for
/// load averages.  There is no background thread: whichever `mark` or read first notices that at
/// least one [`TICK_INTERVAL`] has elapsed advances the averages by every interval missed, so rates
/// stay accurate even when the meter is read rarely.
#[derive(Debug)]
pub struct Meter {
    count: AtomicU64,
    m1: Ewma,
    m5: Ewma,
    m15: Ewma,
    start: Instant,
    // Nanoseconds since `start`.
    last_tick: AtomicU64,
    clock: Clock,
    switch: MetricsSwitch,
}

impl Meter {
    pub(crate) fn new(clock: Clock, switch: MetricsSwitch) -> Meter {
        let start = clock.now();
        Meter {
            count: AtomicU64::new(0),
            m1: Ewma::over_minutes(1.0),
            m5: Ewma::over_minutes(5.0),
            m15: Ewma::over_minutes(15.0),
            start,
            last_tick: AtomicU64::new(0),
            clock,
            switch,
        }
    }

    /// Marks the occurrence of `n` events.
    pub fn mark(&self, n: u64) {
        if !self.switch.is_enabled() {
            return;
        }

        self.tick_if_necessary();
        self.count.fetch_add(n, Ordering::AcqRel);
        self.m1.update(n);
        self.m5.update(n);
        self.m15.update(n);
    }

    /// Total number of events marked.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    /// Gets the current reading.
    pub fn value(&self) -> MeterValue {
        if self.switch.is_enabled() {
            self.tick_if_necessary();
        }

        let count = self.count();
        MeterValue {
            count,
            mean_rate: self.mean_rate(count),
            one_minute_rate: self.m1.rate(),
            five_minute_rate: self.m5.rate(),
            fifteen_minute_rate: self.m15.rate(),
        }
    }

    fn elapsed_nanos(&self) -> u64 {
        let elapsed = self.clock.now().duration_since(self.start);
        u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX)
    }

    fn mean_rate(&self, count: u64) -> f64 {
        if count == 0 {
            return 0.0;
        }

        // A disabled meter measures its lifetime up to the moment it was disabled.
        let now = if self.switch.is_enabled() {
            self.clock.now()
        } else {
            self.switch.disabled_at().unwrap_or(self.start)
        };
        let elapsed = now.duration_since(self.start).as_secs_f64();
        if elapsed <= 0.0 {
            0.0
        } else {
            count as f64 / elapsed
        }
    }

    fn tick_if_necessary(&self) {
        let old_tick = self.last_tick.load(Ordering::Acquire);
        let now = self.elapsed_nanos();
        let age = now.saturating_sub(old_tick);
        if age < TICK_NANOS {
            return;
        }

        // Align the new tick to the interval grid so partial intervals carry over.
        let new_tick = now - age % TICK_NANOS;
        if self
            .last_tick
            .compare_exchange(old_tick, new_tick, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let ticks = age / TICK_NANOS;
            self.m1.tick(ticks);
            self.m5.tick(ticks);
            self.m15.tick(ticks);
        }
    }
}
