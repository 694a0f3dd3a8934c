use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use quanta::Instant;

/// Whether metric updates are being recorded.
///
/// Every context starts out `Enabled`.  The only transition is to `Disabled`, and it is one-way for
/// the lifetime of the context.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MetricsState {
    /// Updates are recorded.
    Enabled,
    /// Updates are ignored; registered metrics keep their last values.
    Disabled,
}

/// Process-wide (per-context) switch consulted on the fast path of every metric update.
///
/// Cloning the switch shares the underlying flag, so every metric built by the same builder sees a
/// disable as soon as it happens.  The switch also remembers when it was flipped, which time-based
/// readings use as their frozen "now".
#[derive(Clone, Debug)]
pub struct MetricsSwitch(Arc<SwitchState>);

#[derive(Debug)]
struct SwitchState {
    enabled: AtomicBool,
    disabled_at: Mutex<Option<Instant>>,
}

impl MetricsSwitch {
    /// Creates a new switch in the given state.
    pub fn new(state: MetricsState) -> Self {
        MetricsSwitch(Arc::new(SwitchState {
            enabled: AtomicBool::new(state == MetricsState::Enabled),
            disabled_at: Mutex::new(None),
        }))
    }

    /// Whether updates should currently be recorded.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.0.enabled.load(Ordering::Acquire)
    }

    /// When the switch was disabled.
    ///
    /// `None` while enabled, and for a switch that was created disabled.
    pub fn disabled_at(&self) -> Option<Instant> {
        *self.0.disabled_at.lock()
    }

    /// Gets the current state.
    pub fn state(&self) -> MetricsState {
        if self.is_enabled() {
            MetricsState::Enabled
        } else {
            MetricsState::Disabled
        }
    }

    /// Disables all updates, recording `now` as the moment of the transition.
    ///
    /// Returns `true` if this call performed the transition.
    pub(crate) fn disable(&self, now: Instant) -> bool {
        // Held across the flip so that anyone observing the disabled flag also sees the instant.
        let mut disabled_at = self.0.disabled_at.lock();
        let transitioned = self.0.enabled.swap(false, Ordering::AcqRel);
        if transitioned {
            *disabled_at = Some(now);
        }
        transitioned
    }
}

impl Default for MetricsSwitch {
    fn default() -> Self {
        MetricsSwitch::new(MetricsState::Enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::{MetricsState, MetricsSwitch};
    use quanta::Clock;
    use std::time::Duration;

    #[test]
    fn test_one_way_transition() {
        let (clock, mock) = Clock::mock();
        let switch = MetricsSwitch::default();
        let shared = switch.clone();
        assert_eq!(switch.state(), MetricsState::Enabled);
        assert_eq!(switch.disabled_at(), None);

        let first = clock.now();
        assert!(shared.disable(first));
        assert!(!switch.is_enabled());
        assert_eq!(switch.state(), MetricsState::Disabled);
        assert_eq!(switch.disabled_at(), Some(first));

        // A second disable is a no-op, and keeps the original instant.
        mock.increment(Duration::from_secs(30));
        assert!(!switch.disable(clock.now()));
        assert_eq!(shared.state(), MetricsState::Disabled);
        assert_eq!(shared.disabled_at(), Some(first));
    }

    #[test]
    fn test_starts_disabled() {
        let switch = MetricsSwitch::new(MetricsState::Disabled);
        assert!(!switch.is_enabled());
        assert_eq!(switch.disabled_at(), None);
    }
}
