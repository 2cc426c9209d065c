use conduit_core::Timestamp;
use conduit_ports::Clock;
use chrono::{Duration, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

/// Clock whose time only changes via [`advance`](ManualClock::advance) or
/// [`set_time`](ManualClock::set_time)
pub struct ManualClock {
    current: RwLock<Timestamp>,
}

impl ManualClock {
    /// Create a clock frozen at `start`
    pub fn new(start: Timestamp) -> Arc<Self> {
        Arc::new(Self {
            current: RwLock::new(start),
        })
    }

    /// Create a clock frozen at the current wall time
    pub fn starting_now() -> Arc<Self> {
        Self::new(Utc::now())
    }

    /// Move time forward
    pub fn advance(&self, duration: Duration) {
        *self.current.write() += duration;
    }

    /// Jump to an explicit time
    ///
    /// Warning: moving backwards breaks window-reset assumptions.
    pub fn set_time(&self, time: Timestamp) {
        *self.current.write() = time;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.current.read()
    }

    fn name(&self) -> &str {
        "ManualClock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_manual_clock_is_frozen() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn test_manual_clock_advance_and_set() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::new(start);

        clock.advance(Duration::seconds(90));
        assert_eq!(clock.now(), start + Duration::seconds(90));

        let later = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        clock.set_time(later);
        assert_eq!(clock.now(), later);
    }
}
