//! Clock abstraction for testable due-time handling.
//!
//! The sweep decides "due-ness" by comparing `scheduled_at` against the
//! current time, so tests need to control that instant precisely. Production
//! code uses `RealClock`; tests inject a `TestClock` and advance it.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use chrono::{DateTime, Utc};

/// Time source used by the sweep scheduler and workers.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current instant for duration measurements.
    fn now(&self) -> Instant;

    /// Current system time for timestamps.
    fn now_system(&self) -> SystemTime;

    /// Current time as a UTC timestamp, the form stored on items.
    fn now_utc(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.now_system())
    }
}

/// Production clock backed by actual system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealClock;

impl RealClock {
    /// Creates a new real clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for RealClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn now_system(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Controllable clock for deterministic tests.
///
/// Monotonic and system time advance together via `advance`; system time can
/// additionally jump to an absolute instant.
#[derive(Debug, Clone)]
pub struct TestClock {
    monotonic_ns: Arc<AtomicU64>,
    system_ns: Arc<AtomicU64>,
    base_instant: Instant,
}

impl TestClock {
    /// Creates a test clock starting at the current wall time.
    pub fn new() -> Self {
        Self::with_start_time(SystemTime::now())
    }

    /// Creates a test clock starting at a specific time.
    pub fn with_start_time(start: SystemTime) -> Self {
        let since_epoch = start.duration_since(UNIX_EPOCH).unwrap_or_default();
        Self {
            monotonic_ns: Arc::new(AtomicU64::new(0)),
            system_ns: Arc::new(AtomicU64::new(
                u64::try_from(since_epoch.as_nanos().min(u128::from(u64::MAX))).unwrap_or(0),
            )),
            base_instant: Instant::now(),
        }
    }

    /// Advances both clocks by the given duration.
    pub fn advance(&self, duration: Duration) {
        let ns = u64::try_from(duration.as_nanos().min(u128::from(u64::MAX))).unwrap_or(0);
        self.monotonic_ns.fetch_add(ns, Ordering::AcqRel);
        self.system_ns.fetch_add(ns, Ordering::AcqRel);
    }

    /// Jumps system time to an absolute instant.
    ///
    /// Monotonic time never moves backwards, so backwards jumps only affect
    /// the system clock.
    pub fn jump_to(&self, time: SystemTime) {
        let target_ns = u64::try_from(
            time.duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
                .min(u128::from(u64::MAX)),
        )
        .unwrap_or(0);
        let current_ns = self.system_ns.load(Ordering::Acquire);

        if target_ns > current_ns {
            self.advance(Duration::from_nanos(target_ns - current_ns));
        } else {
            self.system_ns.store(target_ns, Ordering::Release);
        }
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        self.base_instant + Duration::from_nanos(self.monotonic_ns.load(Ordering::Acquire))
    }

    fn now_system(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_nanos(self.system_ns.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances_monotonic_time() {
        let clock = TestClock::new();
        let start = clock.now();
        clock.advance(Duration::from_secs(10));
        assert_eq!(clock.now().duration_since(start), Duration::from_secs(10));
    }

    #[test]
    fn test_clock_tracks_system_time() {
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1000);
        let clock = TestClock::with_start_time(start);
        assert_eq!(clock.now_system(), start);

        clock.advance(Duration::from_secs(60));
        assert_eq!(clock.now_system(), start + Duration::from_secs(60));
    }

    #[test]
    fn test_clock_jumps_to_absolute_time() {
        let clock = TestClock::new();
        let target = SystemTime::UNIX_EPOCH + Duration::from_secs(2000);
        clock.jump_to(target);
        assert_eq!(clock.now_system(), target);
    }

    #[test]
    fn now_utc_matches_system_time() {
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let clock = TestClock::with_start_time(start);
        assert_eq!(clock.now_utc(), DateTime::<Utc>::from(start));
    }
}
