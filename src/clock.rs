//! Time source for the throttle.
//!
//! The throttle measures refills and sleeps through a [`Clock`] so callers
//! can substitute a [`ManualClock`] and exercise rate limiting without real
//! delays.

use std::sync::Arc;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use parking_lot::Mutex;

/// Wall-clock time and sleeping.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current time in seconds since the Unix epoch.
    fn now(&self) -> f64;

    /// Sleep for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// System time and tokio's timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    /// Returns 0.0 if system time is before the Unix epoch.
    fn now(&self) -> f64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0)
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// A clock that only moves when told to.
///
/// `sleep` advances the clock by the requested duration and returns
/// immediately. Every sleep is recorded.
///
/// Elapsed time is kept as a [`Duration`] and only converted to seconds in
/// `now`, so sleeps far smaller than the float spacing at `start` still
/// accumulate instead of being rounded away.
#[derive(Debug, Clone)]
pub struct ManualClock {
    inner: Arc<Mutex<ManualClockState>>,
}

#[derive(Debug)]
struct ManualClockState {
    start: f64,
    elapsed: Duration,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    /// Create a clock reading `start` seconds.
    pub fn new(start: f64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ManualClockState {
                start,
                elapsed: Duration::ZERO,
                sleeps: Vec::new(),
            })),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, duration: Duration) {
        let mut state = self.inner.lock();
        state.elapsed = state.elapsed.saturating_add(duration);
    }

    /// Durations passed to `sleep` so far.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.inner.lock().sleeps.clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> f64 {
        let state = self.inner.lock();
        state.start + state.elapsed.as_secs_f64()
    }

    async fn sleep(&self, duration: Duration) {
        {
            let mut state = self.inner.lock();
            state.elapsed = state.elapsed.saturating_add(duration);
            state.sleeps.push(duration);
        }
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_after_2020() {
        assert!(SystemClock.now() > 1_577_836_800.0);
    }

    #[tokio::test]
    async fn test_manual_clock_sleep_advances() {
        let clock = ManualClock::new(1000.0);
        clock.sleep(Duration::from_millis(1500)).await;
        assert_eq!(clock.now(), 1001.5);

        clock.advance(Duration::from_secs(2));
        assert_eq!(clock.now(), 1003.5);
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(1500)]);
    }

    #[tokio::test]
    async fn test_manual_clock_accumulates_tiny_sleeps() {
        let start = 1_700_000_000.0;
        let clock = ManualClock::new(start);
        // Each sleep is below the float spacing at `start`
        for _ in 0..10 {
            clock.sleep(Duration::from_nanos(100)).await;
        }
        assert!(clock.now() > start);
    }

    #[tokio::test]
    async fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::new(0.0);
        let other = clock.clone();
        other.sleep(Duration::from_secs(1)).await;
        assert_eq!(clock.now(), 1.0);
    }
}
