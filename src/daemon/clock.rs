//! Time source for the tick loop.
//!
//! The engine never calls `Instant::now()` or `tokio::time::sleep` directly;
//! it goes through a [`Clock`] so tests can drive the countdown with
//! [`ManualClock`] instead of waiting on real seconds.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::watch;

/// Boxed future returned by [`Clock::sleep_until`].
pub type Sleep = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Monotonic time source with a sleep primitive.
pub trait Clock: Send + Sync + 'static {
    /// Returns the current instant.
    fn now(&self) -> Instant;

    /// Returns a future that completes once `now() >= deadline`.
    fn sleep_until(&self, deadline: Instant) -> Sleep;
}

// ============================================================================
// SystemClock
// ============================================================================

/// Clock backed by the Tokio timer.
///
/// Honors `tokio::time::pause()` so it also works under paused test time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn sleep_until(&self, deadline: Instant) -> Sleep {
        Box::pin(tokio::time::sleep_until(tokio::time::Instant::from_std(
            deadline,
        )))
    }
}

// ============================================================================
// ManualClock
// ============================================================================

/// Clock that only moves when [`ManualClock::advance`] is called.
///
/// Sleepers are woken through a watch channel every time the clock moves.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
    tx: watch::Sender<Instant>,
}

impl ManualClock {
    /// Creates a clock frozen at the current real instant.
    pub fn new() -> Self {
        let start = Instant::now();
        let (tx, _rx) = watch::channel(start);
        Self {
            now: Mutex::new(start),
            tx,
        }
    }

    /// Moves the clock forward and wakes every sleeper whose deadline passed.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
        self.tx.send_replace(*now);
    }

    /// Moves the clock forward by whole seconds.
    pub fn advance_secs(&self, secs: u64) {
        self.advance(Duration::from_secs(secs));
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sleep_until(&self, deadline: Instant) -> Sleep {
        let mut rx = self.tx.subscribe();
        Box::pin(async move {
            loop {
                if *rx.borrow_and_update() >= deadline {
                    return;
                }
                if rx.changed().await.is_err() {
                    // Clock dropped; time can never reach the deadline.
                    std::future::pending::<()>().await;
                }
            }
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    mod manual_clock_tests {
        use super::*;

        #[test]
        fn test_now_is_frozen() {
            let clock = ManualClock::new();
            let a = clock.now();
            std::thread::sleep(Duration::from_millis(5));
            assert_eq!(clock.now(), a);
        }

        #[test]
        fn test_advance_moves_now() {
            let clock = ManualClock::new();
            let start = clock.now();
            clock.advance_secs(3);
            clock.advance(Duration::from_millis(500));
            assert_eq!(clock.now() - start, Duration::from_millis(3500));
        }

        #[tokio::test]
        async fn test_sleep_until_past_deadline_is_ready() {
            let clock = ManualClock::new();
            let deadline = clock.now();
            tokio::time::timeout(Duration::from_secs(1), clock.sleep_until(deadline))
                .await
                .expect("deadline already reached");
        }

        #[tokio::test]
        async fn test_sleep_until_wakes_on_advance() {
            let clock = Arc::new(ManualClock::new());
            let deadline = clock.now() + Duration::from_secs(2);

            let sleeper = clock.clone();
            let handle = tokio::spawn(async move { sleeper.sleep_until(deadline).await });

            clock.advance_secs(1);
            tokio::task::yield_now().await;
            assert!(!handle.is_finished());

            clock.advance_secs(1);
            tokio::time::timeout(Duration::from_secs(1), handle)
                .await
                .expect("sleeper woke")
                .unwrap();
        }
    }

    mod system_clock_tests {
        use super::*;

        #[tokio::test]
        async fn test_sleep_until_elapses() {
            let clock = SystemClock;
            let start = clock.now();
            clock.sleep_until(start + Duration::from_millis(20)).await;
            assert!(clock.now() >= start + Duration::from_millis(20));
        }
    }
}
