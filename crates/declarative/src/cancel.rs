//! Cooperative cancellation with an optional wall-clock deadline
//!
//! Waits observe the token and return early; attempts are never interrupted,
//! the executor only checks the token between them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Returned by [`CancelToken::sleep`] when the wait was cut short
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

#[derive(Debug)]
struct Inner {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
    lock: Mutex<()>,
    wake: Condvar,
}

/// Shared cancellation flag, cloned into every phase of a run
#[derive(Debug, Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// Token that only cancels when [`cancel`](Self::cancel) is called
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Token that cancels itself once `budget` has elapsed
    pub fn with_deadline(budget: Duration) -> Self {
        Self::build(Instant::now().checked_add(budget))
    }

    fn build(deadline: Option<Instant>) -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                deadline,
                lock: Mutex::new(()),
                wake: Condvar::new(),
            }),
        }
    }

    /// Cancel the run and wake every sleeping phase
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        let _guard = self
            .inner
            .lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.inner.wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
            || self
                .inner
                .deadline
                .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Time left before the deadline, if one is set
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Block for `duration`, returning early if the token is cancelled
    ///
    /// A duration past the range of the clock waits until cancellation.
    pub fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        let until = Instant::now().checked_add(duration);
        let mut guard = self
            .inner
            .lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        loop {
            if self.is_cancelled() {
                return Err(Cancelled);
            }

            let now = Instant::now();
            let left = match until {
                Some(until) if now >= until => return Ok(()),
                Some(until) => Some(until - now),
                None => None,
            };

            let wait = match (left, self.remaining()) {
                (Some(left), Some(remaining)) => Some(left.min(remaining)),
                (left, remaining) => left.or(remaining),
            };

            guard = match wait {
                Some(wait) => match self.inner.wake.wait_timeout(guard, wait) {
                    Ok((guard, _)) => guard,
                    Err(poisoned) => poisoned.into_inner().0,
                },
                None => match self.inner.wake.wait(guard) {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                },
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_sleep_completes() {
        let token = CancelToken::new();
        let start = Instant::now();
        assert_eq!(token.sleep(Duration::from_millis(20)), Ok(()));
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert!(!token.is_cancelled());
        assert_eq!(token.remaining(), None);
    }

    #[test]
    fn test_cancel_wakes_sleeper() {
        let token = CancelToken::new();
        let sleeper = token.clone();
        let handle = thread::spawn(move || {
            let start = Instant::now();
            (sleeper.sleep(Duration::from_secs(30)), start.elapsed())
        });

        thread::sleep(Duration::from_millis(20));
        token.cancel();

        let (outcome, elapsed) = handle.join().unwrap();
        assert_eq!(outcome, Err(Cancelled));
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_deadline_cuts_sleep_short() {
        let token = CancelToken::with_deadline(Duration::from_millis(30));
        let start = Instant::now();
        assert_eq!(token.sleep(Duration::from_secs(30)), Err(Cancelled));
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_cancelled_token_refuses_zero_sleep() {
        let token = CancelToken::new();
        token.cancel();
        assert_eq!(token.sleep(Duration::ZERO), Err(Cancelled));
    }

    #[test]
    fn test_unbounded_sleep_ends_at_deadline() {
        let token = CancelToken::with_deadline(Duration::from_millis(20));
        let start = Instant::now();
        assert_eq!(token.sleep(Duration::from_secs(u64::MAX)), Err(Cancelled));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_unbounded_sleep_ends_on_cancel() {
        let token = CancelToken::new();
        let canceller = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            canceller.cancel();
        });
        assert_eq!(token.sleep(Duration::MAX), Err(Cancelled));
        handle.join().unwrap();
    }
}
