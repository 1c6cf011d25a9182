//! Counting semaphore.
//!
//! A classic wait/post semaphore over a non-negative counter. `wait(n)`
//! blocks until at least `n` units are available and takes them in one step;
//! `post(n)` adds units and wakes every waiter so each can re-check its own
//! requirement.

use crate::core::error::SemaphoreClosed;
use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct State {
    value: usize,
    closed: bool,
}

/// A blocking counting semaphore.
///
/// The counter is never stored negative. Waiters re-check the counter under
/// the lock after every wake, so a post that lands between a waiter's check
/// and its block is never lost. There is no fairness among waiters that
/// compete for partial capacity.
#[derive(Debug)]
pub struct CountingSemaphore {
    state: Mutex<State>,
    available: Condvar,
}

impl CountingSemaphore {
    /// Create a semaphore holding `initial` units.
    pub fn new(initial: usize) -> Self {
        Self {
            state: Mutex::new(State {
                value: initial,
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Block until `n` units are available, then take them.
    ///
    /// Blocks indefinitely if never posted. Returns `SemaphoreClosed` only
    /// once the semaphore has been closed.
    pub fn wait(&self, n: usize) -> Result<(), SemaphoreClosed> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(SemaphoreClosed);
            }
            if state.value >= n {
                state.value -= n;
                return Ok(());
            }
            self.available.wait(&mut state);
        }
    }

    /// Take a single unit.
    pub fn wait_one(&self) -> Result<(), SemaphoreClosed> {
        self.wait(1)
    }

    /// Like [`wait`](Self::wait), but gives up after `timeout`.
    ///
    /// Returns `Ok(true)` if the units were taken and `Ok(false)` on timeout,
    /// in which case the counter is left untouched. A timeout too large to
    /// represent as a deadline waits without limit.
    pub fn wait_timeout(&self, n: usize, timeout: Duration) -> Result<bool, SemaphoreClosed> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.wait(n).map(|()| true);
        };
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(SemaphoreClosed);
            }
            if state.value >= n {
                state.value -= n;
                return Ok(true);
            }
            if self.available.wait_until(&mut state, deadline).timed_out() {
                // One last look: a post may have raced the deadline.
                if !state.closed && state.value >= n {
                    state.value -= n;
                    return Ok(true);
                }
                return if state.closed {
                    Err(SemaphoreClosed)
                } else {
                    Ok(false)
                };
            }
        }
    }

    /// Take `n` units if they are available right now.
    pub fn try_wait(&self, n: usize) -> bool {
        let mut state = self.state.lock();
        if state.closed || state.value < n {
            return false;
        }
        state.value -= n;
        true
    }

    /// Add `n` units and wake all waiters.
    pub fn post(&self, n: usize) {
        let mut state = self.state.lock();
        state.value += n;
        self.available.notify_all();
    }

    /// Add a single unit.
    pub fn post_one(&self) {
        self.post(1)
    }

    /// Close the semaphore. Every current and future wait fails.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.available.notify_all();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Snapshot of the counter. Stale as soon as it is returned.
    pub fn value(&self) -> usize {
        self.state.lock().value
    }
}

impl Default for CountingSemaphore {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_wait_takes_posted_units() {
        let sem = CountingSemaphore::new(0);
        sem.post(3);
        sem.wait(2).unwrap();
        assert_eq!(sem.value(), 1);
        sem.wait_one().unwrap();
        assert_eq!(sem.value(), 0);
    }

    #[test]
    fn test_wait_zero_returns_immediately() {
        let sem = CountingSemaphore::new(0);
        sem.wait(0).unwrap();
        assert_eq!(sem.value(), 0);
    }

    #[test]
    fn test_try_wait() {
        let sem = CountingSemaphore::new(1);
        assert!(!sem.try_wait(2));
        assert_eq!(sem.value(), 1);
        assert!(sem.try_wait(1));
        assert!(!sem.try_wait(1));
    }

    #[test]
    fn test_wait_blocks_until_enough_units() {
        let sem = Arc::new(CountingSemaphore::new(0));
        let (tx, rx) = channel::unbounded();

        let waiter = {
            let sem = sem.clone();
            thread::spawn(move || {
                sem.wait(3).unwrap();
                tx.send(()).unwrap();
            })
        };

        sem.post(2);
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        sem.post(1);
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        waiter.join().unwrap();
        assert_eq!(sem.value(), 0);
    }

    #[test]
    fn test_no_lost_wakeup() {
        // Posts race the waiters' blocking; every waiter must still return.
        for _ in 0..200 {
            let sem = Arc::new(CountingSemaphore::new(0));
            let waiters: Vec<_> = (0..4)
                .map(|_| {
                    let sem = sem.clone();
                    thread::spawn(move || sem.wait_one().unwrap())
                })
                .collect();
            for _ in 0..4 {
                sem.post_one();
            }
            for waiter in waiters {
                waiter.join().unwrap();
            }
            assert_eq!(sem.value(), 0);
        }
    }

    #[test]
    fn test_post_wakes_all_waiters() {
        let sem = Arc::new(CountingSemaphore::new(0));
        let woken = Arc::new(AtomicUsize::new(0));

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let sem = sem.clone();
                let woken = woken.clone();
                thread::spawn(move || {
                    sem.wait(2).unwrap();
                    woken.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        sem.post(6);
        for waiter in waiters {
            waiter.join().unwrap();
        }
        assert_eq!(woken.load(Ordering::SeqCst), 3);
        assert_eq!(sem.value(), 0);
    }

    #[test]
    fn test_wait_timeout_leaves_counter_untouched() {
        let sem = CountingSemaphore::new(1);
        assert_eq!(sem.wait_timeout(2, Duration::from_millis(20)), Ok(false));
        assert_eq!(sem.value(), 1);
        assert_eq!(sem.wait_timeout(1, Duration::from_millis(20)), Ok(true));
        assert_eq!(sem.value(), 0);
    }

    #[test]
    fn test_wait_timeout_max_waits_without_limit() {
        let sem = Arc::new(CountingSemaphore::new(0));
        let (tx, rx) = channel::bounded(1);
        let waiter = {
            let sem = sem.clone();
            thread::spawn(move || {
                let taken = sem.wait_timeout(2, Duration::MAX);
                tx.send(()).unwrap();
                taken
            })
        };

        sem.post(1);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        sem.post(1);
        assert_eq!(waiter.join().unwrap(), Ok(true));
        assert_eq!(sem.value(), 0);
    }

    #[test]
    fn test_close_wakes_blocked_waiters() {
        let sem = Arc::new(CountingSemaphore::new(0));
        let waiter = {
            let sem = sem.clone();
            thread::spawn(move || sem.wait(5))
        };

        thread::sleep(Duration::from_millis(20));
        sem.close();
        assert_eq!(waiter.join().unwrap(), Err(SemaphoreClosed));
        assert!(sem.is_closed());
        assert_eq!(sem.wait(0), Err(SemaphoreClosed));
        assert_eq!(sem.wait_timeout(0, Duration::ZERO), Err(SemaphoreClosed));
        assert!(!sem.try_wait(0));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_decrements_never_exceed_increments(
            initial in 0usize..4,
            posts in proptest::collection::vec(1usize..4, 1..8),
            waits in proptest::collection::vec(1usize..4, 1..8),
        ) {
            let sem = Arc::new(CountingSemaphore::new(initial));
            let supplied = initial + posts.iter().sum::<usize>();

            // Only start as many waiters as the supply can satisfy.
            let mut demanded = 0;
            let admitted: Vec<usize> = waits
                .into_iter()
                .take_while(|n| {
                    demanded += n;
                    demanded <= supplied
                })
                .collect();
            let taken: usize = admitted.iter().sum();

            let waiters: Vec<_> = admitted
                .into_iter()
                .map(|n| {
                    let sem = sem.clone();
                    thread::spawn(move || sem.wait(n).unwrap())
                })
                .collect();

            let poster = {
                let sem = sem.clone();
                thread::spawn(move || {
                    for n in posts {
                        sem.post(n);
                    }
                })
            };

            poster.join().unwrap();
            for waiter in waiters {
                waiter.join().unwrap();
            }

            prop_assert_eq!(sem.value(), supplied - taken);
        }
    }
}
