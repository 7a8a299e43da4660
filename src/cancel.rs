// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Level-triggered pipeline cancellation.
//!
//! A [`CancelToken`] is shared by every stage of one pipeline. Cancelling sets
//! the flag and then, for every slot buffer created against the token, takes the
//! buffer's mutex and notifies both of its conditions. Waiters only ever test
//! the flag while holding that same mutex, so a waiter is either woken by the
//! notification or observes the flag before it blocks. No wakeup can be lost.
//!
//! Cancellation is meant to be triggered from an ordinary thread (the binary
//! uses the `ctrlc` handler thread), never from inside a signal handler.

use parking_lot::{Condvar, Mutex};
use std::{
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

/// Something blocked on a condition that must be woken on cancellation.
pub(crate) trait Wake: Send + Sync {
    /// Lock the guarded state and notify every condition.
    fn wake_all(&self);
}

struct Inner {
    cancelled: AtomicBool,
    wakers: Mutex<Vec<Weak<dyn Wake>>>,
    sleep_lock: Mutex<()>,
    sleep_cv: Condvar,
}

/// Shared cancellation flag for one pipeline instance.
///
/// Cloning is cheap and every clone refers to the same flag.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                wakers: Mutex::new(Vec::new()),
                sleep_lock: Mutex::new(()),
                sleep_cv: Condvar::new(),
            }),
        }
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Cancel the pipeline and wake every blocked waiter.
    ///
    /// Safe to call any number of times from any thread. Returns `true` only
    /// for the call that actually flipped the flag.
    pub fn cancel(&self) -> bool {
        let first = !self.inner.cancelled.swap(true, Ordering::SeqCst);

        {
            let _guard = self.inner.sleep_lock.lock();
            self.inner.sleep_cv.notify_all();
        }

        // Upgrade under the registry lock but wake outside of it so that the
        // registry lock and buffer locks are never held together.
        let wakers: Vec<Arc<dyn Wake>> = self
            .inner
            .wakers
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        for waker in wakers {
            waker.wake_all();
        }

        first
    }

    /// Sleep until `deadline` unless cancelled first.
    ///
    /// Returns `true` when the deadline was reached and `false` when the
    /// token was (or already had been) cancelled.
    pub fn sleep_until(&self, deadline: Instant) -> bool {
        let mut guard = self.inner.sleep_lock.lock();
        loop {
            if self.is_cancelled() {
                return false;
            }
            if Instant::now() >= deadline {
                return true;
            }
            self.inner.sleep_cv.wait_until(&mut guard, deadline);
        }
    }

    pub(crate) fn register(&self, waker: Weak<dyn Wake>) {
        let mut wakers = self.inner.wakers.lock();
        wakers.retain(|w| w.strong_count() > 0);
        wakers.push(waker);
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{thread, time::Duration};

    #[test]
    fn test_cancel_is_idempotent() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(token.cancel());
        assert!(!token.cancel());
        assert!(token.clone().is_cancelled());
    }

    #[test]
    fn test_sleep_until_deadline() {
        let token = CancelToken::new();
        let deadline = Instant::now() + Duration::from_millis(20);
        assert!(token.sleep_until(deadline));
        assert!(Instant::now() >= deadline);
    }

    #[test]
    fn test_sleep_interrupted_by_cancel() {
        let token = CancelToken::new();
        let sleeper = token.clone();
        let start = Instant::now();
        let handle =
            thread::spawn(move || sleeper.sleep_until(Instant::now() + Duration::from_secs(30)));

        thread::sleep(Duration::from_millis(20));
        token.cancel();

        assert!(!handle.join().unwrap());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_sleep_after_cancel_returns_immediately() {
        let token = CancelToken::new();
        token.cancel();
        assert!(!token.sleep_until(Instant::now() + Duration::from_secs(30)));
    }
}
