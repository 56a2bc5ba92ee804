// SPDX-License-Identifier: MIT OR Apache-2.0
//! Busy-wait spin lock.
//!
//! Used for short, contention-light critical sections shared by frame worker
//! threads, such as the transient resource pool. Waiting burns CPU instead of
//! parking the thread, so holders must never block or do heavy work while the
//! lock is held. Use [`parking_lot::Mutex`] for anything else.

use parking_lot::lock_api::{self, GuardSend, RawMutex};
use std::sync::atomic::{AtomicBool, Ordering};

/// Raw spin lock implementing [`RawMutex`]
#[derive(Debug)]
pub struct RawSpinLock {
    locked: AtomicBool,
}

// SAFETY: `lock` and `try_lock` only return once the flag was flipped from
// false to true with acquire ordering, so at most one holder exists; `unlock`
// releases with release ordering.
#[allow(unsafe_code)]
unsafe impl RawMutex for RawSpinLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self {
        locked: AtomicBool::new(false),
    };

    type GuardMarker = GuardSend;

    fn lock(&self) {
        while !self.try_lock() {
            // Spin on a plain load to keep the cache line shared until it frees up.
            while self.locked.load(Ordering::Relaxed) {
                std::hint::spin_loop();
            }
        }
    }

    fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    unsafe fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

/// Spin lock protecting a value
pub type SpinLock<T> = lock_api::Mutex<RawSpinLock, T>;

/// Guard returned by [`SpinLock::lock`]
pub type SpinLockGuard<'a, T> = lock_api::MutexGuard<'a, RawSpinLock, T>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_try_lock_while_held() {
        let lock = SpinLock::new(5);
        let guard = lock.lock();
        assert!(lock.is_locked());
        assert!(lock.try_lock().is_none());
        drop(guard);
        assert!(!lock.is_locked());
        assert_eq!(lock.try_lock().map(|value| *value), Some(5));
    }

    #[test]
    fn test_contended_increments() {
        let counter = Arc::new(SpinLock::new(0_u64));
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let counter = Arc::clone(&counter);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        *counter.lock() += 1;
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        assert_eq!(*counter.lock(), 4000);
    }
}
