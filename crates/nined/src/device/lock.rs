//! Cooperative token locks
//!
//! The legacy interop surface acquires and releases its locks in separate
//! calls, so a scoped guard cannot span the boundary. A [`CooperativeLock`]
//! is a Mutex+Condvar token: `acquire` blocks until the token is free,
//! `release` hands it back. The contract is cooperative; there is no
//! reentrancy protection and no owner tracking.

use std::sync::{Condvar, Mutex};

/// Manually acquired/released mutual-exclusion token
#[derive(Debug, Default)]
pub struct CooperativeLock {
    held: Mutex<bool>,
    cond: Condvar,
}

impl CooperativeLock {
    /// Create an unheld lock
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the token is free, then take it
    pub fn acquire(&self) {
        let mut held = self.held.lock().unwrap();
        while *held {
            held = self.cond.wait(held).unwrap();
        }
        *held = true;
    }

    /// Hand the token back; no-op when not held
    pub fn release(&self) {
        let mut held = self.held.lock().unwrap();
        if *held {
            *held = false;
            self.cond.notify_one();
        }
    }

    /// Whether the token is currently taken
    pub fn is_held(&self) -> bool {
        *self.held.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_release_when_not_held_is_noop() {
        let lock = CooperativeLock::new();
        lock.release();
        assert!(!lock.is_held());

        lock.acquire();
        assert!(lock.is_held());
        lock.release();
        lock.release();
        assert!(!lock.is_held());
    }

    #[test]
    fn test_acquire_blocks_until_released() {
        let lock = Arc::new(CooperativeLock::new());
        lock.acquire();

        let contender = {
            let lock = Arc::clone(&lock);
            std::thread::spawn(move || {
                lock.acquire();
                lock.release();
            })
        };

        // Give the contender time to block on the held token
        std::thread::sleep(Duration::from_millis(20));
        assert!(!contender.is_finished());

        lock.release();
        contender.join().unwrap();
    }
}
