//! Bounded-wait locking for `std::sync::Mutex`.
//!
//! FreeRTOS semaphores take a tick budget; the std mutex does not, so the
//! shared bus and the measurement record poll `try_lock` until a deadline.

use std::sync::{Mutex, MutexGuard, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_micros(200);

/// Acquire `mutex` within `timeout`, or return `None`.
///
/// A poisoned lock is recovered: the guarded data is plain state whose
/// invariants are restored by the next successful operation.
pub fn lock_within<T>(mutex: &Mutex<T>, timeout: Duration) -> Option<MutexGuard<'_, T>> {
    let deadline = Instant::now() + timeout;
    loop {
        match mutex.try_lock() {
            Ok(guard) => return Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => return Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => {}
        }
        if Instant::now() >= deadline {
            return None;
        }
        thread::sleep(POLL_INTERVAL);
    }
}
