use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

pub(crate) fn lock_or_recover<'a, T>(lock: &'a Mutex<T>, context: &str) -> MutexGuard<'a, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            crate::log_debug(&format!("Mutex poisoned in {context}; recovering"));
            poisoned.into_inner()
        }
    }
}

/// Block on `cond` until notified, recovering the guard if another holder panicked.
pub(crate) fn wait_or_recover<'a, T>(
    cond: &Condvar,
    guard: MutexGuard<'a, T>,
    context: &str,
) -> MutexGuard<'a, T> {
    match cond.wait(guard) {
        Ok(guard) => guard,
        Err(poisoned) => {
            crate::log_debug(&format!("Mutex poisoned while waiting in {context}; recovering"));
            poisoned.into_inner()
        }
    }
}

/// Like [`wait_or_recover`] but gives up after `timeout`; the flag reports a timeout.
pub(crate) fn wait_timeout_or_recover<'a, T>(
    cond: &Condvar,
    guard: MutexGuard<'a, T>,
    timeout: Duration,
    context: &str,
) -> (MutexGuard<'a, T>, bool) {
    match cond.wait_timeout(guard, timeout) {
        Ok((guard, result)) => (guard, result.timed_out()),
        Err(poisoned) => {
            crate::log_debug(&format!("Mutex poisoned while waiting in {context}; recovering"));
            let (guard, result) = poisoned.into_inner();
            (guard, result.timed_out())
        }
    }
}
