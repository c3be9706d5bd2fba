//! Lock helpers shared by the concurrent parts of the farm.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock `mutex`, recovering the data if a panicking thread poisoned it.
///
/// Every guarded structure here stays consistent between statements, so a
/// panic elsewhere must not wedge the scheduler.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
