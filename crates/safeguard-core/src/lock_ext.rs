//! Poison-tolerant locking for the session state.

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub(crate) trait MutexExt<T> {
    /// Acquire the lock, recovering the data if a previous holder panicked.
    fn lock_or_recover(&self) -> MutexGuard<'_, T>;
}

impl<T> MutexExt<T> for Mutex<T> {
    #[track_caller]
    fn lock_or_recover(&self) -> MutexGuard<'_, T> {
        let loc = std::panic::Location::caller();
        self.lock().unwrap_or_else(|poisoned| {
            log_poisoned::<T>(loc);
            poisoned.into_inner()
        })
    }
}

pub(crate) trait RwLockExt<T> {
    fn read_or_recover(&self) -> RwLockReadGuard<'_, T>;
    fn write_or_recover(&self) -> RwLockWriteGuard<'_, T>;
}

impl<T> RwLockExt<T> for RwLock<T> {
    #[track_caller]
    fn read_or_recover(&self) -> RwLockReadGuard<'_, T> {
        let loc = std::panic::Location::caller();
        self.read().unwrap_or_else(|poisoned| {
            log_poisoned::<T>(loc);
            poisoned.into_inner()
        })
    }

    #[track_caller]
    fn write_or_recover(&self) -> RwLockWriteGuard<'_, T> {
        let loc = std::panic::Location::caller();
        self.write().unwrap_or_else(|poisoned| {
            log_poisoned::<T>(loc);
            poisoned.into_inner()
        })
    }
}

fn log_poisoned<T>(loc: &std::panic::Location<'static>) {
    tracing::error!(
        lock_type = std::any::type_name::<T>(),
        file = loc.file(),
        line = loc.line(),
        "Lock poisoned by a panicking holder; recovered data may be inconsistent"
    );
}
