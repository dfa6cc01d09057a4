use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

// Guarded state is only mutated by complete, panic-free steps, so a poisoned
// lock still holds consistent data.

pub(crate) fn read<'a, T>(lock: &'a RwLock<T>, what: &str) -> RwLockReadGuard<'a, T> {
    match lock.read() {
        Ok(g) => g,
        Err(poisoned) => {
            tracing::warn!(lock = what, "read lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

pub(crate) fn write<'a, T>(lock: &'a RwLock<T>, what: &str) -> RwLockWriteGuard<'a, T> {
    match lock.write() {
        Ok(g) => g,
        Err(poisoned) => {
            tracing::warn!(lock = what, "write lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}
