//! Shared helpers for unit tests that touch process-wide state.

use std::sync::{Mutex, MutexGuard, OnceLock};

pub(crate) fn env_lock() -> MutexGuard<'static, ()> {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn set_env(key: &str, value: &str) {
    unsafe {
        std::env::set_var(key, value);
    }
}

pub(crate) fn remove_env(key: &str) {
    unsafe {
        std::env::remove_var(key);
    }
}
