use std::ffi::OsString;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::Config;

/// Every variable `Config::apply_env_overrides` reads.
pub(super) const OVERRIDE_VARS: [&str; 5] = [
    "HOSTBRIDGE_DIR",
    "HOSTBRIDGE_MODE",
    "HOSTBRIDGE_REMOTE_URL",
    "UE_REMOTE_URL",
    "HOSTBRIDGE_ANSWER_TIMEOUT",
];

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Process environment with all override variables cleared, held under a
/// global lock. Saved values are put back on drop.
pub(super) struct OverrideEnv {
    saved: Vec<(&'static str, Option<OsString>)>,
    _lock: MutexGuard<'static, ()>,
}

impl OverrideEnv {
    pub(super) fn clean() -> Self {
        let lock = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let saved = OVERRIDE_VARS
            .iter()
            .map(|key| (*key, std::env::var_os(key)))
            .collect();
        for key in OVERRIDE_VARS {
            // SAFETY: ENV_LOCK is held for the lifetime of this value.
            unsafe {
                std::env::remove_var(key);
            }
        }
        Self { saved, _lock: lock }
    }

    pub(super) fn set(&mut self, key: &'static str, value: &str) -> &mut Self {
        assert!(OVERRIDE_VARS.contains(&key), "{key} is not a hostbridge override");
        // SAFETY: ENV_LOCK is held for the lifetime of this value.
        unsafe {
            std::env::set_var(key, value);
        }
        self
    }

    /// Defaults with the current overrides applied.
    pub(super) fn config(&self) -> Config {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }
}

impl Drop for OverrideEnv {
    fn drop(&mut self) {
        for (key, previous) in self.saved.drain(..) {
            // SAFETY: the lock field is released only after this body runs.
            unsafe {
                match previous {
                    Some(value) => std::env::set_var(key, value),
                    None => std::env::remove_var(key),
                }
            }
        }
    }
}
