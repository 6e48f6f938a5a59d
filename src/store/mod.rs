//! Crash-safe persistence for the shared bridge files.
//!
//! Writers stage into a `.tmp` sibling and rename over the target while
//! holding a `.lock` sidecar; readers never take the lock and instead retry
//! briefly when the platform denies access mid-rename.

mod atomic;
mod lock;

pub use atomic::{AtomicStore, ReadOutcome};
pub use lock::{LockGuard, acquire_lock, lock_path_for};
