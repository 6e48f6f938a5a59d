use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use crate::error::StoreError;

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Sidecar lock path: `bridge_state.usda` → `bridge_state.usda.lock`.
pub fn lock_path_for(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

/// Scoped exclusive lock. The sidecar is removed when the guard drops,
/// including during unwinding.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path)
            && e.kind() != ErrorKind::NotFound
        {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release bridge lock");
        }
    }
}

/// Acquire the sidecar lock for `target`, waiting up to `timeout`.
///
/// A lock file whose mtime is older than `stale_after` is assumed to belong
/// to a writer that died inside its critical section and is reclaimed.
pub fn acquire_lock(
    target: &Path,
    timeout: Duration,
    stale_after: Duration,
) -> Result<LockGuard, StoreError> {
    let path = lock_path_for(target);
    let started = Instant::now();

    loop {
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let owner = format!("{} {}", std::process::id(), uuid::Uuid::new_v4().simple());
                if let Err(e) = writeln!(file, "{owner}") {
                    tracing::warn!(path = %path.display(), error = %e, "failed to record lock owner");
                }
                return Ok(LockGuard { path });
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if is_stale(&path, stale_after) && reclaim_stale(&path, stale_after) {
                    continue;
                }
            }
            Err(e) => return Err(StoreError::io("failed creating lock", &path, e)),
        }

        let waited = started.elapsed();
        if waited >= timeout {
            return Err(StoreError::LockTimeout { path, waited });
        }
        thread::sleep(LOCK_RETRY_INTERVAL.min(timeout - waited));
    }
}

/// Move a stale lock aside under a unique name, then judge staleness again on
/// the moved file. Two waiters can both see the same stale lock; the loser
/// of that race has moved the winner's fresh lock and must put it back.
///
/// Returns true when the lock path is free to retry.
fn reclaim_stale(path: &Path, stale_after: Duration) -> bool {
    let mut aside = path.as_os_str().to_os_string();
    aside.push(format!(".stale-{}", uuid::Uuid::new_v4().simple()));
    let aside = PathBuf::from(aside);

    if let Err(e) = fs::rename(path, &aside) {
        if e.kind() == ErrorKind::NotFound {
            return true;
        }
        tracing::warn!(path = %path.display(), error = %e, "failed to move stale bridge lock aside");
        return false;
    }

    if is_stale(&aside, stale_after) {
        tracing::warn!(path = %path.display(), "reclaimed stale bridge lock");
        remove_aside(&aside);
        return true;
    }

    // hard_link never replaces a lock another writer created meanwhile.
    if let Err(e) = fs::hard_link(&aside, path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to restore live bridge lock");
    }
    remove_aside(&aside);
    false
}

fn remove_aside(aside: &Path) {
    if let Err(e) = fs::remove_file(aside)
        && e.kind() != ErrorKind::NotFound
    {
        tracing::warn!(path = %aside.display(), error = %e, "failed to remove reclaimed lock");
    }
}

fn is_stale(path: &Path, stale_after: Duration) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|mtime| SystemTime::now().duration_since(mtime).ok())
        .is_some_and(|age| age > stale_after)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const LONG: Duration = Duration::from_secs(60);

    #[test]
    fn lock_path_appends_suffix() {
        let p = lock_path_for(Path::new("/tmp/bridge_state.usda"));
        assert_eq!(p, PathBuf::from("/tmp/bridge_state.usda.lock"));
    }

    #[test]
    fn guard_removes_sidecar_on_drop() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("doc.usda");

        let guard = acquire_lock(&target, Duration::from_millis(100), LONG).unwrap();
        assert!(guard.path().exists());
        let sidecar = guard.path().to_path_buf();
        drop(guard);
        assert!(!sidecar.exists());
    }

    #[test]
    fn second_acquire_times_out_while_held() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("doc.usda");

        let _held = acquire_lock(&target, Duration::from_millis(100), LONG).unwrap();
        let err = acquire_lock(&target, Duration::from_millis(50), LONG).unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout { .. }));
    }

    #[test]
    fn released_lock_can_be_reacquired() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("doc.usda");

        drop(acquire_lock(&target, Duration::from_millis(100), LONG).unwrap());
        assert!(acquire_lock(&target, Duration::from_millis(100), LONG).is_ok());
    }

    #[test]
    fn stale_lock_is_broken() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("doc.usda");
        fs::write(lock_path_for(&target), "12345").unwrap();
        thread::sleep(Duration::from_millis(20));

        let guard = acquire_lock(&target, Duration::from_millis(200), Duration::ZERO);
        assert!(guard.is_ok());
    }

    fn age(path: &Path, by: Duration) {
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - by).unwrap();
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn live_lock_moved_by_late_reclaimer_is_restored() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("doc.usda");
        let guard = acquire_lock(&target, Duration::from_millis(100), LONG).unwrap();
        let owner = fs::read_to_string(guard.path()).unwrap();

        // A waiter that judged the previous lock stale arrives after the
        // fresh one was created.
        assert!(!reclaim_stale(&lock_path_for(&target), LONG));

        assert_eq!(fs::read_to_string(guard.path()).unwrap(), owner);
        assert_eq!(dir_entries(tmp.path()), vec!["doc.usda.lock".to_string()]);
        let err = acquire_lock(&target, Duration::from_millis(30), LONG).unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout { .. }));
    }

    #[test]
    fn racing_reclaimers_never_share_the_lock() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("doc.usda");
        let sidecar = lock_path_for(&target);
        fs::write(&sidecar, "4242 crashed").unwrap();
        age(&sidecar, Duration::from_secs(120));

        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let (target, inside, peak) = (target.clone(), inside.clone(), peak.clone());
                thread::spawn(move || {
                    let _guard =
                        acquire_lock(&target, Duration::from_secs(10), Duration::from_secs(60))
                            .unwrap();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert!(dir_entries(tmp.path()).is_empty());
    }

    #[test]
    fn lock_is_released_when_holder_panics() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("doc.usda");
        let target_clone = target.clone();

        let result = std::panic::catch_unwind(move || {
            let _guard = acquire_lock(&target_clone, Duration::from_millis(100), LONG).unwrap();
            panic!("writer crashed");
        });
        assert!(result.is_err());
        assert!(!lock_path_for(&target).exists());
    }
}
