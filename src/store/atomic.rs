use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::config::StoreConfig;
use crate::error::StoreError;

use super::lock::acquire_lock;

/// Result of a tolerant read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Content(String),
    /// The file does not exist.
    Absent,
    /// The file exists but stayed inaccessible for every retry.
    Unavailable,
}

impl ReadOutcome {
    pub fn content(self) -> Option<String> {
        match self {
            Self::Content(text) => Some(text),
            Self::Absent | Self::Unavailable => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AtomicStore {
    lock_timeout: Duration,
    stale_lock_after: Duration,
    read_retries: u32,
    read_backoff: Duration,
}

impl Default for AtomicStore {
    fn default() -> Self {
        Self::from_config(&StoreConfig::default())
    }
}

impl AtomicStore {
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            lock_timeout: Duration::from_millis(config.lock_timeout_ms),
            stale_lock_after: Duration::from_secs(config.stale_lock_secs),
            read_retries: config.read_retries.max(1),
            read_backoff: Duration::from_millis(config.read_backoff_ms),
        }
    }

    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Replace `path` with `content` under the sidecar lock.
    pub fn write(&self, path: &Path, content: &str) -> Result<(), StoreError> {
        let _guard = acquire_lock(path, self.lock_timeout, self.stale_lock_after)?;
        write_staged(path, content)
    }

    /// Read-modify-write under a single lock acquisition.
    ///
    /// `mutate` receives the current text (`None` when absent) and returns the
    /// replacement text plus a value handed back to the caller. The read
    /// inside the critical section is attempted once.
    pub fn update<T, E>(
        &self,
        path: &Path,
        mutate: impl FnOnce(Option<&str>) -> Result<(String, T), E>,
    ) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let _guard = acquire_lock(path, self.lock_timeout, self.stale_lock_after)?;
        let current = match fs::read_to_string(path) {
            Ok(text) => Some(text),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(StoreError::io("failed reading", path, e).into()),
        };
        let (next, value) = mutate(current.as_deref())?;
        write_staged(path, &next)?;
        Ok(value)
    }

    /// Lock-free read with bounded exponential backoff on access errors.
    pub fn read(&self, path: &Path) -> ReadOutcome {
        let mut delay = self.read_backoff;
        for attempt in 1..=self.read_retries {
            match fs::read_to_string(path) {
                Ok(text) => return ReadOutcome::Content(text),
                Err(e) if e.kind() == ErrorKind::NotFound => return ReadOutcome::Absent,
                Err(e) => {
                    tracing::debug!(
                        path = %path.display(),
                        attempt,
                        error = %e,
                        "bridge file busy, retrying"
                    );
                    if attempt < self.read_retries {
                        thread::sleep(delay);
                        delay = delay.saturating_mul(2);
                    }
                }
            }
        }
        ReadOutcome::Unavailable
    }

    /// Delete `path` if present.
    pub fn remove(&self, path: &Path) -> Result<bool, StoreError> {
        let _guard = acquire_lock(path, self.lock_timeout, self.stale_lock_after)?;
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io("failed removing", path, e)),
        }
    }
}

fn staging_path_for(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

fn write_staged(path: &Path, content: &str) -> Result<(), StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .map_err(|e| StoreError::io("failed creating parent of", path, e))?;
    }

    let temp_path = staging_path_for(path);
    let staged = File::create(&temp_path)
        .and_then(|mut file| {
            file.write_all(content.as_bytes())?;
            file.sync_all()
        })
        .map_err(|e| StoreError::io("failed writing staging file", &temp_path, e));
    if let Err(e) = staged {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    if let Err(rename_error) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(StoreError::io("failed replacing", path, rename_error));
    }
    Ok(())
}
