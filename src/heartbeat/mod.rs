//! Liveness file rewritten on a fixed interval while a session runs.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::HeartbeatConfig;
use crate::document::BRIDGE_VERSION;
use crate::error::StoreError;
use crate::store::AtomicStore;

pub const HEARTBEAT_FILE: &str = "heartbeat.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatRecord {
    pub timestamp: String,
    pub pid: u32,
    #[serde(alias = "bridge_version")]
    pub version: String,
    pub alive: bool,
}

impl HeartbeatRecord {
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            pid: std::process::id(),
            version: BRIDGE_VERSION.into(),
            alive: true,
        }
    }
}

pub fn write_heartbeat(store: &AtomicStore, path: &Path) -> Result<(), StoreError> {
    let record = HeartbeatRecord::now();
    let json = serde_json::to_string(&record).map_err(|e| {
        StoreError::io("failed encoding heartbeat for", path, std::io::Error::other(e))
    })?;
    store.write(path, &json)
}

/// Whether the heartbeat at `path` was modified within
/// `interval * alive_multiple`.
pub fn is_peer_alive(path: &Path, config: &HeartbeatConfig) -> bool {
    let window = Duration::from_secs(config.interval_secs) * config.alive_multiple;
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|mtime| SystemTime::now().duration_since(mtime).ok())
        .is_some_and(|age| age <= window)
}

/// Running heartbeat task.
pub struct HeartbeatHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
    path: PathBuf,
}

impl HeartbeatHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Signal the task and wait for it to finish its current cycle.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "heartbeat task ended abnormally");
        }
    }
}

/// Spawn the writer. Failed writes are logged and the cycle is skipped; the
/// task never returns an error.
pub fn spawn_heartbeat(store: AtomicStore, path: PathBuf, interval: Duration) -> HeartbeatHandle {
    let token = CancellationToken::new();
    let child = token.child_token();
    let task_path = path.clone();

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = child.cancelled() => break,
                _ = ticker.tick() => {
                    let (store, path) = (store.clone(), task_path.clone());
                    match tokio::task::spawn_blocking(move || write_heartbeat(&store, &path)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            tracing::warn!(path = %task_path.display(), error = %e, "heartbeat write skipped");
                        }
                        Err(e) => tracing::warn!(error = %e, "heartbeat write did not complete"),
                    }
                }
            }
        }
        tracing::debug!(path = %task_path.display(), "heartbeat stopped");
    });

    HeartbeatHandle { token, task, path }
}
