#![allow(dead_code)]

use std::path::{Path, PathBuf};

use hostbridge::config::{BridgeMode, Config};
use hostbridge::store::AtomicStore;
use tempfile::TempDir;

/// Config rooted in a temp dir, with fast polling and no heartbeat.
pub fn fast_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.bridge.dir = root.join("bridge").display().to_string();
    config.bridge.allowed_root = Some(root.display().to_string());
    config.bridge.ack_timeout_secs = 3;
    config.bridge.answer_timeout_secs = 10;
    config.heartbeat.enabled = false;
    config.polling.min_interval_ms = 5;
    config.polling.max_interval_ms = 25;
    config
}

pub struct BridgeFixture {
    pub tmp: TempDir,
    pub config: Config,
}

impl BridgeFixture {
    pub fn new() -> Self {
        let tmp = TempDir::new().expect("temp dir");
        let config = fast_config(tmp.path());
        Self { tmp, config }
    }

    pub fn with_mode(mut self, mode: BridgeMode) -> Self {
        self.config.bridge.mode = mode;
        self
    }

    pub fn bridge_dir(&self) -> PathBuf {
        let dir = self.tmp.path().join("bridge");
        std::fs::create_dir_all(&dir).expect("bridge dir");
        dir
    }

    pub fn store(&self) -> AtomicStore {
        AtomicStore::from_config(&self.config.store)
    }
}
