use crate::error::ConfigError;
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub bridge: BridgeConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    #[serde(default)]
    pub remote: RemoteConfig,
}

fn hostbridge_home() -> PathBuf {
    let home = UserDirs::new().map_or_else(|| PathBuf::from("."), |u| u.home_dir().to_path_buf());
    home.join(".hostbridge")
}

// ── Bridge directory / wire mode ──────────────────────────────────

/// Which wire format the orchestrator speaks to the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BridgeMode {
    /// Single structured `bridge_state.usda` document.
    #[default]
    Document,
    /// `state.json` / `answer.json` flat files.
    LegacyJson,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_bridge_dir")]
    pub dir: String,
    /// Root every caller-supplied bridge dir must resolve under.
    /// Falls back to the fixed per-user bridge location when unset, never
    /// to `dir` itself.
    #[serde(default)]
    pub allowed_root: Option<String>,
    #[serde(default)]
    pub mode: BridgeMode,
    #[serde(default = "default_answer_timeout_secs")]
    pub answer_timeout_secs: u64,
    #[serde(default = "default_ack_timeout_secs")]
    pub ack_timeout_secs: u64,
}

fn default_bridge_dir() -> String {
    "~/.hostbridge/bridge".into()
}

fn default_answer_timeout_secs() -> u64 {
    300
}

fn default_ack_timeout_secs() -> u64 {
    120
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            dir: default_bridge_dir(),
            allowed_root: None,
            mode: BridgeMode::default(),
            answer_timeout_secs: default_answer_timeout_secs(),
            ack_timeout_secs: default_ack_timeout_secs(),
        }
    }
}

impl BridgeConfig {
    pub fn dir_path(&self) -> PathBuf {
        expand_path(&self.dir)
    }

    pub fn allowed_root_path(&self) -> PathBuf {
        self.allowed_root
            .as_deref()
            .map_or_else(|| expand_path(&default_bridge_dir()), expand_path)
    }

    pub fn answer_timeout(&self) -> Duration {
        Duration::from_secs(self.answer_timeout_secs)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_secs)
    }
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

// ── Adaptive polling ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

fn default_min_interval_ms() -> u64 {
    50
}

fn default_max_interval_ms() -> u64 {
    500
}

fn default_backoff_factor() -> f64 {
    1.5
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

// ── Atomic store ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    #[serde(default = "default_read_retries")]
    pub read_retries: u32,
    #[serde(default = "default_read_backoff_ms")]
    pub read_backoff_ms: u64,
    /// A `.lock` sidecar older than this is treated as left behind by a
    /// crashed writer and removed.
    #[serde(default = "default_stale_lock_secs")]
    pub stale_lock_secs: u64,
}

fn default_lock_timeout_ms() -> u64 {
    5_000
}

fn default_read_retries() -> u32 {
    3
}

fn default_read_backoff_ms() -> u64 {
    50
}

fn default_stale_lock_secs() -> u64 {
    30
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
            read_retries: default_read_retries(),
            read_backoff_ms: default_read_backoff_ms(),
            stale_lock_secs: default_stale_lock_secs(),
        }
    }
}

// ── Heartbeat ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub interval_secs: u64,
    /// Peer counts as alive while its heartbeat is younger than
    /// `interval_secs * alive_multiple`.
    #[serde(default = "default_alive_multiple")]
    pub alive_multiple: u32,
}

fn default_true() -> bool {
    true
}

fn default_heartbeat_interval_secs() -> u64 {
    5
}

fn default_alive_multiple() -> u32 {
    3
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_heartbeat_interval_secs(),
            alive_multiple: default_alive_multiple(),
        }
    }
}

// ── Remote host ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_remote_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_recovery_timeout_secs")]
    pub recovery_timeout_secs: u64,
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: u64,
    #[serde(default = "default_result_timeout_secs")]
    pub result_timeout_secs: u64,
    #[serde(default)]
    pub script_dir: Option<String>,
}

fn default_remote_url() -> String {
    "http://localhost:30010".into()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_timeout_secs() -> u64 {
    30
}

fn default_max_response_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_result_timeout_secs() -> u64 {
    10
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_remote_url(),
            request_timeout_secs: default_request_timeout_secs(),
            failure_threshold: default_failure_threshold(),
            recovery_timeout_secs: default_recovery_timeout_secs(),
            max_response_bytes: default_max_response_bytes(),
            result_timeout_secs: default_result_timeout_secs(),
            script_dir: None,
        }
    }
}

impl RemoteConfig {
    pub fn script_dir_path(&self) -> PathBuf {
        self.script_dir.as_deref().map_or_else(
            || std::env::temp_dir().join("hostbridge_scripts"),
            expand_path,
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: hostbridge_home().join("config.toml"),
            bridge: BridgeConfig::default(),
            polling: PollingConfig::default(),
            store: StoreConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            remote: RemoteConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let polling = &self.polling;
        if polling.min_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "polling.min_interval_ms must be greater than zero".into(),
            ));
        }
        if polling.max_interval_ms < polling.min_interval_ms {
            return Err(ConfigError::Validation(format!(
                "polling.max_interval_ms ({}) is below min_interval_ms ({})",
                polling.max_interval_ms, polling.min_interval_ms
            )));
        }
        if !polling.backoff_factor.is_finite() || polling.backoff_factor <= 1.0 {
            return Err(ConfigError::Validation(format!(
                "polling.backoff_factor must be > 1.0, got {}",
                polling.backoff_factor
            )));
        }
        if self.store.read_retries == 0 {
            return Err(ConfigError::Validation(
                "store.read_retries must be at least 1".into(),
            ));
        }
        if self.remote.failure_threshold == 0 {
            return Err(ConfigError::Validation(
                "remote.failure_threshold must be at least 1".into(),
            ));
        }
        if self.heartbeat.interval_secs == 0 {
            return Err(ConfigError::Validation(
                "heartbeat.interval_secs must be greater than zero".into(),
            ));
        }
        url::Url::parse(&self.remote.base_url).map_err(|e| {
            ConfigError::Validation(format!(
                "remote.base_url '{}' is not a valid URL: {e}",
                self.remote.base_url
            ))
        })?;
        Ok(())
    }
}
