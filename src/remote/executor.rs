use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::{PollingConfig, RemoteConfig};
use crate::error::RemoteError;
use crate::observability::{Metrics, MetricsSnapshot};
use crate::poll::AdaptivePoller;

use super::breaker::{CircuitBreaker, CircuitState};
use super::client::RemoteClient;
use super::script::{RawResult, ScriptOutput, parse_result, wrap_code};

const LATENCY_KEY: &str = "execute_script";

/// Request script and result file for one execution. Both are deleted when
/// this drops, whatever path the execution took.
struct Artifacts {
    script: PathBuf,
    result: PathBuf,
}

impl Artifacts {
    fn allocate(dir: &Path) -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let id = &id[..12];
        Self {
            script: dir.join(format!("cmd_{id}.py")),
            result: dir.join(format!("result_{id}.json")),
        }
    }
}

impl Drop for Artifacts {
    fn drop(&mut self) {
        for path in [&self.script, &self.result] {
            if let Err(e) = fs::remove_file(path)
                && e.kind() != ErrorKind::NotFound
            {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove script artifact");
            }
        }
    }
}

/// One request admitted by the breaker. Dropped before `settle`, meaning the
/// caller cancelled mid-flight, it hands the half-open slot back.
struct Admission<'a> {
    breaker: &'a Mutex<CircuitBreaker>,
    settled: bool,
}

impl Admission<'_> {
    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .release_half_open();
        }
    }
}

fn host_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoteHealth {
    pub base_url: String,
    pub connected: bool,
    pub circuit_state: CircuitState,
    pub consecutive_failures: u32,
    pub metrics: MetricsSnapshot,
}

/// Runs code on the remote host behind a circuit breaker.
pub struct RemoteExecutor {
    client: RemoteClient,
    breaker: Mutex<CircuitBreaker>,
    metrics: Arc<Metrics>,
    poller: AdaptivePoller,
    script_dir: PathBuf,
    result_timeout: Duration,
    max_response_bytes: u64,
}

impl RemoteExecutor {
    pub fn new(config: &RemoteConfig, polling: &PollingConfig) -> Self {
        Self {
            client: RemoteClient::from_config(config),
            breaker: Mutex::new(CircuitBreaker::new(
                config.failure_threshold,
                Duration::from_secs(config.recovery_timeout_secs),
            )),
            metrics: Arc::new(Metrics::new()),
            poller: AdaptivePoller::from_config(polling),
            script_dir: config.script_dir_path(),
            result_timeout: Duration::from_secs(config.result_timeout_secs),
            max_response_bytes: config.max_response_bytes,
        }
    }

    #[must_use]
    pub fn with_result_timeout(mut self, timeout: Duration) -> Self {
        self.result_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_script_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.script_dir = dir.into();
        self
    }

    pub fn client(&self) -> &RemoteClient {
        &self.client
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    fn breaker(&self) -> MutexGuard<'_, CircuitBreaker> {
        // A poisoned breaker still holds consistent counters.
        self.breaker
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker().state()
    }

    /// Probe `/remote/info`, feeding the outcome into the breaker.
    pub async fn check_connection(&self) -> bool {
        let connected = self.client.is_connected().await;
        let mut breaker = self.breaker();
        if connected {
            breaker.record_success();
        } else {
            breaker.record_failure();
        }
        connected
    }

    pub async fn health(&self) -> RemoteHealth {
        let connected = self.check_connection().await;
        let (circuit_state, consecutive_failures) = {
            let mut breaker = self.breaker();
            (breaker.state(), breaker.failure_count())
        };
        RemoteHealth {
            base_url: self.client.base_url().to_string(),
            connected,
            circuit_state,
            consecutive_failures,
            metrics: self.metrics.snapshot(),
        }
    }

    /// Write `code` to a script file, have the host execute it, and wait for
    /// its result file.
    pub async fn execute_script(&self, code: &str) -> Result<ScriptOutput, RemoteError> {
        self.metrics.inc("requests.total");
        let admission = {
            let mut breaker = self.breaker();
            if !breaker.allow_request() {
                self.metrics.inc("requests.circuit_breaker_rejected");
                return Err(breaker.rejection());
            }
            Admission {
                breaker: &self.breaker,
                settled: false,
            }
        };

        let started = Instant::now();
        let outcome = self.run(code).await;
        self.metrics.record_latency(LATENCY_KEY, started.elapsed());
        admission.settle();

        let mut breaker = self.breaker();
        match &outcome {
            Ok(_) => {
                breaker.record_success();
                self.metrics.inc("requests.success");
            }
            // The host answered; the circuit only tracks reachability.
            Err(RemoteError::Status { .. } | RemoteError::Decode(_)) => {
                breaker.record_success();
                self.metrics.inc("requests.error");
            }
            Err(e) => {
                breaker.record_failure();
                self.metrics.inc("requests.error");
                tracing::error!(error = %e, hint = e.hint(), "remote execution failed");
            }
        }
        outcome
    }

    async fn run(&self, code: &str) -> Result<ScriptOutput, RemoteError> {
        tokio::fs::create_dir_all(&self.script_dir)
            .await
            .map_err(|source| RemoteError::Artifact {
                path: self.script_dir.clone(),
                source,
            })?;

        let artifacts = Artifacts::allocate(&self.script_dir);
        let wrapped = wrap_code(code, &host_path(&artifacts.result));
        tokio::fs::write(&artifacts.script, wrapped)
            .await
            .map_err(|source| RemoteError::Artifact {
                path: artifacts.script.clone(),
                source,
            })?;

        self.client
            .run_console_script(&host_path(&artifacts.script))
            .await?;

        let limit = self.max_response_bytes;
        let result_path = artifacts.result.clone();
        let raw = self
            .poller
            .poll_until(self.result_timeout, || read_result(&result_path, limit))
            .await
            .ok_or(RemoteError::ResultTimeout {
                after: self.result_timeout,
            })??;

        drop(artifacts);
        Ok(parse_result(raw))
    }
}

/// One poll attempt. `None` keeps polling: the file is missing or still being
/// written by the host.
fn read_result(path: &Path, limit: u64) -> Option<Result<RawResult, RemoteError>> {
    let size = fs::metadata(path).ok()?.len();
    if size > limit {
        return Some(Err(RemoteError::ResponseTooLarge { size, limit }));
    }
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "result file not readable yet");
            return None;
        }
    };
    match serde_json::from_str(&text) {
        Ok(raw) => Some(Ok(raw)),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "result file incomplete");
            None
        }
    }
}
