use std::path::Path;
use std::time::Duration;

use hostbridge::config::{PollingConfig, RemoteConfig};
use hostbridge::error::RemoteError;
use hostbridge::remote::{CircuitState, RemoteExecutor};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Plays the host: reads the script named in the console command, finds its
/// result path and writes `result` there.
struct FakeHost {
    result: String,
}

impl Respond for FakeHost {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        let command = body["parameters"]["Command"].as_str().unwrap();
        let script_path = command.trim_start_matches("py ");
        let script = std::fs::read_to_string(script_path).unwrap();
        let start = script.find("with open(\"").unwrap() + "with open(\"".len();
        let end = start + script[start..].find('"').unwrap();
        std::fs::write(Path::new(&script[start..end]), &self.result).unwrap();
        ResponseTemplate::new(200).set_body_json(json!({"ReturnValue": ""}))
    }
}

fn config(server: &MockServer, threshold: u32) -> RemoteConfig {
    RemoteConfig {
        base_url: server.uri(),
        request_timeout_secs: 2,
        failure_threshold: threshold,
        recovery_timeout_secs: 60,
        max_response_bytes: 4096,
        result_timeout_secs: 1,
        script_dir: None,
    }
}

fn polling() -> PollingConfig {
    PollingConfig {
        min_interval_ms: 5,
        max_interval_ms: 20,
        backoff_factor: 1.5,
    }
}

fn script_files(dir: &Path) -> usize {
    std::fs::read_dir(dir).map_or(0, |entries| entries.count())
}

#[tokio::test]
async fn script_result_is_parsed_and_artifacts_removed() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/remote/object/call"))
        .respond_with(FakeHost {
            result: json!({"output": "hello\nRESULT:{\"actors\": 3}\n", "error": null}).to_string(),
        })
        .mount(&server)
        .await;

    let tmp = TempDir::new().unwrap();
    let executor = RemoteExecutor::new(&config(&server, 3), &polling()).with_script_dir(tmp.path());
    let output = executor.execute_script("print('hello')").await.unwrap();

    assert_eq!(output.result, Some(json!({"actors": 3})));
    assert_eq!(output.output, "hello");
    assert!(output.error.is_none());
    assert_eq!(script_files(tmp.path()), 0);
    assert_eq!(executor.metrics().counter("requests.success"), 1);
    assert_eq!(executor.circuit_state(), CircuitState::Closed);
}

#[tokio::test]
async fn oversized_result_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(FakeHost {
            result: json!({"output": "x".repeat(8192), "error": null}).to_string(),
        })
        .mount(&server)
        .await;

    let tmp = TempDir::new().unwrap();
    let executor = RemoteExecutor::new(&config(&server, 3), &polling()).with_script_dir(tmp.path());
    let err = executor.execute_script("big()").await.unwrap_err();

    assert!(matches!(err, RemoteError::ResponseTooLarge { limit: 4096, .. }));
    assert!(err.hint().contains("reduce script output"));
    assert_eq!(script_files(tmp.path()), 0);
}

#[tokio::test]
async fn missing_result_times_out_and_trips_breaker() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let tmp = TempDir::new().unwrap();
    let executor = RemoteExecutor::new(&config(&server, 2), &polling())
        .with_script_dir(tmp.path())
        .with_result_timeout(Duration::from_millis(50));

    for _ in 0..2 {
        let err = executor.execute_script("pass").await.unwrap_err();
        assert!(matches!(err, RemoteError::ResultTimeout { .. }));
    }
    assert_eq!(executor.circuit_state(), CircuitState::Open);

    let err = executor.execute_script("pass").await.unwrap_err();
    assert!(matches!(err, RemoteError::CircuitOpen { failures: 2, .. }));
    assert!(err.retry_after().is_some());
    assert_eq!(
        executor.metrics().counter("requests.circuit_breaker_rejected"),
        1
    );
    assert_eq!(script_files(tmp.path()), 0);
}

#[tokio::test]
async fn unreachable_host_is_a_transport_failure() {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let uri = format!("http://127.0.0.1:{port}");

    let tmp = TempDir::new().unwrap();
    let mut remote = RemoteConfig {
        base_url: uri,
        ..RemoteConfig::default()
    };
    remote.request_timeout_secs = 1;
    remote.failure_threshold = 1;
    let executor = RemoteExecutor::new(&remote, &polling()).with_script_dir(tmp.path());

    let err = executor.execute_script("pass").await.unwrap_err();
    assert!(matches!(err, RemoteError::Transport { .. }));
    assert_eq!(executor.circuit_state(), CircuitState::Open);

    let health = executor.health().await;
    assert!(!health.connected);
    assert_eq!(health.metrics.counters["requests.error"], 1);
}

#[tokio::test]
async fn host_error_status_does_not_open_circuit() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(400).set_body_string("no such object"))
        .mount(&server)
        .await;

    let tmp = TempDir::new().unwrap();
    let executor = RemoteExecutor::new(&config(&server, 1), &polling()).with_script_dir(tmp.path());
    let err = executor.execute_script("pass").await.unwrap_err();

    assert!(matches!(err, RemoteError::Status { status: 400, .. }));
    assert_eq!(executor.circuit_state(), CircuitState::Closed);
}
