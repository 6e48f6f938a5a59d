use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::{Value, json};

use crate::config::RemoteConfig;
use crate::error::RemoteError;

pub const CONSOLE_OBJECT_PATH: &str = "/Script/Engine.Default__KismetSystemLibrary";
pub const CONSOLE_FUNCTION: &str = "ExecuteConsoleCommand";

fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .pool_max_idle_per_host(5)
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Thin wrapper over the host's remote-control HTTP API.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    http: Client,
    base_url: String,
}

impl RemoteClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            http: build_client(timeout),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &RemoteConfig) -> Self {
        Self::new(
            &config.base_url,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// `GET /remote/info`
    pub async fn info(&self) -> Result<Value, RemoteError> {
        let response = self
            .http
            .get(self.url("/remote/info"))
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    /// Liveness probe; any failure counts as "not connected".
    pub async fn is_connected(&self) -> bool {
        self.info().await.is_ok()
    }

    pub async fn get_property(
        &self,
        object_path: &str,
        property_name: &str,
    ) -> Result<Value, RemoteError> {
        self.put(
            "/remote/object/property",
            &json!({
                "objectPath": object_path,
                "propertyName": property_name,
                "access": "READ_ACCESS",
            }),
        )
        .await
    }

    /// Non-object values are wrapped as `{"value": ..}`.
    pub async fn set_property(
        &self,
        object_path: &str,
        property_name: &str,
        value: Value,
    ) -> Result<Value, RemoteError> {
        let property_value = if value.is_object() {
            value
        } else {
            json!({ "value": value })
        };
        self.put(
            "/remote/object/property",
            &json!({
                "objectPath": object_path,
                "propertyName": property_name,
                "propertyValue": property_value,
                "access": "WRITE_ACCESS",
            }),
        )
        .await
    }

    pub async fn call_function(
        &self,
        object_path: &str,
        function_name: &str,
        parameters: Option<Value>,
    ) -> Result<Value, RemoteError> {
        let mut payload = json!({
            "objectPath": object_path,
            "functionName": function_name,
        });
        if let Some(parameters) = parameters {
            payload["parameters"] = parameters;
        }
        self.put("/remote/object/call", &payload).await
    }

    /// Ask the host to run a script file through its console.
    pub async fn run_console_script(&self, script_path: &str) -> Result<Value, RemoteError> {
        self.call_function(
            CONSOLE_OBJECT_PATH,
            CONSOLE_FUNCTION,
            Some(json!({
                "WorldContextObject": "",
                "Command": format!("py {script_path}"),
            })),
        )
        .await
    }

    async fn put(&self, path: &str, body: &Value) -> Result<Value, RemoteError> {
        let response = self
            .http
            .put(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }
}

fn transport(err: reqwest::Error) -> RemoteError {
    RemoteError::Transport {
        message: err.to_string(),
    }
}

async fn decode(response: reqwest::Response) -> Result<Value, RemoteError> {
    let status = response.status();
    let body = response.text().await.map_err(transport)?;
    if !status.is_success() {
        return Err(RemoteError::Status {
            status: status.as_u16(),
            body: truncate(&body, 512),
        });
    }
    if body.trim().is_empty() || status == StatusCode::NO_CONTENT {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).map_err(|e| RemoteError::Decode(e.to_string()))
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn info_returns_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/remote/info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"HttpRoutes": []})))
            .mount(&server)
            .await;

        let client = RemoteClient::new(&server.uri(), Duration::from_secs(2));
        let info = client.info().await.unwrap();
        assert!(info.get("HttpRoutes").is_some());
        assert!(client.is_connected().await);
    }

    #[tokio::test]
    async fn get_property_sends_read_access() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/remote/object/property"))
            .and(body_partial_json(json!({
                "objectPath": "/Game/Map.Map:PersistentLevel.Light",
                "propertyName": "Intensity",
                "access": "READ_ACCESS",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Intensity": 3.0})))
            .expect(1)
            .mount(&server)
            .await;

        let client = RemoteClient::new(&server.uri(), Duration::from_secs(2));
        let value = client
            .get_property("/Game/Map.Map:PersistentLevel.Light", "Intensity")
            .await
            .unwrap();
        assert_eq!(value["Intensity"], 3.0);
    }

    #[tokio::test]
    async fn set_property_wraps_scalars() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/remote/object/property"))
            .and(body_partial_json(json!({
                "propertyValue": {"value": 5},
                "access": "WRITE_ACCESS",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = RemoteClient::new(&server.uri(), Duration::from_secs(2));
        let value = client.set_property("/Game/X", "Count", json!(5)).await.unwrap();
        assert!(value.is_null());
    }

    #[tokio::test]
    async fn console_script_payload() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/remote/object/call"))
            .and(body_partial_json(json!({
                "objectPath": CONSOLE_OBJECT_PATH,
                "functionName": CONSOLE_FUNCTION,
                "parameters": {"WorldContextObject": "", "Command": "py /tmp/cmd_x.py"},
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let client = RemoteClient::new(&server.uri(), Duration::from_secs(2));
        client.run_console_script("/tmp/cmd_x.py").await.unwrap();
    }

    #[tokio::test]
    async fn error_status_is_structured() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad object path"))
            .mount(&server)
            .await;

        let client = RemoteClient::new(&server.uri(), Duration::from_secs(2));
        let err = client.call_function("/x", "Y", None).await.unwrap_err();
        match err {
            RemoteError::Status { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("bad object path"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_host_is_transport_error() {
        // Port 9 (discard) is closed on test machines.
        let client = RemoteClient::new("http://127.0.0.1:9", Duration::from_millis(500));
        assert!(matches!(
            client.info().await,
            Err(RemoteError::Transport { .. })
        ));
        assert!(!client.is_connected().await);
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = RemoteClient::new("http://localhost:30010/", Duration::from_secs(1));
        assert_eq!(client.url("/remote/info"), "http://localhost:30010/remote/info");
    }
}
