use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::error::ServiceError;

// ── Shell quoting ─────────────────────────────────────────────────────────────

/// Quote `value` as one POSIX shell word. Safe for any input without NUL.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

// ── Service interface ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SandboxHandle {
    #[serde(rename = "sandboxId")]
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ShellOutput {
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default, rename = "exitCode")]
    pub exit_code: i32,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CodeOutput {
    #[serde(default)]
    pub stdout: Vec<String>,
    #[serde(default)]
    pub stderr: Vec<String>,
    #[serde(default)]
    pub results: Vec<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// A hosted code-execution sandbox.
#[async_trait]
pub trait SandboxService: Send + Sync {
    async fn create_sandbox(&self) -> Result<SandboxHandle, ServiceError>;
    async fn run_shell(&self, handle: &SandboxHandle, command: &str) -> Result<ShellOutput, ServiceError>;
    async fn run_code(&self, handle: &SandboxHandle, code: &str, language: &str) -> Result<CodeOutput, ServiceError>;
}

// ── HTTP client ───────────────────────────────────────────────────────────────

pub struct HttpSandbox {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpSandbox {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, ServiceError> {
        let client = Client::builder().timeout(Duration::from_secs(120)).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
        })
    }

    async fn post<T: for<'de> Deserialize<'de>>(&self, path: &str, body: Value) -> Result<T, ServiceError> {
        let url = format!("{}{path}", self.base_url);
        debug!(%url, "sandbox request");
        let resp = self
            .client
            .post(&url)
            .header("X-API-Key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ServiceError::Auth("sandbox rejected the API key".to_string()));
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ServiceError::Failed(format!("sandbox returned {status}: {}", text.trim())));
        }
        let text = resp.text().await?;
        serde_json::from_str(&text).map_err(|e| ServiceError::Response(format!("{e}: {text}")))
    }
}

#[async_trait]
impl SandboxService for HttpSandbox {
    async fn create_sandbox(&self) -> Result<SandboxHandle, ServiceError> {
        self.post("/sandboxes", json!({})).await
    }

    async fn run_shell(&self, handle: &SandboxHandle, command: &str) -> Result<ShellOutput, ServiceError> {
        self.post(&format!("/sandboxes/{}/commands", handle.id), json!({ "cmd": command }))
            .await
    }

    async fn run_code(&self, handle: &SandboxHandle, code: &str, language: &str) -> Result<CodeOutput, ServiceError> {
        self.post(
            &format!("/sandboxes/{}/code", handle.id),
            json!({ "code": code, "language": language }),
        )
        .await
    }
}
