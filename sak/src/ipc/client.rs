//! RPC client over a Unix domain socket
//!
//! One connection per request. Used by `sak call --socket` and by tests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use eyre::{Context, Result};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::debug;

use crate::tools::{ToolDefinition, ToolResult};

use super::get_socket_path;
use super::messages::{Request, RequestBody, Response, ResponseBody};

/// Timeout for connecting, writing and quick requests
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for waiting on a tool call's response
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(300);

/// Client for a running `sak serve --socket`
#[derive(Debug)]
pub struct RpcClient {
    socket_path: PathBuf,
    timeout: Duration,
    call_timeout: Duration,
    next_id: AtomicU64,
}

impl Default for RpcClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RpcClient {
    /// Client for the default socket path
    pub fn new() -> Self {
        Self::with_socket_path(get_socket_path())
    }

    pub fn with_socket_path(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            timeout: DEFAULT_TIMEOUT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn socket_exists(&self) -> bool {
        self.socket_path.exists()
    }

    /// Server version
    pub async fn ping(&self) -> Result<String> {
        debug!("RpcClient::ping: called");
        match self.send(RequestBody::Ping, self.timeout).await? {
            ResponseBody::Pong { version } => Ok(version),
            other => Err(unexpected(other)),
        }
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
        debug!("RpcClient::list_tools: called");
        match self.send(RequestBody::ListTools, self.timeout).await? {
            ResponseBody::Tools { tools } => Ok(tools),
            other => Err(unexpected(other)),
        }
    }

    pub async fn call_tool(&self, name: &str, arguments: Value, session: Option<String>) -> Result<ToolResult> {
        debug!(%name, ?session, "RpcClient::call_tool: called");
        let body = RequestBody::CallTool {
            name: name.to_string(),
            arguments,
            session,
        };
        match self.send(body, self.call_timeout).await? {
            ResponseBody::Result { content, is_error } => Ok(ToolResult { content, is_error }),
            other => Err(unexpected(other)),
        }
    }

    async fn send(&self, body: RequestBody, read_timeout: Duration) -> Result<ResponseBody> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = Request { id, body };
        debug!(?self.socket_path, ?request, "RpcClient::send: sending request");

        let mut stream = tokio::time::timeout(self.timeout, UnixStream::connect(&self.socket_path))
            .await
            .context("Connection timeout")?
            .context("Failed to connect to RPC socket")?;

        let json = serde_json::to_string(&request).context("Failed to serialize request")?;
        tokio::time::timeout(self.timeout, async {
            stream.write_all(json.as_bytes()).await.context("Failed to write request")?;
            stream.write_all(b"\n").await.context("Failed to write newline")?;
            stream.flush().await.context("Failed to flush stream")?;
            Ok::<_, eyre::Error>(())
        })
        .await
        .context("Write timeout")??;

        let mut reader = BufReader::new(&mut stream);
        let mut line = String::new();
        let bytes_read = tokio::time::timeout(read_timeout, reader.read_line(&mut line))
            .await
            .context("Read timeout")?
            .context("Failed to read response")?;
        if bytes_read == 0 {
            return Err(eyre::eyre!("Connection closed before a response arrived"));
        }

        let response: Response = serde_json::from_str(line.trim()).context("Failed to parse response")?;
        debug!(?response, "RpcClient::send: received response");

        if response.id != Some(id) {
            if let ResponseBody::Error { message } = response.body {
                return Err(eyre::eyre!("Server error: {}", message));
            }
            return Err(eyre::eyre!("Response id {:?} does not match request id {}", response.id, id));
        }

        match response.body {
            ResponseBody::Error { message } => Err(eyre::eyre!("Server error: {}", message)),
            body => Ok(body),
        }
    }
}

fn unexpected(body: ResponseBody) -> eyre::Error {
    eyre::eyre!("Unexpected response: {:?}", body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ScriptsConfig};
    use crate::ipc::server::RpcServer;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_client_default() {
        let client = RpcClient::default();
        assert!(client.socket_path.ends_with("sak.sock"));
    }

    #[test]
    fn test_client_with_timeouts() {
        let client = RpcClient::new()
            .with_timeout(Duration::from_secs(10))
            .with_call_timeout(Duration::from_secs(20));
        assert_eq!(client.timeout, Duration::from_secs(10));
        assert_eq!(client.call_timeout, Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_connect_to_missing_socket_fails() {
        let temp = TempDir::new().unwrap();
        let client = RpcClient::with_socket_path(temp.path().join("nonexistent.sock"));

        assert!(!client.socket_exists());
        assert!(client.ping().await.is_err());
    }

    #[tokio::test]
    async fn test_end_to_end_over_socket() {
        let temp = TempDir::new().unwrap();
        let scripts = temp.path().join("scripts");
        fs::create_dir(&scripts).unwrap();
        fs::write(scripts.join("greet.sak.py"), "\"\"\"Greets.\"\"\"\nprintf \"hello $1\"\n").unwrap();
        let socket_path = temp.path().join("sak.sock");

        let config = Config {
            scripts: ScriptsConfig {
                dir: scripts,
                interpreter: "sh".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        let server = RpcServer::from_config(&config);
        let path = socket_path.clone();
        let serving = tokio::spawn(async move { server.serve_socket(&path).await });

        let client = RpcClient::with_socket_path(socket_path.clone());
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !client.socket_exists() && std::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(client.ping().await.unwrap(), env!("CARGO_PKG_VERSION"));

        let tools = client.list_tools().await.unwrap();
        assert_eq!(tools[0].name, "swiss-army-knife");

        let result = client
            .call_tool("swiss-army-knife", json!({ "command": "greet", "args": ["bob"] }), None)
            .await
            .unwrap();
        assert_eq!(result, ToolResult::success("hello bob"));

        let result = client
            .call_tool("missing-tool", json!({}), None)
            .await
            .unwrap();
        assert!(result.is_error);

        serving.abort();
    }
}
