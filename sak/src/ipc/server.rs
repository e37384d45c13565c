//! RPC server
//!
//! Reads bounded request lines, runs each request on its own task and funnels
//! responses through a single writer task.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use eyre::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::scripts::ProcessSession;
use crate::tools::{ToolCall, ToolContext, ToolExecutor};

use super::messages::{Request, RequestBody, Response, ResponseBody};

/// One frame off the wire
#[derive(Debug, PartialEq)]
enum Frame {
    Line(Vec<u8>),
    /// Line exceeded the limit; holds its length
    Oversized(usize),
}

/// Hosts a `ToolExecutor` over newline-delimited JSON
#[derive(Clone)]
pub struct RpcServer {
    executor: Arc<ToolExecutor>,
    scripts_dir: PathBuf,
    max_message_bytes: usize,
}

impl RpcServer {
    pub fn new(executor: Arc<ToolExecutor>, scripts_dir: PathBuf, max_message_bytes: usize) -> Self {
        Self {
            executor,
            scripts_dir,
            max_message_bytes,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        debug!("RpcServer::from_config: called");
        Self::new(
            Arc::new(ToolExecutor::standard(config)),
            config.scripts.expanded_dir(),
            config.server.max_message_bytes,
        )
    }

    /// Serve requests on stdin/stdout until EOF or a shutdown signal
    pub async fn serve_stdio(&self) -> Result<()> {
        info!("Serving RPC on stdio");
        tokio::select! {
            result = self.serve_stream(tokio::io::stdin(), tokio::io::stdout()) => result,
            result = shutdown_signal() => {
                info!("Shutdown signal received");
                result
            }
        }
    }

    /// Accept socket connections until a shutdown signal, then remove the socket
    pub async fn serve_socket(&self, socket_path: &Path) -> Result<()> {
        let (listener, path) = create_listener_at(socket_path)?;
        info!(socket = ?path, "Serving RPC on unix socket");

        let result = tokio::select! {
            result = self.accept_loop(listener) => result,
            result = shutdown_signal() => {
                info!("Shutdown signal received");
                result
            }
        };

        cleanup_socket(&path);
        result
    }

    async fn accept_loop(&self, listener: UnixListener) -> Result<()> {
        loop {
            let (stream, _) = listener.accept().await.context("Failed to accept connection")?;
            debug!("RpcServer::accept_loop: connection accepted");
            let server = self.clone();
            tokio::spawn(async move {
                let (reader, writer) = stream.into_split();
                if let Err(e) = server.serve_stream(reader, writer).await {
                    error!(error = %e, "Connection ended with error");
                }
            });
        }
    }

    /// Serve one connection until EOF, draining in-flight requests before returning
    pub async fn serve_stream<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        debug!("RpcServer::serve_stream: called");
        let (tx, rx) = mpsc::unbounded_channel::<Response>();
        let writer_task = tokio::spawn(write_responses(writer, rx));

        let sessions: Arc<Mutex<HashMap<String, ProcessSession>>> = Arc::default();
        let mut in_flight = JoinSet::new();
        let mut reader = BufReader::new(reader);

        loop {
            let frame = match next_frame(&mut reader, self.max_message_bytes).await {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Failed to read request");
                    break;
                }
            };

            let line = match frame {
                Frame::Line(line) => line,
                Frame::Oversized(len) => {
                    warn!(len, max = self.max_message_bytes, "Rejecting oversized request");
                    let _ = tx.send(Response::error(
                        None,
                        format!("Message too large: {} bytes (max {})", len, self.max_message_bytes),
                    ));
                    continue;
                }
            };

            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let request = match serde_json::from_slice::<Request>(&line) {
                Ok(request) => request,
                Err(e) => {
                    debug!(error = %e, "RpcServer::serve_stream: unparseable request");
                    let _ = tx.send(Response::error(recover_id(&line), format!("Invalid request: {}", e)));
                    continue;
                }
            };

            let server = self.clone();
            let sessions = sessions.clone();
            let tx = tx.clone();
            in_flight.spawn(async move {
                let response = server.handle(request, &sessions).await;
                let _ = tx.send(response);
            });
        }

        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Request task failed");
            }
        }

        drop(tx);
        writer_task.await.context("Writer task failed")??;
        debug!("RpcServer::serve_stream: connection closed");
        Ok(())
    }

    async fn handle(&self, request: Request, sessions: &Mutex<HashMap<String, ProcessSession>>) -> Response {
        debug!(id = request.id, "RpcServer::handle: called");
        let body = match request.body {
            RequestBody::Ping => ResponseBody::Pong {
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            RequestBody::ListTools => ResponseBody::Tools {
                tools: self.executor.definitions(),
            },
            RequestBody::CallTool {
                name,
                arguments,
                session,
            } => {
                let mut ctx = ToolContext::new(self.scripts_dir.clone());
                if let Some(key) = session {
                    ctx = ctx.with_session(session_for(sessions, key));
                }
                let call = ToolCall { name, input: arguments };
                self.executor.execute(&call, &ctx).await.into()
            }
        };
        Response::new(Some(request.id), body)
    }
}

/// Session for `key`, dropping entries no request is using
fn session_for(sessions: &Mutex<HashMap<String, ProcessSession>>, key: String) -> ProcessSession {
    let mut sessions = match sessions.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    sessions.retain(|k, session| *k == key || !session.is_idle());
    sessions.entry(key).or_default().clone()
}

/// Best-effort `id` from a request that failed to parse
fn recover_id(line: &[u8]) -> Option<u64> {
    serde_json::from_slice::<serde_json::Value>(line)
        .ok()?
        .get("id")?
        .as_u64()
}

async fn write_responses<W>(writer: W, mut rx: mpsc::UnboundedReceiver<Response>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut writer = writer;
    while let Some(response) = rx.recv().await {
        let json = serde_json::to_string(&response).context("Failed to serialize response")?;
        writer
            .write_all(json.as_bytes())
            .await
            .context("Failed to write response")?;
        writer.write_all(b"\n").await.context("Failed to write newline")?;
        writer.flush().await.context("Failed to flush response")?;
        debug!(id = ?response.id, "write_responses: sent response");
    }
    Ok(())
}

/// Next newline-terminated frame, never buffering more than `max` bytes
///
/// Returns `None` at EOF; an unterminated trailing fragment is discarded.
async fn next_frame<R>(reader: &mut R, max: usize) -> io::Result<Option<Frame>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let mut overflow = 0usize;

    loop {
        let (consumed, complete) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                if !line.is_empty() || overflow > 0 {
                    warn!(bytes = line.len() + overflow, "Discarding unterminated trailing fragment");
                }
                return Ok(None);
            }

            let (chunk, consumed, complete) = match available.iter().position(|b| *b == b'\n') {
                Some(i) => (&available[..i], i + 1, true),
                None => (available, available.len(), false),
            };

            if overflow == 0 && line.len() + chunk.len() <= max {
                line.extend_from_slice(chunk);
            } else {
                overflow += line.len() + chunk.len();
                line.clear();
            }
            (consumed, complete)
        };
        reader.consume(consumed);

        if complete {
            if overflow > 0 {
                return Ok(Some(Frame::Oversized(overflow)));
            }
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            return Ok(Some(Frame::Line(line)));
        }
    }
}

/// Resolves when SIGINT or SIGTERM arrives
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = sigint.recv() => debug!("shutdown_signal: SIGINT received"),
            _ = sigterm.recv() => debug!("shutdown_signal: SIGTERM received"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        debug!("shutdown_signal: ctrl_c received");
    }

    Ok(())
}

/// Bind a listener at `socket_path`, replacing a stale socket file
pub fn create_listener_at(socket_path: &Path) -> Result<(UnixListener, PathBuf)> {
    debug!(?socket_path, "create_listener_at: creating RPC socket");

    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create socket directory")?;
    }

    if socket_path.exists() {
        debug!(?socket_path, "create_listener_at: removing stale socket");
        std::fs::remove_file(socket_path).context("Failed to remove stale socket")?;
    }

    let listener = UnixListener::bind(socket_path).context("Failed to bind RPC socket")?;
    debug!(?socket_path, "create_listener_at: socket bound successfully");

    Ok((listener, socket_path.to_path_buf()))
}

/// Remove the socket file on shutdown
pub fn cleanup_socket(socket_path: &Path) {
    if socket_path.exists() {
        debug!(?socket_path, "cleanup_socket: removing socket file");
        if let Err(e) = std::fs::remove_file(socket_path) {
            warn!(?socket_path, error = %e, "Failed to remove socket file");
        }
    }
}
