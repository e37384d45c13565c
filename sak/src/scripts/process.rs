//! Script process execution
//!
//! `ProcessExecutor` runs one interpreter process per call and resolves
//! exactly once, after the child has exited or been killed and reaped.
//! `ProcessSession` limits a logical session to one in-flight process.

use std::collections::{BTreeMap, VecDeque};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ScriptsConfig;
use crate::tools::ToolError;

/// Exit code reported when the process was killed rather than exiting
pub const TERMINATED_EXIT_CODE: i32 = -1;

/// How long output readers may keep draining after a kill
const READER_GRACE: Duration = Duration::from_millis(500);

/// Spawns completed per session that stay observable
const SESSION_HISTORY: usize = 16;

/// Outcome of one process run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub canceled: bool,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out && !self.canceled
    }
}

/// One script invocation
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub script: PathBuf,
    pub args: Vec<String>,
    pub timeout: Option<Duration>,
}

impl RunRequest {
    pub fn new(script: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            script: script.into(),
            args,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Runs scripts under the configured interpreter
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    interpreter: String,
    env: BTreeMap<String, OsString>,
}

enum Outcome {
    Exited(std::io::Result<std::process::ExitStatus>),
    TimedOut,
    Canceled,
}

impl ProcessExecutor {
    /// Executor with an explicit interpreter and environment overlay
    pub fn new(interpreter: impl Into<String>, env: BTreeMap<String, OsString>) -> Self {
        Self {
            interpreter: interpreter.into(),
            env,
        }
    }

    /// Executor for a scripts configuration
    ///
    /// The scripts directory is prepended to `search-path-var` so scripts can
    /// import helpers that live next to them.
    pub fn from_config(config: &ScriptsConfig) -> Self {
        debug!(interpreter = %config.interpreter, "ProcessExecutor::from_config: called");
        let mut env: BTreeMap<String, OsString> = config
            .env
            .iter()
            .map(|(k, v)| (k.clone(), OsString::from(v)))
            .collect();

        let mut search_path = vec![config.expanded_dir()];
        if let Some(existing) = std::env::var_os(&config.search_path_var) {
            search_path.extend(std::env::split_paths(&existing));
        }
        match std::env::join_paths(search_path) {
            Ok(joined) => {
                env.insert(config.search_path_var.clone(), joined);
            }
            Err(e) => warn!(error = %e, var = %config.search_path_var, "Cannot build script search path"),
        }

        Self::new(config.interpreter.clone(), env)
    }

    /// Run a script to completion (or until its timeout)
    pub async fn run(&self, request: RunRequest) -> Result<ExecutionResult, ToolError> {
        self.run_with_cancel(request, None).await
    }

    /// Run a script inside a session, superseding the session's previous run
    pub async fn run_in_session(
        &self,
        request: RunRequest,
        session: &ProcessSession,
    ) -> Result<ExecutionResult, ToolError> {
        let SpawnTicket { id, cancel, finished } = session.begin().await;
        debug!(id, "ProcessExecutor::run_in_session: ticket issued");

        // Dropping this future mid-run still settles the spawn as canceled
        let mut guard = SpawnGuard {
            session,
            id,
            state: SpawnState::Canceled,
            finished: Some(finished),
        };

        let result = self.run_with_cancel(request, Some(cancel)).await;
        guard.state = match &result {
            Ok(r) if r.canceled => SpawnState::Canceled,
            _ => SpawnState::Resolved,
        };
        result
    }

    async fn run_with_cancel(
        &self,
        request: RunRequest,
        cancel: Option<oneshot::Receiver<()>>,
    ) -> Result<ExecutionResult, ToolError> {
        debug!(script = ?request.script, args = ?request.args, timeout = ?request.timeout, "ProcessExecutor::run: called");
        let mut cancel = cancel;

        // Superseded before it ever started
        if let Some(rx) = cancel.as_mut()
            && rx.try_recv().is_ok()
        {
            debug!("ProcessExecutor::run: canceled before spawn");
            return Ok(terminated(String::new(), String::new(), false, true));
        }

        let mut child = self.spawn(&request.script, &request.args)?;
        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        let outcome = tokio::select! {
            status = child.wait() => Outcome::Exited(status),
            _ = sleep_or_pending(request.timeout) => Outcome::TimedOut,
            _ = cancelled_or_pending(cancel) => Outcome::Canceled,
        };

        let exit_code = match outcome {
            Outcome::Exited(Ok(status)) => {
                debug!(?status, "ProcessExecutor::run: process exited");
                status.code().unwrap_or(TERMINATED_EXIT_CODE)
            }
            Outcome::Exited(Err(e)) => {
                warn!(error = %e, "Failed waiting for script process");
                terminate(&mut child).await;
                TERMINATED_EXIT_CODE
            }
            Outcome::TimedOut => {
                info!(script = ?request.script, timeout = ?request.timeout, "Script timed out, terminating");
                terminate(&mut child).await;
                let (out, err) = collect(stdout, stderr).await;
                return Ok(terminated(out, err, true, false));
            }
            Outcome::Canceled => {
                info!(script = ?request.script, "Script superseded, terminating");
                terminate(&mut child).await;
                let (out, err) = collect(stdout, stderr).await;
                return Ok(terminated(out, err, false, true));
            }
        };

        let (stdout, stderr) = collect(stdout, stderr).await;
        Ok(ExecutionResult {
            exit_code,
            stdout,
            stderr,
            timed_out: false,
            canceled: false,
        })
    }

    fn spawn(&self, script: &Path, args: &[String]) -> Result<Child, ToolError> {
        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(script)
            .args(args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group so a kill reaches anything the script started
        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        cmd.spawn().map_err(|source| ToolError::Spawn {
            interpreter: self.interpreter.clone(),
            source,
        })
    }
}

fn terminated(stdout: String, stderr: String, timed_out: bool, canceled: bool) -> ExecutionResult {
    ExecutionResult {
        exit_code: TERMINATED_EXIT_CODE,
        stdout,
        stderr,
        timed_out,
        canceled,
    }
}

async fn sleep_or_pending(timeout: Option<Duration>) {
    match timeout {
        Some(t) => tokio::time::sleep(t).await,
        None => std::future::pending().await,
    }
}

async fn cancelled_or_pending(cancel: Option<oneshot::Receiver<()>>) {
    match cancel {
        // A dropped sender means the session went away, not a cancel
        Some(rx) => {
            if rx.await.is_err() {
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending().await,
    }
}

/// Kill the child (and its process group) and reap it
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Some(pid) = child.id()
            && let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL)
        {
            debug!(pid, error = %e, "terminate: killpg failed, falling back to kill");
        }
    }

    if let Err(e) = child.start_kill() {
        debug!(error = %e, "terminate: start_kill failed (already exited?)");
    }
    if let Err(e) = child.wait().await {
        warn!(error = %e, "Failed to reap terminated script process");
    }
}

type Reader = (Arc<Mutex<Vec<u8>>>, JoinHandle<()>);

/// Drain a pipe into a shared buffer, so partial output survives a kill
fn spawn_reader<R>(mut pipe: R) -> Reader
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buf = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&buf);
    let handle = tokio::spawn(async move {
        let mut chunk = [0u8; 8192];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    if let Ok(mut b) = sink.lock() {
                        b.extend_from_slice(&chunk[..n]);
                    }
                }
                Err(e) => {
                    debug!(error = %e, "spawn_reader: read failed");
                    break;
                }
            }
        }
    });
    (buf, handle)
}

async fn collect(stdout: Option<Reader>, stderr: Option<Reader>) -> (String, String) {
    (drain(stdout).await, drain(stderr).await)
}

async fn drain(reader: Option<Reader>) -> String {
    let Some((buf, mut handle)) = reader else {
        return String::new();
    };

    if tokio::time::timeout(READER_GRACE, &mut handle).await.is_err() {
        debug!("drain: reader still open after grace period, aborting");
        handle.abort();
    }

    let bytes = buf.lock().map(|b| b.clone()).unwrap_or_default();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Lifecycle state of one spawn in a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnState {
    Running,
    Resolved,
    Canceled,
}

/// Spawn id and its current state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnRecord {
    pub id: u64,
    pub state: SpawnState,
}

struct ActiveSpawn {
    id: u64,
    cancel: oneshot::Sender<()>,
    finished: oneshot::Receiver<()>,
}

#[derive(Default)]
struct SessionInner {
    next_id: u64,
    active: Option<ActiveSpawn>,
    spawns: VecDeque<SpawnRecord>,
}

impl SessionInner {
    fn set_state(&mut self, id: u64, state: SpawnState) {
        if let Some(record) = self.spawns.iter_mut().find(|r| r.id == id) {
            record.state = state;
        }
    }
}

/// Permission to run one process in a session
struct SpawnTicket {
    id: u64,
    cancel: oneshot::Receiver<()>,
    finished: oneshot::Sender<()>,
}

/// Records a spawn's final state and releases any superseding run on drop
struct SpawnGuard<'a> {
    session: &'a ProcessSession,
    id: u64,
    state: SpawnState,
    finished: Option<oneshot::Sender<()>>,
}

impl Drop for SpawnGuard<'_> {
    fn drop(&mut self) {
        self.session.finish(self.id, self.state);
        if let Some(finished) = self.finished.take() {
            let _ = finished.send(());
        }
    }
}

/// At most one in-flight process per logical session
///
/// Starting a run cancels the previous one and waits until it has been
/// terminated. Clones share the same session.
#[derive(Clone, Default)]
pub struct ProcessSession {
    inner: Arc<Mutex<SessionInner>>,
}

impl ProcessSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the in-flight spawn, if any
    pub fn active(&self) -> Option<u64> {
        self.inner.lock().ok()?.active.as_ref().map(|a| a.id)
    }

    /// No run is in flight and no caller holds another handle to the session
    pub fn is_idle(&self) -> bool {
        Arc::strong_count(&self.inner) == 1 && self.active().is_none()
    }

    /// Recent spawns, oldest first
    pub fn spawns(&self) -> Vec<SpawnRecord> {
        self.inner
            .lock()
            .map(|inner| inner.spawns.iter().copied().collect())
            .unwrap_or_default()
    }

    async fn begin(&self) -> SpawnTicket {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let (finished_tx, finished_rx) = oneshot::channel();

        let (id, superseded) = {
            let mut inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            inner.next_id += 1;
            let id = inner.next_id;
            let superseded = inner.active.replace(ActiveSpawn {
                id,
                cancel: cancel_tx,
                finished: finished_rx,
            });
            inner.spawns.push_back(SpawnRecord {
                id,
                state: SpawnState::Running,
            });
            while inner.spawns.len() > SESSION_HISTORY {
                inner.spawns.pop_front();
            }
            (id, superseded)
        };

        if let Some(previous) = superseded {
            debug!(previous = previous.id, next = id, "ProcessSession::begin: superseding spawn");
            let _ = previous.cancel.send(());
            // Err means the previous run already finished
            let _ = previous.finished.await;
        }

        SpawnTicket {
            id,
            cancel: cancel_rx,
            finished: finished_tx,
        }
    }

    fn finish(&self, id: u64, state: SpawnState) {
        debug!(id, ?state, "ProcessSession::finish: called");
        let mut inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        inner.set_state(id, state);
        if inner.active.as_ref().is_some_and(|a| a.id == id) {
            inner.active = None;
        }
    }
}

impl std::fmt::Debug for ProcessSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSession")
            .field("active", &self.active())
            .finish()
    }
}
