use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use warden_core::{Task, WardenError};

/// Buffered events per process. A full buffer stalls the pipe readers,
/// which in turn stalls the agent's writes.
const EVENT_BUFFER: usize = 256;

/// Longest chunk forwarded from a pipe. A longer line arrives split.
const MAX_LINE_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// What a running agent reports.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// A chunk of output. Chunks arrive at arbitrary boundaries.
    Output { stream: OutputStream, text: String },
    /// The process exited. `None` means it was killed by a signal.
    Exited { code: Option<i32> },
    /// The process could not be waited on.
    Failed { error: String },
}

impl AgentEvent {
    pub fn stdout(text: impl Into<String>) -> Self {
        AgentEvent::Output {
            stream: OutputStream::Stdout,
            text: text.into(),
        }
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        AgentEvent::Output {
            stream: OutputStream::Stderr,
            text: text.into(),
        }
    }

    pub fn exit(code: i32) -> Self {
        AgentEvent::Exited { code: Some(code) }
    }

    fn is_terminal(&self) -> bool {
        !matches!(self, AgentEvent::Output { .. })
    }
}

/// Handle on one launched agent: a live event stream plus a stop switch.
#[derive(Debug)]
pub struct AgentProcess {
    events: mpsc::Receiver<AgentEvent>,
    stop: CancellationToken,
}

impl AgentProcess {
    pub fn new(events: mpsc::Receiver<AgentEvent>, stop: CancellationToken) -> Self {
        Self { events, stop }
    }

    /// Next event, or `None` once the stream is exhausted.
    pub async fn next_event(&mut self) -> Option<AgentEvent> {
        self.events.recv().await
    }

    /// Ask the process to stop: graceful signal first, then kill.
    pub fn terminate(&self) {
        self.stop.cancel();
    }

    /// Terminate and drain remaining events. Returns the exit code if the
    /// process reported one.
    pub async fn shutdown(mut self) -> Option<i32> {
        self.terminate();
        let mut code = None;
        while let Some(event) = self.events.recv().await {
            if let AgentEvent::Exited { code: c } = event {
                code = c;
            }
        }
        code
    }
}

/// Starts one agent process per task.
#[async_trait::async_trait]
pub trait AgentLauncher: Send + Sync {
    async fn launch(&self, task: &Task, prompt: &str, cwd: &Path) -> Result<AgentProcess>;
}

/// Fixed namespace UUID for warden sessions.
const SESSION_NS: Uuid = Uuid::from_bytes([
    0x3a, 0x7d, 0xe0, 0x11, 0x9c, 0x42, 0x4b, 0x5e, 0x80, 0x00, 0x77, 0x61, 0x72, 0x64, 0x65, 0x6e,
]);

/// Deterministic session id per queue name and start time.
pub fn session_id(queue_name: &str, started_at: &str) -> Uuid {
    Uuid::new_v5(&SESSION_NS, format!("{queue_name}@{started_at}").as_bytes())
}

/// Launches a real process: `{bin} {args...} {prompt}`.
pub struct CommandLauncher {
    pub bin: PathBuf,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    /// Time between SIGTERM and kill on termination.
    pub terminate_grace: Duration,
}

impl CommandLauncher {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            args: Vec::new(),
            env: HashMap::new(),
            terminate_grace: Duration::from_secs(5),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.terminate_grace = grace;
        self
    }
}

#[async_trait::async_trait]
impl AgentLauncher for CommandLauncher {
    async fn launch(&self, task: &Task, prompt: &str, cwd: &Path) -> Result<AgentProcess> {
        let mut cmd = tokio::process::Command::new(&self.bin);
        cmd.args(&self.args)
            .arg(prompt)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .env("WARDEN_TASK_ID", &task.id);
        for (k, v) in &self.env {
            cmd.env(k, v);
        }

        let mut child = cmd.spawn().map_err(|source| WardenError::Spawn {
            bin: self.bin.clone(),
            source,
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("failed to capture stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow::anyhow!("failed to capture stderr"))?;

        tracing::debug!(task = %task.id, pid = ?child.id(), bin = %self.bin.display(), "agent started");

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let stop = CancellationToken::new();
        tokio::spawn(supervise(
            child,
            stdout,
            stderr,
            tx,
            stop.clone(),
            self.terminate_grace,
        ));
        Ok(AgentProcess::new(rx, stop))
    }
}

async fn supervise(
    mut child: Child,
    stdout: impl AsyncRead + Unpin + Send + 'static,
    stderr: impl AsyncRead + Unpin + Send + 'static,
    tx: mpsc::Sender<AgentEvent>,
    stop: CancellationToken,
    grace: Duration,
) {
    let out = tokio::spawn(pump(stdout, OutputStream::Stdout, tx.clone()));
    let err = tokio::spawn(pump(stderr, OutputStream::Stderr, tx.clone()));

    let status = tokio::select! {
        status = child.wait() => status,
        _ = stop.cancelled() => terminate_child(&mut child, grace).await,
    };

    // Buffered output lands before the exit event. Once a stop is requested,
    // a grandchild holding the pipes open gets `grace` and no more.
    let drain = async {
        let _ = out.await;
        let _ = err.await;
    };
    tokio::pin!(drain);
    let drained = tokio::select! {
        biased;
        _ = &mut drain => true,
        _ = stop.cancelled() => false,
    };
    if !drained && tokio::time::timeout(grace, &mut drain).await.is_err() {
        tracing::debug!("agent output readers still open after exit; dropping");
    }

    let event = match status {
        Ok(status) => AgentEvent::Exited {
            code: status.code(),
        },
        Err(e) => AgentEvent::Failed {
            error: e.to_string(),
        },
    };
    let _ = tx.send(event).await;
}

/// Forward lines from one pipe until EOF or until nobody is listening.
/// Invalid UTF-8 is replaced, never fatal.
async fn pump(
    reader: impl AsyncRead + Unpin,
    stream: OutputStream,
    tx: mpsc::Sender<AgentEvent>,
) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = (&mut reader)
            .take(MAX_LINE_BYTES as u64)
            .read_until(b'\n', &mut buf)
            .await;
        match read {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\n', '\r'])
                    .to_string();
                if tx.send(AgentEvent::Output { stream, text }).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(?stream, "agent output read failed: {e}");
                break;
            }
        }
    }
}

/// SIGTERM, wait up to `grace`, then kill.
async fn terminate_child(child: &mut Child, grace: Duration) -> std::io::Result<ExitStatus> {
    if send_sigterm(child) {
        if let Ok(status) = tokio::time::timeout(grace, child.wait()).await {
            return status;
        }
        tracing::warn!(pid = ?child.id(), "agent ignored SIGTERM for {grace:?}, killing");
    }
    child.kill().await?;
    child.wait().await
}

#[cfg(unix)]
fn send_sigterm(child: &Child) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|p| i32::try_from(p).ok()) else {
        return false;
    };
    match kill(Pid::from_raw(pid), Signal::SIGTERM) {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(pid, "SIGTERM failed: {e}");
            false
        }
    }
}

#[cfg(not(unix))]
fn send_sigterm(_child: &Child) -> bool {
    false
}

fn lock<T>(m: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Mock launcher for testing. Replays scripted events per task id.
///
/// With no script the process exits 0 immediately. A script without a
/// terminal event leaves the process running until it is terminated.
pub struct MockLauncher {
    scripts: std::sync::Mutex<HashMap<String, Vec<AgentEvent>>>,
    spawn_errors: std::sync::Mutex<HashMap<String, String>>,
    launched: std::sync::Mutex<Vec<(String, String)>>,
}

impl Default for MockLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLauncher {
    pub fn new() -> Self {
        Self {
            scripts: std::sync::Mutex::new(HashMap::new()),
            spawn_errors: std::sync::Mutex::new(HashMap::new()),
            launched: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn set_script(&self, task_id: &str, events: Vec<AgentEvent>) {
        lock(&self.scripts).insert(task_id.to_string(), events);
    }

    /// Make `launch` fail for `task_id`, as a missing binary would.
    pub fn fail_spawn(&self, task_id: &str, error: &str) {
        lock(&self.spawn_errors).insert(task_id.to_string(), error.to_string());
    }

    /// `(task_id, prompt)` for every launch, in order.
    pub fn launched(&self) -> Vec<(String, String)> {
        lock(&self.launched).clone()
    }

    pub fn launched_ids(&self) -> Vec<String> {
        self.launched().into_iter().map(|(id, _)| id).collect()
    }
}

#[async_trait::async_trait]
impl AgentLauncher for MockLauncher {
    async fn launch(&self, task: &Task, prompt: &str, _cwd: &Path) -> Result<AgentProcess> {
        if let Some(error) = lock(&self.spawn_errors).get(&task.id) {
            return Err(WardenError::Spawn {
                bin: PathBuf::from("mock-agent"),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, error.clone()),
            }
            .into());
        }
        lock(&self.launched).push((task.id.clone(), prompt.to_string()));

        let script = lock(&self.scripts)
            .get(&task.id)
            .cloned()
            .unwrap_or_else(|| vec![AgentEvent::exit(0)]);

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let stop = CancellationToken::new();
        let token = stop.clone();
        tokio::spawn(async move {
            for event in script {
                let terminal = event.is_terminal();
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        let _ = tx.send(AgentEvent::Exited { code: None }).await;
                        return;
                    }
                    sent = tx.send(event) => if sent.is_err() { return },
                }
                if terminal {
                    return;
                }
            }
            // Script ran out without exiting: behave like a hung agent.
            token.cancelled().await;
            let _ = tx.send(AgentEvent::Exited { code: None }).await;
        });
        Ok(AgentProcess::new(rx, stop))
    }
}
