// src/server/process.rs
use crate::config::LaunchConfig;
use crate::error::{Error, Result};
use async_process::{Child, Command, Stdio};
use async_trait::async_trait;
use futures_lite::io::{AsyncBufReadExt, AsyncRead, BufReader};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;

/// How long a killed process gets to be reaped before `terminate` gives up.
const KILL_WAIT: Duration = Duration::from_secs(5);

/// How long output readers get to drain after the process exited.
const DRAIN_WAIT: Duration = Duration::from_secs(1);

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    /// Exit code, if the process exited normally
    pub code: Option<i32>,
    /// Terminating signal, if the process was killed by one
    pub signal: Option<i32>,
}

impl ExitInfo {
    /// Process exited with `code`.
    pub fn code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    /// Process was terminated by `signal`.
    pub fn signaled(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    /// Exit status could not be determined.
    pub fn unknown() -> Self {
        Self {
            code: None,
            signal: None,
        }
    }

    /// `true` for exit code 0, which is treated as an intentional stop.
    pub fn is_clean(&self) -> bool {
        self.code == Some(0)
    }

    fn from_status(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self::signaled(signal);
            }
        }
        match status.code() {
            Some(code) => Self::code(code),
            None => Self::unknown(),
        }
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {}", code),
            (None, Some(signal)) => write!(f, "signal {}", signal),
            (None, None) => write!(f, "unknown exit status"),
        }
    }
}

/// Lifecycle status of a spawned process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// Created, not yet confirmed running
    Starting,
    /// Running
    Running,
    /// Exited and reaped
    Exited(ExitInfo),
}

/// Which pipe a line of output came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Events produced by a spawned process, in the order they happened.
///
/// `Exited` is always the last event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// One line of output, without its trailing newline
    Output { stream: OutputStream, line: String },
    /// The process ended
    Exited(ExitInfo),
}

/// Everything needed to start the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Program path or command name
    pub program: PathBuf,
    /// Arguments
    pub args: Vec<String>,
    /// Variables added to the inherited environment
    pub env: HashMap<String, String>,
    /// Working directory
    pub working_dir: Option<PathBuf>,
}

impl LaunchSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
            working_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Builds the launch recipe for either launch mode.
    ///
    /// In script mode the interpreter is the first candidate that exists on
    /// disk; when none does, the first bare command name (resolved through
    /// `PATH` at spawn time) is used.
    pub fn from_config(config: &LaunchConfig) -> Self {
        match config {
            LaunchConfig::Packaged {
                executable,
                args,
                working_dir,
                env,
            } => Self {
                program: executable.clone(),
                args: args.clone(),
                env: env.clone(),
                working_dir: working_dir.clone(),
            },
            LaunchConfig::Script {
                interpreter_candidates,
                script,
                project_dir,
                settings_module,
                settings_env_var,
                env,
            } => {
                let interpreter = pick_interpreter(interpreter_candidates);
                tracing::info!(interpreter = %interpreter, "Selected backend interpreter");

                let mut spec = Self::new(interpreter)
                    .arg(script.clone())
                    .working_dir(project_dir.clone())
                    .env("PYTHONPATH", project_dir.to_string_lossy());
                if let Some(module) = settings_module {
                    spec = spec.env(settings_env_var.clone(), module.clone());
                }
                spec.env.extend(env.clone());
                spec
            }
        }
    }

    /// Command line as a single string, for logs.
    pub fn describe(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }

    /// Whether the program is given as a path rather than a command looked up in `PATH`.
    fn is_path(&self) -> bool {
        is_path_like(&self.program)
    }
}

fn is_path_like(program: &Path) -> bool {
    program.is_absolute() || program.components().count() > 1
}

fn pick_interpreter(candidates: &[String]) -> String {
    let candidates: Vec<&String> = candidates.iter().filter(|c| !c.trim().is_empty()).collect();

    if let Some(found) = candidates
        .iter()
        .find(|c| is_path_like(Path::new(c.as_str())) && Path::new(c.as_str()).exists())
    {
        return found.to_string();
    }

    candidates
        .iter()
        .find(|c| !is_path_like(Path::new(c.as_str())))
        .or_else(|| candidates.first())
        .map(|c| c.to_string())
        .unwrap_or_else(|| "python".to_string())
}

/// Shared reference to a spawned process.
///
/// Cloning is cheap; every clone observes the same status.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pid: u32,
    status: watch::Receiver<ProcessStatus>,
    kill: Arc<Notify>,
}

/// Write side of a [`ProcessHandle`], held by whoever reaps the process.
#[derive(Debug)]
pub struct ProcessTracker {
    status: watch::Sender<ProcessStatus>,
    kill: Arc<Notify>,
}

impl ProcessHandle {
    /// Creates a handle in `Starting` state and the tracker that drives it.
    pub fn new(pid: u32) -> (Self, ProcessTracker) {
        let (status_tx, status_rx) = watch::channel(ProcessStatus::Starting);
        let kill = Arc::new(Notify::new());
        (
            Self {
                pid,
                status: status_rx,
                kill: Arc::clone(&kill),
            },
            ProcessTracker {
                status: status_tx,
                kill,
            },
        )
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn status(&self) -> ProcessStatus {
        *self.status.borrow()
    }

    pub fn is_alive(&self) -> bool {
        !matches!(self.status(), ProcessStatus::Exited(_))
    }

    /// Asks the reaper to kill the process forcefully.
    pub fn request_kill(&self) {
        self.kill.notify_one();
    }

    /// Waits up to `timeout` for the process to exit.
    ///
    /// Returns `None` if it is still running afterwards.
    pub async fn wait_for_exit(&self, timeout: Duration) -> Option<ExitInfo> {
        let mut status = self.status.clone();
        let exited = tokio::time::timeout(timeout, async move {
            match status
                .wait_for(|s| matches!(s, ProcessStatus::Exited(_)))
                .await
            {
                Ok(s) => match *s {
                    ProcessStatus::Exited(exit) => exit,
                    _ => ExitInfo::unknown(),
                },
                // Tracker dropped without reporting: the reaper is gone.
                Err(_) => ExitInfo::unknown(),
            }
        })
        .await;
        exited.ok()
    }
}

impl ProcessTracker {
    pub fn set_running(&self) {
        self.status.send_replace(ProcessStatus::Running);
    }

    pub fn report_exit(&self, exit: ExitInfo) {
        self.status.send_replace(ProcessStatus::Exited(exit));
    }

    /// Resolves once [`ProcessHandle::request_kill`] has been called.
    pub async fn kill_requested(&self) {
        self.kill.notified().await;
    }
}

/// A freshly spawned process and its event stream.
#[derive(Debug)]
pub struct SpawnedProcess {
    pub handle: ProcessHandle,
    pub events: mpsc::UnboundedReceiver<ProcessEvent>,
}

/// Spawns and terminates the backend process.
///
/// Implementations own at most one live process at a time.
#[async_trait]
pub trait ProcessController: Send + Sync {
    /// Starts a process.
    ///
    /// Fails with [`Error::ExecutableNotFound`] when the program does not
    /// exist, [`Error::Spawn`] when the OS refuses, and
    /// [`Error::AlreadyRunning`] while a previous process is alive.
    async fn spawn(&self, spec: &LaunchSpec) -> Result<SpawnedProcess>;

    /// Stops a process: graceful signal first, forceful kill after `grace`.
    ///
    /// Calling this on an exited handle is a no-op.
    async fn terminate(&self, handle: &ProcessHandle, grace: Duration) -> Result<()>;
}

/// [`ProcessController`] for real OS processes
pub struct ServerProcess {
    /// Server name, for logs
    name: String,
    /// Most recently spawned process
    current: Mutex<Option<ProcessHandle>>,
}

impl ServerProcess {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            current: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle of the live process, if any.
    pub fn current(&self) -> Option<ProcessHandle> {
        self.current
            .lock()
            .ok()
            .and_then(|c| c.as_ref().filter(|h| h.is_alive()).cloned())
    }

    fn forget(&self, pid: u32) {
        if let Ok(mut current) = self.current.lock() {
            if current.as_ref().is_some_and(|h| h.pid() == pid) {
                *current = None;
            }
        }
    }
}

#[async_trait]
impl ProcessController for ServerProcess {
    #[tracing::instrument(skip(self, spec), fields(server = %self.name, command = %spec.describe()))]
    async fn spawn(&self, spec: &LaunchSpec) -> Result<SpawnedProcess> {
        let mut current = self
            .current
            .lock()
            .map_err(|_| Error::Other("Failed to lock current process".to_string()))?;

        if current.as_ref().is_some_and(|h| h.is_alive()) {
            return Err(Error::AlreadyRunning);
        }

        if spec.is_path() && !spec.program.exists() {
            return Err(Error::ExecutableNotFound(spec.program.display().to_string()));
        }

        if let Some(dir) = spec.working_dir.as_ref().filter(|d| !d.is_dir()) {
            return Err(Error::Spawn(format!(
                "working directory not found: {}",
                dir.display()
            )));
        }

        let mut command = Command::new(&spec.program);
        command.args(&spec.args);
        for (key, value) in &spec.env {
            command.env(key, value);
        }
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ExecutableNotFound(spec.program.display().to_string())
            } else {
                Error::Spawn(e.to_string())
            }
        })?;

        let pid = child.id();
        let (handle, tracker) = ProcessHandle::new(pid);
        tracker.set_running();

        let (tx, rx) = mpsc::unbounded_channel();
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(forward_lines(stdout, OutputStream::Stdout, tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(forward_lines(stderr, OutputStream::Stderr, tx.clone())));
        }
        tokio::spawn(reap(child, tracker, readers, tx));

        tracing::info!(pid, "Backend process spawned");
        *current = Some(handle.clone());

        Ok(SpawnedProcess { handle, events: rx })
    }

    #[tracing::instrument(skip(self, handle), fields(server = %self.name, pid = handle.pid()))]
    async fn terminate(&self, handle: &ProcessHandle, grace: Duration) -> Result<()> {
        if !handle.is_alive() {
            tracing::debug!("Process already exited");
            self.forget(handle.pid());
            return Ok(());
        }

        send_graceful_signal(handle);

        if let Some(exit) = handle.wait_for_exit(grace).await {
            tracing::info!(%exit, "Process stopped gracefully");
        } else {
            tracing::warn!(grace_ms = grace.as_millis() as u64, "Process ignored termination, killing");
            handle.request_kill();
            match handle.wait_for_exit(KILL_WAIT).await {
                Some(exit) => tracing::info!(%exit, "Process killed"),
                None => {
                    return Err(Error::Process(format!(
                        "Process {} still running after kill",
                        handle.pid()
                    )));
                }
            }
        }

        self.forget(handle.pid());
        Ok(())
    }
}

#[cfg(unix)]
fn send_graceful_signal(handle: &ProcessHandle) {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    match signal::kill(Pid::from_raw(handle.pid() as i32), Signal::SIGTERM) {
        Ok(()) => tracing::debug!("Sent SIGTERM"),
        Err(nix::errno::Errno::ESRCH) => tracing::debug!("Process already gone"),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to send SIGTERM, killing instead");
            handle.request_kill();
        }
    }
}

#[cfg(not(unix))]
fn send_graceful_signal(handle: &ProcessHandle) {
    handle.request_kill();
}

async fn forward_lines<R>(reader: R, stream: OutputStream, tx: mpsc::UnboundedSender<ProcessEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                if tx.send(ProcessEvent::Output { stream, line }).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(?stream, error = %e, "Stopped reading process output");
                break;
            }
        }
    }
}

async fn reap(
    mut child: Child,
    tracker: ProcessTracker,
    readers: Vec<JoinHandle<()>>,
    tx: mpsc::UnboundedSender<ProcessEvent>,
) {
    let status = tokio::select! {
        status = child.status() => status,
        _ = tracker.kill_requested() => {
            if let Err(e) = child.kill() {
                tracing::warn!(error = %e, "Failed to kill process");
            }
            child.status().await
        }
    };

    let exit = match status {
        Ok(status) => ExitInfo::from_status(status),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to collect exit status");
            ExitInfo::unknown()
        }
    };

    // Let buffered output reach the channel before the exit event.
    for mut reader in readers {
        if tokio::time::timeout(DRAIN_WAIT, &mut reader).await.is_err() {
            reader.abort();
        }
    }

    tracker.report_exit(exit);
    let _ = tx.send(ProcessEvent::Exited(exit));
}
