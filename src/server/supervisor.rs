//! The backend supervisor state machine.
//!
//! A [`Supervisor`] owns every piece of mutable start-up state and runs on a
//! single tokio task. Commands arrive through a [`SupervisorHandle`]; timers,
//! probes, process output and health checks arrive as [`SupervisorEvent`]s on
//! an internal channel. Each event carries the generation it was scheduled
//! in, and events from an older generation are dropped, so work cancelled by
//! a restart or a failed attempt can never change the current state.

use crate::config::{ServerConfig, SupervisorConfig};
use crate::error::{Error, Result};
use crate::probe::{ProbeResult, Prober, describe, is_success};
use crate::server::lifecycle::{ServerLifecycleEvent, ServerLifecycleManager};
use crate::server::monitor::{HealthMonitor, HealthMonitorConfig, ServerHealth};
use crate::server::process::{
    ExitInfo, LaunchSpec, OutputStream, ProcessController, ProcessEvent, ProcessHandle,
    SpawnedProcess,
};
use crate::server::readiness::ReadinessDetector;
use crate::server::recovery::{RecoveryAction, RecoveryCoordinator};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Capacity of the shell notification channel.
const NOTIFICATION_CAPACITY: usize = 100;

/// How long `shutdown` waits for the supervisor task to finish.
const SHUTDOWN_WAIT: Duration = Duration::from_secs(15);

/// Supervisor phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    /// No backend process
    Idle,
    /// Process is being started
    Spawning,
    /// Waiting for a readiness marker in the output
    AwaitingReadinessSignal,
    /// Marker seen; confirming with HTTP probes
    ProbingHttp,
    /// Backend answered a probe
    Serving,
    /// Last attempt failed
    Failed,
}

impl Phase {
    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Idle, Spawning)
                | (Idle, Failed)
                | (Spawning, AwaitingReadinessSignal)
                | (Spawning, Failed)
                | (Spawning, Idle)
                | (AwaitingReadinessSignal, ProbingHttp)
                | (AwaitingReadinessSignal, Failed)
                | (AwaitingReadinessSignal, Idle)
                | (ProbingHttp, Serving)
                | (ProbingHttp, Failed)
                | (ProbingHttp, Idle)
                | (Serving, Failed)
                | (Serving, Idle)
                | (Failed, Spawning)
                | (Failed, Idle)
        )
    }

    /// Phases in which a start-up attempt or a serving backend is in progress.
    pub fn is_active(self) -> bool {
        !matches!(self, Phase::Idle | Phase::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Spawning => "spawning",
            Phase::AwaitingReadinessSignal => "awaiting readiness signal",
            Phase::ProbingHttp => "probing HTTP",
            Phase::Serving => "serving",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Attempt counter, phase and last error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorState {
    /// Consecutive start-up attempts since the last success or reset
    pub attempt_count: u32,
    /// Current phase
    pub phase: Phase,
    /// Error that ended the most recent failed attempt
    pub last_error: Option<Error>,
}

impl SupervisorState {
    pub fn new() -> Self {
        Self {
            attempt_count: 0,
            phase: Phase::Idle,
            last_error: None,
        }
    }

    /// Moves to `next`, rejecting transitions the state machine does not allow.
    pub fn advance(&mut self, next: Phase) -> Result<()> {
        if !self.phase.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.phase.to_string(),
                to: next.to_string(),
            });
        }
        self.phase = next;
        Ok(())
    }
}

impl Default for SupervisorState {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of the supervisor, published after every change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorSnapshot {
    pub phase: Phase,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub generation: u64,
    pub pid: Option<u32>,
    pub last_error: Option<String>,
    pub health: ServerHealth,
    pub monitoring_active: bool,
    pub server_url: String,
}

impl SupervisorSnapshot {
    /// `true` while the backend is serving requests.
    pub fn server_running(&self) -> bool {
        self.phase == Phase::Serving
    }
}

/// Payload of a user-visible error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    /// Dialog title
    pub title: String,
    /// Message, including a hint on what to do
    pub message: String,
    /// `true` when the supervisor stopped retrying
    pub fatal: bool,
}

impl ErrorDetails {
    pub fn from_error(error: &Error) -> Self {
        Self {
            title: error.title().to_string(),
            message: format!("{}\n\n{}", error, error.hint()),
            fatal: error.is_fatal(),
        }
    }
}

/// One-way notifications for the shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum Notification {
    /// Progress text
    StatusUpdate(String),
    /// Error to show to the user
    ErrorMessage(ErrorDetails),
    /// The backend is serving at `url`
    ServerReady { url: String },
    /// Health checks failed for longer than the grace period
    ConnectionLost,
}

/// Commands accepted by the supervisor task
#[derive(Debug)]
pub enum SupervisorCommand {
    /// Begin a start-up attempt if none is in progress
    Start,
    /// Tear down and start again with a fresh attempt budget
    Restart(oneshot::Sender<bool>),
    /// Stop the backend and end the supervisor task
    Shutdown(oneshot::Sender<()>),
}

/// Events delivered to the supervisor task, tagged with the generation that
/// scheduled them.
#[derive(Debug)]
pub enum SupervisorEvent {
    /// Output or exit of the backend process
    Process { generation: u64, event: ProcessEvent },
    /// Time to issue readiness probe number `attempt` (0-based)
    ProbeDue { generation: u64, attempt: u32 },
    /// A readiness probe finished
    ProbeCompleted {
        generation: u64,
        attempt: u32,
        result: ProbeResult,
    },
    /// No readiness marker within the readiness timeout
    ReadinessTimedOut { generation: u64 },
    /// Restart backoff elapsed
    BackoffElapsed { generation: u64 },
    /// A health check finished
    HealthProbe { generation: u64, result: ProbeResult },
}

impl SupervisorEvent {
    pub fn generation(&self) -> u64 {
        match self {
            SupervisorEvent::Process { generation, .. }
            | SupervisorEvent::ProbeDue { generation, .. }
            | SupervisorEvent::ProbeCompleted { generation, .. }
            | SupervisorEvent::ReadinessTimedOut { generation }
            | SupervisorEvent::BackoffElapsed { generation }
            | SupervisorEvent::HealthProbe { generation, .. } => *generation,
        }
    }
}

/// Drives the backend through start-up, serving and recovery.
pub struct Supervisor {
    config: SupervisorConfig,
    server: ServerConfig,
    spec: LaunchSpec,
    controller: Arc<dyn ProcessController>,
    prober: Arc<dyn Prober>,
    detector: ReadinessDetector,
    state: SupervisorState,
    health: HealthMonitor,
    recovery: RecoveryCoordinator,
    lifecycle: Arc<ServerLifecycleManager>,
    process: Option<ProcessHandle>,
    generation: u64,
    pending: Vec<JoinHandle<()>>,
    events_tx: mpsc::UnboundedSender<SupervisorEvent>,
    events_rx: mpsc::UnboundedReceiver<SupervisorEvent>,
    snapshot_tx: watch::Sender<SupervisorSnapshot>,
    notify_tx: broadcast::Sender<Notification>,
}

impl Supervisor {
    /// Create a supervisor in `Idle` phase.
    pub fn new(
        config: SupervisorConfig,
        server: ServerConfig,
        spec: LaunchSpec,
        controller: Arc<dyn ProcessController>,
        prober: Arc<dyn Prober>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (notify_tx, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        let health = HealthMonitor::new(
            HealthMonitorConfig::from(&config),
            server.probe_url(),
            Arc::clone(&prober),
        );
        let initial = SupervisorSnapshot {
            phase: Phase::Idle,
            attempt_count: 0,
            max_attempts: config.max_attempts,
            generation: 0,
            pid: None,
            last_error: None,
            health: ServerHealth::Unknown,
            monitoring_active: false,
            server_url: server.url(),
        };
        let (snapshot_tx, _) = watch::channel(initial);

        Self {
            detector: ReadinessDetector::new(server.readiness_markers.clone()),
            recovery: RecoveryCoordinator::new(config.connection_grace()),
            config,
            server,
            spec,
            controller,
            prober,
            state: SupervisorState::new(),
            health,
            lifecycle: Arc::new(ServerLifecycleManager::new()),
            process: None,
            generation: 0,
            pending: Vec::new(),
            events_tx,
            events_rx,
            snapshot_tx,
            notify_tx,
        }
    }

    /// Share an existing lifecycle history instead of a private one.
    pub fn with_lifecycle(mut self, lifecycle: Arc<ServerLifecycleManager>) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Moves the supervisor onto its own task.
    pub fn spawn(self) -> SupervisorHandle {
        let (command_tx, command_rx) = mpsc::channel(32);
        let snapshot_rx = self.snapshot_tx.subscribe();
        let notify_tx = self.notify_tx.clone();
        let lifecycle = Arc::clone(&self.lifecycle);

        let task = tokio::spawn(self.run(command_rx));

        SupervisorHandle {
            commands: command_tx,
            snapshot: snapshot_rx,
            notifications: notify_tx,
            lifecycle,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<SupervisorCommand>) {
        tracing::debug!(server_url = %self.server.url(), "Supervisor task started");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SupervisorCommand::Start) => self.start_attempt().await,
                    Some(SupervisorCommand::Restart(reply)) => {
                        let accepted = self.restart("restart requested").await;
                        let _ = reply.send(accepted);
                    }
                    Some(SupervisorCommand::Shutdown(reply)) => {
                        self.shutdown().await;
                        let _ = reply.send(());
                        break;
                    }
                    None => {
                        self.shutdown().await;
                        break;
                    }
                },
                Some(event) = self.events_rx.recv() => self.dispatch(event).await,
            }
        }

        tracing::debug!("Supervisor task finished");
    }

    async fn dispatch(&mut self, event: SupervisorEvent) {
        if event.generation() != self.generation {
            tracing::trace!(
                event_generation = event.generation(),
                current_generation = self.generation,
                "Discarding stale event"
            );
            return;
        }

        match event {
            SupervisorEvent::Process {
                event: ProcessEvent::Output { stream, line },
                ..
            } => self.on_output(stream, &line),
            SupervisorEvent::Process {
                event: ProcessEvent::Exited(exit),
                ..
            } => self.on_exit(exit).await,
            SupervisorEvent::ProbeDue { attempt, .. } => {
                if self.state.phase == Phase::ProbingHttp {
                    self.spawn_probe(attempt);
                }
            }
            SupervisorEvent::ProbeCompleted { attempt, result, .. } => {
                self.on_probe_result(attempt, result).await
            }
            SupervisorEvent::ReadinessTimedOut { .. } => {
                if self.state.phase == Phase::AwaitingReadinessSignal {
                    let timeout = self.config.readiness_timeout();
                    self.fail_attempt(Error::ReadinessTimeout(format!("{}s", timeout.as_secs())))
                        .await;
                }
            }
            SupervisorEvent::BackoffElapsed { .. } => {
                if self.state.phase == Phase::Failed {
                    self.start_attempt().await;
                }
            }
            SupervisorEvent::HealthProbe { result, .. } => self.on_health_probe(result).await,
        }
    }

    #[tracing::instrument(skip(self), fields(generation = self.generation))]
    async fn start_attempt(&mut self) {
        if self.state.phase.is_active() {
            tracing::debug!(phase = %self.state.phase, "Start ignored, backend already starting or serving");
            return;
        }

        self.state.attempt_count += 1;
        let attempt = self.state.attempt_count;
        let max = self.config.max_attempts;

        if attempt > max {
            let last_error = self
                .state
                .last_error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            self.give_up(Error::AttemptBudgetExhausted {
                attempts: max,
                last_error,
            });
            return;
        }

        self.begin_generation();
        self.detector.reset();
        self.transition(Phase::Spawning);
        self.notify_status(format!("Starting server ({}/{})...", attempt, max));

        if self.config.check_port
            && !self
                .prober
                .is_port_free(&self.server.host, self.server.port)
                .await
        {
            let address = format!("{}:{}", self.server.host, self.server.port);
            self.fail_attempt(Error::PortInUse(address)).await;
            return;
        }

        match self.controller.spawn(&self.spec).await {
            Ok(SpawnedProcess { handle, mut events }) => {
                let pid = handle.pid();
                tracing::info!(pid, attempt, max, "Backend spawned");
                self.record(
                    ServerLifecycleEvent::Spawned,
                    Some(format!("pid {} (attempt {}/{})", pid, attempt, max)),
                );
                self.process = Some(handle);

                let tx = self.events_tx.clone();
                let generation = self.generation;
                self.track(tokio::spawn(async move {
                    while let Some(event) = events.recv().await {
                        if tx.send(SupervisorEvent::Process { generation, event }).is_err() {
                            break;
                        }
                    }
                }));

                self.transition(Phase::AwaitingReadinessSignal);
                self.schedule(
                    self.config.readiness_timeout(),
                    SupervisorEvent::ReadinessTimedOut { generation },
                );
            }
            Err(e) if e.is_fatal() => self.give_up(e),
            Err(e) => self.fail_attempt(e).await,
        }
    }

    fn on_output(&mut self, stream: OutputStream, line: &str) {
        match stream {
            OutputStream::Stdout => tracing::info!(target: "backend", "{}", line),
            OutputStream::Stderr if line.to_lowercase().contains("warning") => {
                tracing::debug!(target: "backend", "{}", line)
            }
            OutputStream::Stderr => tracing::warn!(target: "backend", "{}", line),
        }

        // Readiness is only announced on stdout.
        if stream != OutputStream::Stdout
            || self.state.phase != Phase::AwaitingReadinessSignal
            || !self.detector.observe(line)
        {
            return;
        }

        let marker = self.detector.matched_marker().map(str::to_string);
        tracing::info!(marker = ?marker, "Backend reported ready, probing");
        self.record(ServerLifecycleEvent::ReadinessObserved, marker);
        self.transition(Phase::ProbingHttp);
        self.notify_status("Server ready, connecting...");
        self.schedule(
            self.config.settle_delay(),
            SupervisorEvent::ProbeDue {
                generation: self.generation,
                attempt: 0,
            },
        );
    }

    fn spawn_probe(&mut self, attempt: u32) {
        let prober = Arc::clone(&self.prober);
        let url = self.server.probe_url();
        let timeout = self.config.probe_timeout();
        let tx = self.events_tx.clone();
        let generation = self.generation;

        self.track(tokio::spawn(async move {
            let result = prober.probe_http(&url, timeout).await;
            let _ = tx.send(SupervisorEvent::ProbeCompleted {
                generation,
                attempt,
                result,
            });
        }));
    }

    async fn on_probe_result(&mut self, attempt: u32, result: ProbeResult) {
        if self.state.phase != Phase::ProbingHttp {
            return;
        }

        if is_success(&result) {
            let url = self.server.url();
            tracing::info!(%url, probes = attempt + 1, "Backend is serving");
            self.state.attempt_count = 0;
            self.state.last_error = None;
            self.transition(Phase::Serving);
            self.recovery.episode_started();
            self.health.start(self.generation, self.events_tx.clone());
            self.record(ServerLifecycleEvent::Serving, Some(url.clone()));
            self.notify(Notification::ServerReady { url });
            self.publish();
            return;
        }

        let retries = self.config.probe_retries;
        tracing::warn!(
            probe = attempt + 1,
            total = retries + 1,
            outcome = %describe(&result),
            "Readiness probe failed"
        );

        if attempt < retries {
            self.notify_status(format!("Connection test ({}/{})...", attempt + 1, retries));
            self.schedule(
                self.config.probe_interval(),
                SupervisorEvent::ProbeDue {
                    generation: self.generation,
                    attempt: attempt + 1,
                },
            );
        } else {
            self.fail_attempt(Error::ProbeFailure(format!(
                "{} after {} probes",
                describe(&result),
                retries + 1
            )))
            .await;
        }
    }

    async fn on_exit(&mut self, exit: ExitInfo) {
        self.process = None;

        match self.recovery.on_process_exit(exit, self.state.phase) {
            RecoveryAction::RetryAttempt(error) => {
                tracing::error!(%exit, phase = %self.state.phase, "Backend exited unexpectedly");
                self.record(ServerLifecycleEvent::Crashed, Some(exit.to_string()));
                self.fail_attempt(error).await;
            }
            RecoveryAction::Stop => {
                tracing::info!(%exit, "Backend stopped");
                self.begin_generation();
                self.transition(Phase::Idle);
                self.record(ServerLifecycleEvent::Stopped, Some(exit.to_string()));
                self.notify_status("Server stopped");
            }
            RecoveryAction::FullRestart(_) | RecoveryAction::None => {
                tracing::debug!(%exit, "Ignoring exit of a process no longer supervised");
            }
        }
    }

    async fn on_health_probe(&mut self, result: ProbeResult) {
        if self.state.phase != Phase::Serving || !self.health.is_active() {
            return;
        }

        let now = Instant::now();
        let was_failing = self.health.state().consecutive_failures > 0;
        if self.health.record(&result, now) {
            if was_failing {
                tracing::info!("Health check recovered");
                self.publish();
            }
            return;
        }

        tracing::warn!(
            outcome = %describe(&result),
            failures = self.health.state().consecutive_failures,
            "Health check failed"
        );

        match self.recovery.on_probe_failure(self.health.state(), now) {
            RecoveryAction::FullRestart(error) => {
                tracing::error!(%error, "Connection to backend lost");
                self.record(ServerLifecycleEvent::ConnectionLost, Some(error.to_string()));
                self.state.last_error = Some(error);
                self.notify(Notification::ConnectionLost);
                self.notify_status("Reconnecting...");
                self.restart("connection lost").await;
            }
            _ => self.publish(),
        }
    }

    /// Ends the current attempt and schedules the next one after backoff.
    async fn fail_attempt(&mut self, error: Error) {
        // A crash while serving arrives with the counter already reset.
        let attempt = self.state.attempt_count.max(1);
        let max = self.config.max_attempts;
        tracing::warn!(attempt, max, %error, "Start-up attempt failed");

        self.begin_generation();
        self.stop_process().await;
        self.state.last_error = Some(error.clone());
        self.transition(Phase::Failed);
        self.record(ServerLifecycleEvent::AttemptFailed, Some(error.to_string()));

        if attempt < max {
            self.notify_status(format!("Restarting server ({}/{})...", attempt, max));
        }
        self.schedule(
            self.config.restart_backoff(),
            SupervisorEvent::BackoffElapsed {
                generation: self.generation,
            },
        );
    }

    /// Stops retrying and reports a fatal error.
    fn give_up(&mut self, error: Error) {
        tracing::error!(%error, "Backend supervision gave up");
        self.begin_generation();
        self.state.last_error = Some(error.clone());
        if self.state.phase != Phase::Failed {
            self.transition(Phase::Failed);
        } else {
            self.publish();
        }
        self.record(ServerLifecycleEvent::GaveUp, Some(error.to_string()));
        self.notify(Notification::ErrorMessage(ErrorDetails::from_error(&error)));
    }

    #[tracing::instrument(skip(self), fields(generation = self.generation))]
    async fn restart(&mut self, reason: &str) -> bool {
        tracing::info!("Restarting backend");

        self.begin_generation();
        self.stop_process().await;
        if self.state.phase != Phase::Idle {
            self.transition(Phase::Idle);
        }
        self.state.attempt_count = 0;
        self.record(ServerLifecycleEvent::Restarted, Some(reason.to_string()));

        self.start_attempt().await;
        !(self.state.phase == Phase::Failed
            && self.state.last_error.as_ref().is_some_and(Error::is_fatal))
    }

    async fn shutdown(&mut self) {
        tracing::info!("Shutting down backend");

        self.begin_generation();
        self.stop_process().await;
        if self.state.phase != Phase::Idle {
            self.transition(Phase::Idle);
        }
        self.record(ServerLifecycleEvent::Stopped, Some("shutdown".to_string()));
    }

    async fn stop_process(&mut self) {
        if let Some(handle) = self.process.take() {
            if let Err(e) = self
                .controller
                .terminate(&handle, self.config.terminate_grace())
                .await
            {
                tracing::error!(pid = handle.pid(), error = %e, "Failed to stop backend");
            }
        }
    }

    /// Cancels all pending timers, probes and forwarders, and invalidates
    /// events they may already have queued.
    fn begin_generation(&mut self) {
        for task in self.pending.drain(..) {
            task.abort();
        }
        self.generation += 1;
    }

    fn track(&mut self, task: JoinHandle<()>) {
        self.pending.retain(|t| !t.is_finished());
        self.pending.push(task);
    }

    fn schedule(&mut self, delay: Duration, event: SupervisorEvent) {
        let tx = self.events_tx.clone();
        self.track(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(event);
        }));
    }

    fn transition(&mut self, next: Phase) {
        let from = self.state.phase;
        if let Err(e) = self.state.advance(next) {
            tracing::error!(error = %e, "Rejected phase transition");
            return;
        }
        if next != Phase::Serving {
            self.health.stop();
        }
        tracing::debug!(%from, to = %next, attempt = self.state.attempt_count, "Phase changed");
        self.publish();
    }

    fn record(&self, event: ServerLifecycleEvent, details: Option<String>) {
        if let Err(e) = self.lifecycle.record_event(self.generation, event, details) {
            tracing::warn!(error = %e, "Failed to record lifecycle event");
        }
    }

    fn notify_status(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(status = %message, "Status update");
        self.notify(Notification::StatusUpdate(message));
    }

    fn notify(&self, notification: Notification) {
        // No subscribers is fine.
        let _ = self.notify_tx.send(notification);
    }

    fn snapshot(&self) -> SupervisorSnapshot {
        SupervisorSnapshot {
            phase: self.state.phase,
            attempt_count: self.state.attempt_count,
            max_attempts: self.config.max_attempts,
            generation: self.generation,
            pid: self.process.as_ref().map(ProcessHandle::pid),
            last_error: self.state.last_error.as_ref().map(|e| e.to_string()),
            health: self.health.health(Instant::now()),
            monitoring_active: self.health.is_active(),
            server_url: self.server.url(),
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }
}

/// Cloneable handle to a running [`Supervisor`] task.
#[derive(Clone)]
pub struct SupervisorHandle {
    commands: mpsc::Sender<SupervisorCommand>,
    snapshot: watch::Receiver<SupervisorSnapshot>,
    notifications: broadcast::Sender<Notification>,
    lifecycle: Arc<ServerLifecycleManager>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SupervisorHandle {
    /// Begin starting the backend.
    pub async fn start(&self) -> Result<()> {
        self.send(SupervisorCommand::Start).await
    }

    /// Restart the backend with a fresh attempt budget.
    ///
    /// Returns `false` only when the new attempt failed fatally; a non-fatal
    /// failure still has a retry scheduled.
    pub async fn restart(&self) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.send(SupervisorCommand::Restart(tx)).await?;
        rx.await
            .map_err(|_| Error::Communication("Supervisor dropped restart request".to_string()))
    }

    /// Stop the backend and wait for the supervisor task to finish.
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(SupervisorCommand::Shutdown(tx)).await.is_ok() {
            let _ = rx.await;
        }

        let task = {
            let mut guard = self
                .task
                .lock()
                .map_err(|_| Error::Other("Failed to lock supervisor task".to_string()))?;
            guard.take()
        };

        if let Some(task) = task {
            match tokio::time::timeout(SHUTDOWN_WAIT, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_cancelled() => {}
                Ok(Err(e)) => {
                    return Err(Error::Other(format!("Supervisor task panicked: {}", e)));
                }
                Err(_) => {
                    return Err(Error::Timeout("Supervisor did not stop in time".to_string()));
                }
            }
        }

        Ok(())
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> SupervisorSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that observes every published snapshot.
    pub fn watch(&self) -> watch::Receiver<SupervisorSnapshot> {
        self.snapshot.clone()
    }

    /// Waits until a snapshot satisfies `predicate`.
    pub async fn wait_until<F>(&self, timeout: Duration, mut predicate: F) -> Result<SupervisorSnapshot>
    where
        F: FnMut(&SupervisorSnapshot) -> bool,
    {
        let mut rx = self.snapshot.clone();
        let waited = tokio::time::timeout(timeout, async move {
            let reached = rx.wait_for(|s| predicate(s)).await.map(|s| (*s).clone());
            reached
        })
        .await;

        match waited {
            Ok(Ok(snapshot)) => Ok(snapshot),
            Ok(Err(_)) => Err(Error::NotRunning),
            Err(_) => Err(Error::Timeout(format!(
                "Supervisor state not reached within {:?}",
                timeout
            ))),
        }
    }

    /// Subscribe to shell notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    /// Lifecycle event history.
    pub fn lifecycle(&self) -> Arc<ServerLifecycleManager> {
        Arc::clone(&self.lifecycle)
    }

    async fn send(&self, command: SupervisorCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| Error::NotRunning)
    }
}
