// Scripted fakes shared by the supervisor, launcher and bridge tests.
#![allow(dead_code)]

use async_trait::async_trait;
use backend_supervisor::config::{ServerConfig, SupervisorConfig};
use backend_supervisor::error::{Error, Result};
use backend_supervisor::probe::{ProbeError, ProbeResult, Prober, StatusCode};
use backend_supervisor::server::{
    ExitInfo, LaunchSpec, OutputStream, ProcessController, ProcessEvent, ProcessHandle,
    SpawnedProcess, Supervisor, SupervisorHandle,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const READY_LINE: &str = "INFO:     Application startup complete.";

/// What one fake backend process does.
#[derive(Debug, Clone)]
pub enum Script {
    /// Prints the lines, then runs until killed
    Serve(Vec<String>),
    /// Prints the lines, then exits with `code` after `after`
    Exit {
        lines: Vec<String>,
        code: i32,
        after: Duration,
    },
    /// Prints the lines on stderr, then runs until killed
    ServeStderr(Vec<String>),
    /// Spawning fails
    Fail(Error),
}

impl Script {
    /// Prints the readiness line and keeps running
    pub fn ready() -> Self {
        Script::Serve(vec![
            "Performing system checks...".to_string(),
            READY_LINE.to_string(),
        ])
    }

    /// Never prints a readiness line
    pub fn silent() -> Self {
        Script::Serve(vec!["Booting worker".to_string()])
    }

    /// Crashes shortly after start
    pub fn crash(code: i32) -> Self {
        Script::Exit {
            lines: vec!["Traceback (most recent call last):".to_string()],
            code,
            after: Duration::from_millis(200),
        }
    }
}

/// [`ProcessController`] that plays back scripts instead of spawning processes.
pub struct ScriptedController {
    scripts: Mutex<VecDeque<Script>>,
    fallback: Script,
    spawns: AtomicU32,
    terminations: AtomicU32,
}

impl ScriptedController {
    pub fn new(scripts: Vec<Script>, fallback: Script) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            fallback,
            spawns: AtomicU32::new(0),
            terminations: AtomicU32::new(0),
        })
    }

    pub fn spawn_count(&self) -> u32 {
        self.spawns.load(Ordering::SeqCst)
    }

    pub fn terminate_count(&self) -> u32 {
        self.terminations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessController for ScriptedController {
    async fn spawn(&self, _spec: &LaunchSpec) -> Result<SpawnedProcess> {
        let count = self.spawns.fetch_add(1, Ordering::SeqCst) + 1;
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        let (stream, lines, exit) = match script {
            Script::Fail(error) => return Err(error),
            Script::Serve(lines) => (OutputStream::Stdout, lines, None),
            Script::ServeStderr(lines) => (OutputStream::Stderr, lines, None),
            Script::Exit { lines, code, after } => {
                (OutputStream::Stdout, lines, Some((code, after)))
            }
        };

        let (handle, tracker) = ProcessHandle::new(1000 + count);
        tracker.set_running();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            for line in lines {
                tokio::time::sleep(Duration::from_millis(10)).await;
                let _ = tx.send(ProcessEvent::Output { stream, line });
            }

            let exit = match exit {
                Some((code, after)) => tokio::select! {
                    _ = tokio::time::sleep(after) => ExitInfo::code(code),
                    _ = tracker.kill_requested() => ExitInfo::signaled(15),
                },
                None => {
                    tracker.kill_requested().await;
                    ExitInfo::signaled(15)
                }
            };

            tracker.report_exit(exit);
            let _ = tx.send(ProcessEvent::Exited(exit));
        });

        Ok(SpawnedProcess { handle, events: rx })
    }

    async fn terminate(&self, handle: &ProcessHandle, grace: Duration) -> Result<()> {
        self.terminations.fetch_add(1, Ordering::SeqCst);
        if !handle.is_alive() {
            return Ok(());
        }
        handle.request_kill();
        handle.wait_for_exit(grace).await;
        Ok(())
    }
}

/// [`Prober`] whose answers are scripted or driven by a health flag.
pub struct ScriptedProber {
    responses: Mutex<VecDeque<ProbeResult>>,
    healthy: AtomicBool,
    port_free: AtomicBool,
    delay: Duration,
    probes: AtomicU32,
}

impl ScriptedProber {
    /// Answers 200 until told otherwise
    pub fn healthy() -> Arc<Self> {
        Self::build(vec![], true, Duration::ZERO)
    }

    /// Answers with `responses` first, then 200
    pub fn sequence(responses: Vec<ProbeResult>) -> Arc<Self> {
        Self::build(responses, true, Duration::ZERO)
    }

    /// Never answers successfully
    pub fn unreachable() -> Arc<Self> {
        Self::build(vec![], false, Duration::ZERO)
    }

    /// Answers 200 after `delay`
    pub fn slow(delay: Duration) -> Arc<Self> {
        Self::build(vec![], true, delay)
    }

    fn build(responses: Vec<ProbeResult>, healthy: bool, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            healthy: AtomicBool::new(healthy),
            port_free: AtomicBool::new(true),
            delay,
            probes: AtomicU32::new(0),
        })
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_port_free(&self, free: bool) {
        self.port_free.store(free, Ordering::SeqCst);
    }

    pub fn probe_count(&self) -> u32 {
        self.probes.load(Ordering::SeqCst)
    }
}

pub fn refused() -> ProbeResult {
    Err(ProbeError::Connect("connection refused".to_string()))
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn is_port_free(&self, _host: &str, _port: u16) -> bool {
        self.port_free.load(Ordering::SeqCst)
    }

    async fn probe_http(&self, _url: &str, _timeout: Duration) -> ProbeResult {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(response) = self.responses.lock().unwrap().pop_front() {
            return response;
        }
        if self.healthy.load(Ordering::SeqCst) {
            Ok(StatusCode::OK)
        } else {
            refused()
        }
    }
}

/// Short timings for tests that run on the real clock
pub fn fast_config() -> SupervisorConfig {
    SupervisorConfig {
        settle_delay_ms: 10,
        probe_interval_ms: 20,
        restart_backoff_ms: 20,
        terminate_grace_ms: 200,
        ..Default::default()
    }
}

/// Supervisor with default timings around the given fakes
pub fn spawn_supervisor(
    controller: Arc<dyn ProcessController>,
    prober: Arc<dyn Prober>,
) -> SupervisorHandle {
    spawn_supervisor_with(SupervisorConfig::default(), controller, prober)
}

pub fn spawn_supervisor_with(
    config: SupervisorConfig,
    controller: Arc<dyn ProcessController>,
    prober: Arc<dyn Prober>,
) -> SupervisorHandle {
    Supervisor::new(
        config,
        ServerConfig::default(),
        LaunchSpec::new("/opt/welto/server"),
        controller,
        prober,
    )
    .spawn()
}
