/// Backend process supervision.
///
/// This module starts the backend, decides when it is ready, watches its
/// health and restarts it when it crashes or stops answering. All state
/// changes happen on one supervisor task; see [`Supervisor`].
///
/// # Components
///
/// * `process` - Spawning and terminating the backend process
/// * `readiness` - Readiness markers in the backend's output
/// * `supervisor` - The phase state machine and its task handle
/// * `monitor` - Periodic health checks while serving
/// * `recovery` - Crash and connection-loss decisions
/// * `lifecycle` - Bounded history of lifecycle events
///
/// # Examples
///
/// Supervising a packaged backend:
///
/// ```no_run
/// use backend_supervisor::config::{ServerConfig, SupervisorConfig};
/// use backend_supervisor::probe::HttpProber;
/// use backend_supervisor::server::{LaunchSpec, ServerProcess, Supervisor};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn run() -> backend_supervisor::Result<()> {
/// let supervisor = Supervisor::new(
///     SupervisorConfig::default(),
///     ServerConfig::default(),
///     LaunchSpec::new("resources/server/server"),
///     Arc::new(ServerProcess::new("backend")),
///     Arc::new(HttpProber::new()?),
/// );
///
/// let handle = supervisor.spawn();
/// handle.start().await?;
/// let snapshot = handle
///     .wait_until(Duration::from_secs(120), |s| s.server_running())
///     .await?;
/// println!("Serving at {}", snapshot.server_url);
/// handle.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub mod lifecycle;
pub mod monitor;
mod process;
pub mod readiness;
pub mod recovery;
pub mod supervisor;

pub use lifecycle::{ServerEvent, ServerLifecycleEvent, ServerLifecycleManager};
pub use monitor::{HealthMonitor, HealthMonitorConfig, HealthState, ServerHealth};
pub use process::{
    ExitInfo, LaunchSpec, OutputStream, ProcessController, ProcessEvent, ProcessHandle,
    ProcessStatus, ProcessTracker, ServerProcess, SpawnedProcess,
};
pub use readiness::ReadinessDetector;
pub use recovery::{RecoveryAction, RecoveryCoordinator};
pub use supervisor::{
    ErrorDetails, Notification, Phase, Supervisor, SupervisorCommand, SupervisorEvent,
    SupervisorHandle, SupervisorSnapshot, SupervisorState,
};
