use crate::config::SupervisorConfig;
use crate::probe::{ProbeResult, Prober, is_success};
use crate::server::supervisor::SupervisorEvent;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Server health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ServerHealth {
    /// Last health check succeeded
    Healthy,
    /// Health checks are failing, still within the grace period
    Degraded,
    /// No successful health check for longer than the grace period
    Unhealthy,
    /// Not monitored
    Unknown,
}

/// Health monitor configuration
#[derive(Debug, Clone)]
pub struct HealthMonitorConfig {
    /// Check interval
    pub check_interval: Duration,
    /// Health check timeout
    pub health_check_timeout: Duration,
    /// How long checks may fail before the connection counts as lost
    pub connection_grace: Duration,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self::from(&SupervisorConfig::default())
    }
}

impl From<&SupervisorConfig> for HealthMonitorConfig {
    fn from(config: &SupervisorConfig) -> Self {
        Self {
            check_interval: config.health_interval(),
            health_check_timeout: config.health_timeout(),
            connection_grace: config.connection_grace(),
        }
    }
}

/// Health bookkeeping of the serving backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthState {
    /// Time of the last successful health check, or of entering `Serving`
    pub last_successful_contact: Instant,
    /// `true` exactly while the backend is serving
    pub monitoring_active: bool,
    /// Failed checks since the last success
    pub consecutive_failures: u32,
}

impl HealthState {
    fn inactive() -> Self {
        Self {
            last_successful_contact: Instant::now(),
            monitoring_active: false,
            consecutive_failures: 0,
        }
    }

    /// Time elapsed since the last successful contact
    pub fn time_since_contact(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_successful_contact)
    }
}

/// Periodic health checks against the serving backend.
///
/// The monitor only schedules probes; results go back to the supervisor as
/// [`SupervisorEvent::HealthProbe`] so that all state changes happen on the
/// supervisor task.
pub struct HealthMonitor {
    /// Monitor configuration
    config: HealthMonitorConfig,
    /// URL probed on every tick
    url: String,
    /// Network checks
    prober: Arc<dyn Prober>,
    /// Health bookkeeping
    state: HealthState,
    /// Monitor task
    monitor_task: Option<JoinHandle<()>>,
}

impl HealthMonitor {
    /// Create a new health monitor
    pub fn new(config: HealthMonitorConfig, url: impl Into<String>, prober: Arc<dyn Prober>) -> Self {
        Self {
            config,
            url: url.into(),
            prober,
            state: HealthState::inactive(),
            monitor_task: None,
        }
    }

    /// Start the monitor for one serving episode.
    ///
    /// The first check runs one interval after the call.
    pub(crate) fn start(&mut self, generation: u64, events: mpsc::UnboundedSender<SupervisorEvent>) {
        self.stop();

        self.state = HealthState {
            last_successful_contact: Instant::now(),
            monitoring_active: true,
            consecutive_failures: 0,
        };

        let prober = Arc::clone(&self.prober);
        let url = self.url.clone();
        let period = self.config.check_interval;
        let timeout = self.config.health_check_timeout;

        let task = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                let result = prober.probe_http(&url, timeout).await;
                if events
                    .send(SupervisorEvent::HealthProbe { generation, result })
                    .is_err()
                {
                    break;
                }
            }
        });

        tracing::debug!(
            interval_ms = period.as_millis() as u64,
            generation,
            "Health monitoring started"
        );
        self.monitor_task = Some(task);
    }

    /// Stop the monitor
    pub fn stop(&mut self) {
        if let Some(task) = self.monitor_task.take() {
            task.abort();
            tracing::debug!("Health monitoring stopped");
        }
        self.state.monitoring_active = false;
    }

    /// Records a health check result; returns `true` on success.
    pub fn record(&mut self, result: &ProbeResult, now: Instant) -> bool {
        if is_success(result) {
            self.state.last_successful_contact = now;
            self.state.consecutive_failures = 0;
            true
        } else {
            self.state.consecutive_failures += 1;
            false
        }
    }

    pub fn state(&self) -> &HealthState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.monitoring_active
    }

    /// Get server health
    pub fn health(&self, now: Instant) -> ServerHealth {
        if !self.state.monitoring_active {
            ServerHealth::Unknown
        } else if self.state.consecutive_failures == 0 {
            ServerHealth::Healthy
        } else if self.state.time_since_contact(now) > self.config.connection_grace {
            ServerHealth::Unhealthy
        } else {
            ServerHealth::Degraded
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.monitor_task.take() {
            task.abort();
        }
    }
}
