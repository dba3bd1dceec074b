//! Decides what to do when the backend stops answering or exits.

use crate::error::Error;
use crate::server::monitor::HealthState;
use crate::server::process::ExitInfo;
use crate::server::supervisor::Phase;
use std::time::Duration;
use tokio::time::Instant;

/// What the supervisor should do after a failure signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Keep going
    None,
    /// Tear down and start over with a fresh attempt budget
    FullRestart(Error),
    /// Count a failed attempt and retry after backoff
    RetryAttempt(Error),
    /// The backend stopped on purpose; do not restart
    Stop,
}

/// Turns probe failures and process exits into [`RecoveryAction`]s.
#[derive(Debug, Clone)]
pub struct RecoveryCoordinator {
    grace: Duration,
    loss_declared: bool,
}

impl RecoveryCoordinator {
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            loss_declared: false,
        }
    }

    /// Starts a new serving episode; connection loss may be declared again.
    pub fn episode_started(&mut self) {
        self.loss_declared = false;
    }

    pub fn loss_declared(&self) -> bool {
        self.loss_declared
    }

    /// Called after a failed health probe.
    ///
    /// Declares connection loss once the last successful contact is older
    /// than the grace period, and at most once per serving episode.
    pub fn on_probe_failure(&mut self, health: &HealthState, now: Instant) -> RecoveryAction {
        if !health.monitoring_active || self.loss_declared {
            return RecoveryAction::None;
        }

        let silent_for = health.time_since_contact(now);
        if silent_for <= self.grace {
            tracing::debug!(
                silent_ms = silent_for.as_millis() as u64,
                grace_ms = self.grace.as_millis() as u64,
                "Health check failed within grace period"
            );
            return RecoveryAction::None;
        }

        self.loss_declared = true;
        RecoveryAction::FullRestart(Error::ConnectionLoss(format!(
            "no successful health check for {}s",
            silent_for.as_secs()
        )))
    }

    /// Called when the backend process exited on its own.
    pub fn on_process_exit(&mut self, exit: ExitInfo, phase: Phase) -> RecoveryAction {
        match phase {
            // Nobody is waiting on a process in these phases.
            Phase::Idle | Phase::Failed => RecoveryAction::None,
            _ if exit.is_clean() => RecoveryAction::Stop,
            _ => RecoveryAction::RetryAttempt(Error::ProcessCrash(format!(
                "{} while {}",
                exit, phase
            ))),
        }
    }
}
