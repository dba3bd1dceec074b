use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Default number of events kept in memory
pub const DEFAULT_EVENT_CAPACITY: usize = 1000;

/// Server lifecycle event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServerLifecycleEvent {
    /// Backend process spawned
    Spawned,
    /// Readiness marker seen in the output
    ReadinessObserved,
    /// First successful HTTP probe
    Serving,
    /// Backend exited with a failure status
    Crashed,
    /// Health checks failed for longer than the grace period
    ConnectionLost,
    /// A start-up attempt failed and will be retried
    AttemptFailed,
    /// The supervisor stopped retrying
    GaveUp,
    /// Restart requested or triggered by recovery
    Restarted,
    /// Backend stopped on purpose
    Stopped,
}

/// Server lifecycle event
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerEvent {
    /// Start-up generation the event belongs to
    pub generation: u64,
    /// Event type
    pub event: ServerLifecycleEvent,
    /// Event timestamp
    pub timestamp: DateTime<Utc>,
    /// Event details
    pub details: Option<String>,
}

/// Bounded history of supervisor lifecycle events.
///
/// Shared between the supervisor task, which records, and the shell bridge,
/// which reads.
pub struct ServerLifecycleManager {
    /// Recorded events, oldest first
    events: Arc<Mutex<VecDeque<ServerEvent>>>,
    /// Maximum number of retained events
    capacity: usize,
}

impl ServerLifecycleManager {
    /// Create a new server lifecycle manager
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Create a manager that keeps at most `capacity` events
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(64)))),
            capacity: capacity.max(1),
        }
    }

    /// Record a server event
    pub fn record_event(
        &self,
        generation: u64,
        event: ServerLifecycleEvent,
        details: Option<String>,
    ) -> Result<()> {
        let server_event = ServerEvent {
            generation,
            event,
            timestamp: Utc::now(),
            details,
        };

        let mut events = self
            .events
            .lock()
            .map_err(|_| Error::Other("Failed to lock server events".to_string()))?;

        events.push_back(server_event);

        while events.len() > self.capacity {
            events.pop_front();
        }

        Ok(())
    }

    /// Get recent events, newest first
    pub fn recent_events(&self, limit: Option<usize>) -> Result<Vec<ServerEvent>> {
        let events = self
            .events
            .lock()
            .map_err(|_| Error::Other("Failed to lock server events".to_string()))?;

        let limit = limit.unwrap_or(events.len());
        Ok(events.iter().rev().take(limit).cloned().collect())
    }

    /// Count recorded events of one type
    pub fn count(&self, event: ServerLifecycleEvent) -> usize {
        self.events
            .lock()
            .map(|events| events.iter().filter(|e| e.event == event).count())
            .unwrap_or(0)
    }

    /// Most recent event
    pub fn last_event(&self) -> Option<ServerEvent> {
        self.events.lock().ok().and_then(|events| events.back().cloned())
    }

    /// Clear events
    pub fn clear_events(&self) -> Result<()> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| Error::Other("Failed to lock server events".to_string()))?;

        events.clear();

        Ok(())
    }
}

impl Default for ServerLifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}
