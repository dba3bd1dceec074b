//! Type definitions for the shell bridge.
//!
//! This module contains the request and response bodies of the bridge
//! endpoints and the wire form of server-sent events.

use crate::server::{ServerEvent, SupervisorSnapshot};
use serde::{Deserialize, Serialize};

/// Response of `GET /app-info`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInfo {
    /// Application name
    pub name: String,
    /// Application version
    pub version: String,
    /// Whether the backend is serving
    pub server_running: bool,
    /// Backend URL the shell should load
    pub server_url: String,
}

/// Response of `POST /restart`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartResponse {
    /// Whether a new start-up attempt is under way
    pub restarted: bool,
}

/// Query of `GET /logs`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogsQuery {
    /// Maximum number of events, newest first
    pub limit: Option<usize>,
}

/// Response of `GET /logs`
#[derive(Debug, Clone, Serialize)]
pub struct LogsResponse {
    /// Current supervisor state
    pub snapshot: SupervisorSnapshot,
    /// Lifecycle events, newest first
    pub events: Vec<ServerEvent>,
}

/// Server-Sent Event message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SSEMessage {
    /// Event type
    pub event: String,
    /// Event data as JSON string
    pub data: String,
    /// Optional event ID
    pub id: Option<String>,
}

impl SSEMessage {
    /// Creates a new SSE message with the given event type, data payload, and optional ID
    pub fn new(event: &str, data: &str, id: Option<&str>) -> Self {
        Self {
            event: event.to_string(),
            data: data.to_string(),
            id: id.map(String::from),
        }
    }
}
