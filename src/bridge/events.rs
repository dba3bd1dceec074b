//! SSE event management for the shell bridge.
//!
//! Supervisor notifications are re-broadcast to every connected SSE client
//! as named events: `status-update`, `error-message`, `server-ready` and
//! `connection-lost`.

use crate::bridge::types::SSEMessage;
use crate::server::{Notification, SupervisorSnapshot};
use actix_web::web::Bytes;
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Event name of the snapshot sent to every new client
pub const SNAPSHOT_EVENT: &str = "snapshot";

/// Broadcasts SSE messages to connected clients
#[derive(Clone)]
pub struct EventManager {
    /// Broadcast channel for sending events to all connected clients
    sender: broadcast::Sender<SSEMessage>,
}

impl EventManager {
    /// Create a new EventManager with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<SSEMessage> {
        self.sender.subscribe()
    }

    /// SSE message carrying a supervisor notification
    pub fn notification_message(notification: &Notification) -> Option<SSEMessage> {
        let (event, data) = match notification {
            Notification::StatusUpdate(message) => ("status-update", to_json(&json!({ "message": message }))?),
            Notification::ErrorMessage(details) => ("error-message", to_json(details)?),
            Notification::ServerReady { url } => ("server-ready", to_json(&json!({ "url": url }))?),
            Notification::ConnectionLost => ("connection-lost", "{}".to_string()),
        };
        Some(SSEMessage::new(event, &data, None))
    }

    /// SSE message carrying a supervisor snapshot
    pub fn snapshot_message(snapshot: &SupervisorSnapshot) -> Option<SSEMessage> {
        to_json(snapshot).map(|data| SSEMessage::new(SNAPSHOT_EVENT, &data, None))
    }

    /// Broadcast a supervisor notification
    pub fn send_notification(&self, notification: &Notification) {
        if let Some(message) = Self::notification_message(notification) {
            let event = message.event.clone();
            self.send_sse_message(message, &event);
        }
    }

    /// Re-broadcasts supervisor notifications until the supervisor goes away.
    pub fn forward(&self, mut notifications: broadcast::Receiver<Notification>) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            loop {
                match notifications.recv().await {
                    Ok(notification) => manager.send_notification(&notification),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Bridge fell behind supervisor notifications");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            tracing::debug!("Notification forwarder stopped");
        })
    }

    fn send_sse_message(&self, message: SSEMessage, event_type_name: &str) {
        match self.sender.send(message) {
            Ok(receiver_count) => {
                tracing::debug!(
                    event_type = event_type_name,
                    receivers = receiver_count,
                    "SSE event sent to clients"
                );
            }
            Err(_) => {
                tracing::trace!(
                    event_type = event_type_name,
                    "SSE event created but no clients connected"
                );
            }
        }
    }

    /// Format an SSEMessage for the wire
    pub fn format_sse_message(message: &SSEMessage) -> Bytes {
        let mut result = String::new();

        if let Some(id) = &message.id {
            result.push_str(&format!("id: {}\n", id));
        }

        result.push_str(&format!("event: {}\n", message.event));
        result.push_str(&format!("data: {}\n\n", message.data));

        Bytes::from(result)
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Option<String> {
    match serde_json::to_string(value) {
        Ok(data) => Some(data),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize SSE event payload");
            None
        }
    }
}
