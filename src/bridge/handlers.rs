//! HTTP request handlers for the shell bridge.
//!
//! - `GET /app-info` application name, version and backend status
//! - `POST /restart` restart the backend with a fresh attempt budget
//! - `GET /logs` lifecycle event history
//! - `GET /events` SSE stream of supervisor notifications

use crate::bridge::actix_error::ApiError;
use crate::bridge::events::EventManager;
use crate::bridge::types::{AppInfo, LogsQuery, LogsResponse, RestartResponse};
use crate::config::AppConfig;
use crate::server::SupervisorHandle;

use actix_web::{
    HttpRequest, HttpResponse, Responder,
    web::{self, Data, Query},
};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Upper bound for `GET /logs?limit=`
pub const MAX_LOG_LIMIT: usize = 1000;

/// State shared by all bridge handlers
#[derive(Clone)]
pub struct BridgeState {
    /// Application identity
    pub app: AppConfig,
    /// Supervisor the bridge reports on and controls
    pub supervisor: SupervisorHandle,
}

impl BridgeState {
    pub fn new(app: AppConfig, supervisor: SupervisorHandle) -> Self {
        Self { app, supervisor }
    }

    /// Current application info
    pub fn app_info(&self) -> AppInfo {
        let snapshot = self.supervisor.snapshot();
        AppInfo {
            name: self.app.name.clone(),
            version: self.app.version.clone(),
            server_running: snapshot.server_running(),
            server_url: snapshot.server_url,
        }
    }
}

/// Registers the bridge routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/app-info", web::get().to(app_info))
        .route("/restart", web::post().to(restart_server))
        .route("/logs", web::get().to(logs))
        .route("/events", web::get().to(events));
}

/// Application name, version and backend status
pub async fn app_info(state: Data<BridgeState>) -> impl Responder {
    HttpResponse::Ok().json(state.app_info())
}

/// Restart the backend
pub async fn restart_server(state: Data<BridgeState>) -> Result<HttpResponse, ApiError> {
    tracing::info!("Restart requested by shell");
    let restarted = state.supervisor.restart().await?;
    Ok(HttpResponse::Ok().json(RestartResponse { restarted }))
}

/// Lifecycle event history, newest first
pub async fn logs(
    state: Data<BridgeState>,
    query: Query<LogsQuery>,
) -> Result<HttpResponse, ApiError> {
    let limit = match query.limit {
        Some(0) => {
            return Err(ApiError::InvalidRequest(
                "limit must be at least 1".to_string(),
            ));
        }
        Some(limit) => Some(limit.min(MAX_LOG_LIMIT)),
        None => None,
    };

    let events = state.supervisor.lifecycle().recent_events(limit)?;
    Ok(HttpResponse::Ok().json(LogsResponse {
        snapshot: state.supervisor.snapshot(),
        events,
    }))
}

/// SSE stream of supervisor notifications
///
/// Every new client first receives a `snapshot` event with the current
/// supervisor state, then live notifications.
pub async fn events(
    event_manager: Data<Arc<EventManager>>,
    state: Data<BridgeState>,
    req: HttpRequest,
) -> impl Responder {
    tracing::debug!(peer = ?req.peer_addr(), "Shell connected to event stream");

    let mut receiver = event_manager.subscribe();
    let initial = EventManager::snapshot_message(&state.supervisor.snapshot());

    let stream = async_stream::stream! {
        if let Some(message) = initial {
            yield Ok::<_, actix_web::Error>(EventManager::format_sse_message(&message));
        }

        loop {
            match receiver.recv().await {
                Ok(message) => {
                    yield Ok::<_, actix_web::Error>(EventManager::format_sse_message(&message));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "SSE client fell behind, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    HttpResponse::Ok()
        .append_header(("Content-Type", "text/event-stream"))
        .append_header(("Cache-Control", "no-cache"))
        .append_header(("Connection", "keep-alive"))
        .streaming(stream)
}
