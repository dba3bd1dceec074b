//! Bridge HTTP server and its control handle.

use crate::bridge::auth::Authentication;
use crate::bridge::events::EventManager;
use crate::bridge::handlers::{self, BridgeState};
use crate::config::{BridgeConfig, DEFAULT_WORKERS};
use crate::error::{Error, Result};

use actix_cors::Cors;
use actix_web::{App, HttpServer, dev::ServerHandle, middleware, web::Data};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Number of SSE messages buffered per client
const EVENT_CAPACITY: usize = 100;

/// How long `shutdown` waits for the server task
const SHUTDOWN_WAIT: Duration = Duration::from_secs(5);

/// Handle for controlling a running bridge
#[derive(Clone)]
pub struct BridgeHandle {
    /// Address the server is bound to
    local_addr: SocketAddr,
    /// Actix server handle
    server: ServerHandle,
    /// Server task
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
    /// Notification forwarder task
    forwarder: Arc<Mutex<Option<JoinHandle<()>>>>,
    /// Event manager shared with the handlers
    event_manager: Arc<EventManager>,
}

impl BridgeHandle {
    /// Address the bridge listens on
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Event manager feeding the SSE stream
    pub fn event_manager(&self) -> &Arc<EventManager> {
        &self.event_manager
    }

    /// Stop accepting connections and wait for the server to finish
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Stopping bridge server");

        if let Some(forwarder) = self.forwarder.lock().await.take() {
            forwarder.abort();
        }

        self.server.stop(true).await;

        if let Some(task) = self.task.lock().await.take() {
            match tokio::time::timeout(SHUTDOWN_WAIT, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "Error while joining bridge task"),
                Err(_) => tracing::warn!("Timeout waiting for bridge task to finish"),
            }
        }

        tracing::info!("Bridge server stopped");
        Ok(())
    }
}

/// Local HTTP server exposing the supervisor to the native shell
pub struct BridgeServer;

impl BridgeServer {
    /// Bind and start the bridge in a background task.
    #[tracing::instrument(skip_all, fields(address = %config.address, port = config.port))]
    pub async fn start(config: BridgeConfig, state: BridgeState) -> Result<BridgeHandle> {
        let addr_str = format!("{}:{}", config.address, config.port);
        let addr = addr_str
            .to_socket_addrs()
            .map_err(|e| Error::Other(format!("Failed to parse socket address: {}", e)))?
            .next()
            .ok_or_else(|| Error::Other(format!("Could not parse socket address: {}", addr_str)))?;

        let event_manager = Arc::new(EventManager::new(EVENT_CAPACITY));
        let forwarder = event_manager.forward(state.supervisor.subscribe());

        let config_arc = Arc::new(config.clone());
        let events_data = Data::new(Arc::clone(&event_manager));
        let state_data = Data::new(state);

        let mut server_builder = HttpServer::new(move || {
            let cors = Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .max_age(3600);

            App::new()
                .wrap(middleware::Logger::default())
                .wrap(cors)
                .app_data(events_data.clone())
                .app_data(state_data.clone())
                .wrap(Authentication::new(config_arc.clone()))
                .configure(handlers::configure)
        });

        let workers = config.workers.unwrap_or(DEFAULT_WORKERS);
        tracing::debug!(workers, "Setting number of Actix Web workers");
        server_builder = server_builder.workers(workers);

        let bound = server_builder
            .bind(addr)
            .map_err(|e| Error::Other(format!("Failed to bind bridge to {}: {}", addr_str, e)))?;
        let local_addr = bound.addrs().first().copied().unwrap_or(addr);

        let server = bound.run();
        let server_handle = server.handle();
        let task = tokio::spawn(async move {
            if let Err(e) = server.await {
                tracing::error!(error = %e, "Bridge server error");
            }
        });

        tracing::info!(%local_addr, "Bridge server started");

        Ok(BridgeHandle {
            local_addr,
            server: server_handle,
            task: Arc::new(Mutex::new(Some(task))),
            forwarder: Arc::new(Mutex::new(Some(forwarder))),
            event_manager,
        })
    }
}
