/*!
 # Backend Supervisor

 A Rust library for launching and supervising the local HTTP backend of a
 desktop application.

 ## Overview

 Backend Supervisor provides functionality to:
 - Start the backend process (packaged executable or interpreter + script)
 - Detect readiness from its output and confirm it with HTTP probes
 - Retry failed start-ups with a bounded attempt budget and backoff
 - Watch the serving backend's health and restart it on connection loss
 - Migrate and back up the application database
 - Expose status and restart control to the native shell over a local HTTP bridge

 ## Basic Usage

 ```no_run
 use backend_supervisor::{Launcher, Result};
 use std::time::Duration;

 #[tokio::main]
 async fn main() -> Result<()> {
     // Create a launcher from config file
     let mut launcher = Launcher::from_config_file("supervisor.json")?;

     // Create data directories and migrate a legacy database
     launcher.prepare_data()?;

     // Start the backend (and the bridge, if configured)
     launcher.start().await?;

     // Wait until the backend answers HTTP requests
     let supervisor = launcher.supervisor()?;
     let snapshot = supervisor
         .wait_until(Duration::from_secs(120), |s| s.server_running())
         .await?;
     println!("Backend ready at {}", snapshot.server_url);

     launcher.shutdown().await?;
     Ok(())
 }
 ```

 ## Features

 - **Supervision**: One state machine per backend, driven by a single task
 - **Recovery**: Crash retries with backoff and connection-loss restarts
 - **Configuration**: JSON or YAML config files
 - **Error Handling**: User-facing titles and hints for fatal errors
 - **Bridge**: Local HTTP + SSE endpoints with bearer auth and CORS
*/

pub mod bridge;
pub mod config;
pub mod error;
pub mod probe;
pub mod server;
pub mod storage;

pub use bridge::{AppInfo, BridgeHandle};
pub use config::Config;
pub use error::{Error, Result};
pub use server::{Phase, Supervisor, SupervisorHandle, SupervisorSnapshot};
pub use storage::DataLayout;

use bridge::{BridgeServer, BridgeState};
use probe::{HttpProber, Prober};
use server::{LaunchSpec, ProcessController, ServerProcess};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use storage::MigrationOutcome;

/// Launch and supervise the backend
///
/// This struct is the main entry point: it owns the configuration, the data
/// layout, and (once started) the supervisor and bridge handles.
/// All public methods are instrumented with `tracing` spans.
pub struct Launcher {
    /// Configuration
    config: Config,
    /// User data layout
    layout: DataLayout,
    /// Supervisor handle (if started)
    supervisor: Option<SupervisorHandle>,
    /// Bridge handle (if running)
    bridge: Option<BridgeHandle>,
}

impl Launcher {
    /// Create a new launcher from a configuration file path
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(path), fields(config_path = ?path.as_ref()))]
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        tracing::info!("Loading configuration from file");
        let config = Config::from_file(path)?;
        Self::new(config)
    }

    /// Create a new launcher from a JSON configuration string
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(config))]
    pub fn from_config_str(config: &str) -> Result<Self> {
        tracing::info!("Loading configuration from string");
        let config = Config::parse_from_str(config)?;
        Self::new(config)
    }

    /// Create a new launcher from a validated configuration
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(config), fields(app = %config.app.name))]
    pub fn new(config: Config) -> Result<Self> {
        config::validate_config(&config)?;
        tracing::info!("Creating new Launcher");
        Ok(Self {
            layout: DataLayout::from_config(&config.storage),
            config,
            supervisor: None,
            bridge: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    /// Create the data directories and migrate a legacy database if configured
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self))]
    pub fn prepare_data(&self) -> Result<Option<MigrationOutcome>> {
        self.layout.initialize()?;

        match &self.config.storage.legacy_database {
            Some(legacy) => self.layout.migrate_legacy_database(legacy).map(Some),
            None => Ok(None),
        }
    }

    /// Back up the live database
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self))]
    pub fn backup(&self, suffix: Option<&str>) -> Result<Option<PathBuf>> {
        self.layout.backup(suffix)
    }

    /// Launch recipe with the user data root exported to the backend
    pub fn launch_spec(&self) -> LaunchSpec {
        let root = self.layout.root();
        let root = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());

        LaunchSpec::from_config(&self.config.launch).env(
            self.config.storage.user_data_env_var.clone(),
            root.to_string_lossy(),
        )
    }

    /// Start the backend with real processes and network probes
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self))]
    pub async fn start(&mut self) -> Result<()> {
        let controller = Arc::new(ServerProcess::new(self.config.app.name.clone()));
        let prober = Arc::new(HttpProber::new()?);
        self.start_with(controller, prober).await
    }

    /// Start the backend with the given process controller and prober
    ///
    /// Also starts the bridge when one is configured.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip_all)]
    pub async fn start_with(
        &mut self,
        controller: Arc<dyn ProcessController>,
        prober: Arc<dyn Prober>,
    ) -> Result<()> {
        if self.supervisor.is_some() {
            return Err(Error::AlreadyRunning);
        }

        let spec = self.launch_spec();
        tracing::info!(command = %spec.describe(), "Starting backend supervision");

        let supervisor = Supervisor::new(
            self.config.supervisor.clone(),
            self.config.server.clone(),
            spec,
            controller,
            prober,
        )
        .spawn();
        supervisor.start().await?;

        if let Some(bridge_config) = &self.config.bridge {
            let state = BridgeState::new(self.config.app.clone(), supervisor.clone());
            match BridgeServer::start(bridge_config.clone(), state).await {
                Ok(handle) => self.bridge = Some(handle),
                Err(e) => {
                    let _ = supervisor.shutdown().await;
                    return Err(e);
                }
            }
        }

        self.supervisor = Some(supervisor);
        Ok(())
    }

    /// Get the supervisor handle
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self))]
    pub fn supervisor(&self) -> Result<&SupervisorHandle> {
        self.supervisor.as_ref().ok_or(Error::NotRunning)
    }

    /// Get the bridge handle, if the bridge is running
    pub fn bridge(&self) -> Option<&BridgeHandle> {
        self.bridge.as_ref()
    }

    /// Restart the backend with a fresh attempt budget
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self))]
    pub async fn restart_server(&self) -> Result<bool> {
        self.supervisor()?.restart().await
    }

    /// Application name, version and backend status
    pub fn app_info(&self) -> AppInfo {
        let (server_running, server_url) = match &self.supervisor {
            Some(supervisor) => {
                let snapshot = supervisor.snapshot();
                (snapshot.server_running(), snapshot.server_url)
            }
            None => (false, self.config.server.url()),
        };

        AppInfo {
            name: self.config.app.name.clone(),
            version: self.config.app.version.clone(),
            server_running,
            server_url,
        }
    }

    /// Stop the bridge and the backend
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(bridge) = self.bridge.take() {
            if let Err(e) = bridge.shutdown().await {
                tracing::warn!(error = %e, "Failed to stop bridge");
            }
        }

        if let Some(supervisor) = self.supervisor.take() {
            supervisor.shutdown().await?;
        }

        tracing::info!("Launcher shut down");
        Ok(())
    }
}
