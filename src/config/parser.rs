use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default number of Actix Web workers for the shell bridge.
pub const DEFAULT_WORKERS: usize = 1;

/// Log substrings the bundled backend prints once it is about to accept connections.
pub const DEFAULT_READINESS_MARKERS: &[&str] = &[
    "[DAMA] Demarrage du serveur Django (Uvicorn)",
    "Uvicorn running on",
    "Application startup complete",
    "Django ASGI ultra-optimisé - PRÊT",
    "Tables principales pré-chargées",
    "Started server process",
];

/// Application identity reported to the shell.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    /// Display name
    pub name: String,
    /// Display version
    pub version: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "Desktop App".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Where the backend listens and how it announces readiness.
///
/// # Examples
///
/// ```
/// use backend_supervisor::config::ServerConfig;
///
/// let server = ServerConfig::default();
/// assert_eq!(server.url(), "http://127.0.0.1:8000");
/// assert_eq!(server.probe_url(), "http://127.0.0.1:8000/");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    /// Host the backend binds to.
    pub host: String,
    /// Port the backend binds to.
    pub port: u16,
    /// Path probed with HEAD requests.
    pub probe_path: String,
    /// Substrings that mark the backend as ready when seen in its output.
    pub readiness_markers: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            probe_path: "/".to_string(),
            readiness_markers: DEFAULT_READINESS_MARKERS
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

impl ServerConfig {
    /// Base URL of the backend, as loaded by the shell window.
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// URL used for readiness and health probes.
    pub fn probe_url(&self) -> String {
        if self.probe_path.starts_with('/') {
            format!("{}{}", self.url(), self.probe_path)
        } else {
            format!("{}/{}", self.url(), self.probe_path)
        }
    }
}

/// How to start the backend process.
///
/// Packaged installs ship a self-contained executable; development checkouts
/// run a script through an interpreter.
///
/// ```json
/// { "mode": "script", "interpreterCandidates": ["../env/bin/python", "python3"],
///   "script": "Welto.py", "projectDir": "../blog_pos", "settingsModule": "blog_pos.settings" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum LaunchConfig {
    /// Bundled executable, started without arguments.
    Packaged {
        /// Path to the executable
        executable: PathBuf,
        /// Extra arguments
        #[serde(default)]
        args: Vec<String>,
        /// Directory the executable runs from (where its data lives)
        #[serde(default)]
        working_dir: Option<PathBuf>,
        /// Extra environment variables
        #[serde(default)]
        env: HashMap<String, String>,
    },
    /// Script run through the first interpreter found.
    Script {
        /// Interpreter paths or commands, in order of preference
        interpreter_candidates: Vec<String>,
        /// Script path relative to `project_dir`
        script: String,
        /// Backend project directory; also exported as `PYTHONPATH`
        project_dir: PathBuf,
        /// Settings module exported through `settings_env_var`
        #[serde(default)]
        settings_module: Option<String>,
        /// Name of the settings-module variable
        #[serde(default = "default_settings_env_var")]
        settings_env_var: String,
        /// Extra environment variables
        #[serde(default)]
        env: HashMap<String, String>,
    },
}

fn default_settings_env_var() -> String {
    "DJANGO_SETTINGS_MODULE".to_string()
}

/// Timings and budgets for the supervisor state machine.
///
/// All durations are stored in milliseconds so the JSON stays flat; use the
/// accessor methods to get [`Duration`]s.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct SupervisorConfig {
    /// Start-up attempts allowed before giving up.
    pub max_attempts: u32,
    /// HTTP probe retries after the first probe of an attempt.
    pub probe_retries: u32,
    /// Delay between the readiness marker and the first probe.
    pub settle_delay_ms: u64,
    /// Delay between two start-up probes.
    pub probe_interval_ms: u64,
    /// Timeout of a single start-up probe.
    pub probe_timeout_ms: u64,
    /// Delay before re-spawning after a failed attempt.
    pub restart_backoff_ms: u64,
    /// How long to wait for a readiness marker.
    pub readiness_timeout_ms: u64,
    /// How long a terminated process gets before it is killed.
    pub terminate_grace_ms: u64,
    /// Interval between health probes while serving.
    pub health_interval_ms: u64,
    /// Timeout of a single health probe.
    pub health_timeout_ms: u64,
    /// Time without a successful health probe before the connection counts as lost.
    pub connection_grace_ms: u64,
    /// Refuse to spawn while the backend port is taken.
    pub check_port: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            probe_retries: 5,
            settle_delay_ms: 800,
            probe_interval_ms: 2_000,
            probe_timeout_ms: 5_000,
            restart_backoff_ms: 3_000,
            readiness_timeout_ms: 90_000,
            terminate_grace_ms: 3_000,
            health_interval_ms: 10_000,
            health_timeout_ms: 5_000,
            connection_grace_ms: 30_000,
            check_port: true,
        }
    }
}

impl SupervisorConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn restart_backoff(&self) -> Duration {
        Duration::from_millis(self.restart_backoff_ms)
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }

    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.health_interval_ms)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    pub fn connection_grace(&self) -> Duration {
        Duration::from_millis(self.connection_grace_ms)
    }
}

/// Location of persisted data and backup policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct StorageConfig {
    /// Root of the per-user data (contains `data/` and `backups/`).
    pub user_data_dir: PathBuf,
    /// Database shipped by older installs, migrated on first start.
    pub legacy_database: Option<PathBuf>,
    /// Database file name inside `data/`.
    pub database_file: String,
    /// Number of backups kept after pruning.
    pub keep_backups: usize,
    /// Environment variable that tells the backend where the user data lives.
    pub user_data_env_var: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            user_data_dir: PathBuf::from("user-data"),
            legacy_database: None,
            database_file: "db.sqlite3".to_string(),
            keep_backups: 5,
            user_data_env_var: "WELTO_USER_DATA".to_string(),
        }
    }
}

/// Bearer token authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BearerAuthConfig {
    /// Token expected in the `Authorization: Bearer` header
    pub token: String,
}

/// Authentication configuration for the shell bridge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AuthConfig {
    /// Bearer token authentication
    #[serde(default)]
    pub bearer: Option<BearerAuthConfig>,
}

/// Local HTTP bridge the native shell talks to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Address to bind
    #[serde(default = "default_bridge_address")]
    pub address: String,
    /// Port to bind
    #[serde(default = "default_bridge_port")]
    pub port: u16,
    /// Optional authentication
    #[serde(default)]
    pub authenticate: Option<AuthConfig>,
    /// Number of Actix Web workers
    #[serde(default)]
    pub workers: Option<usize>,
}

fn default_bridge_address() -> String {
    "127.0.0.1".to_string()
}

fn default_bridge_port() -> u16 {
    8765
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            address: default_bridge_address(),
            port: default_bridge_port(),
            authenticate: None,
            workers: None,
        }
    }
}

/// Main configuration for the backend supervisor.
///
/// # JSON Schema
///
/// ```json
/// {
///   "app": { "name": "WELTO", "version": "1.0.0" },
///   "server": { "host": "127.0.0.1", "port": 8000 },
///   "launch": { "mode": "packaged", "executable": "resources/server/server.exe" },
///   "supervisor": { "maxAttempts": 5, "restartBackoffMs": 3000 },
///   "storage": { "userDataDir": "/home/me/.local/share/welto", "keepBackups": 5 },
///   "bridge": { "port": 8765, "authenticate": { "bearer": { "token": "secret" } } }
/// }
/// ```
///
/// Only `launch` is required; every other section has defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Application identity
    #[serde(default)]
    pub app: AppConfig,
    /// Backend endpoint
    #[serde(default)]
    pub server: ServerConfig,
    /// Backend launch recipe
    pub launch: LaunchConfig,
    /// State machine timings
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    /// Persisted data
    #[serde(default)]
    pub storage: StorageConfig,
    /// Shell bridge; not started when absent
    #[serde(default)]
    pub bridge: Option<BridgeConfig>,
}

impl Config {
    /// Loads a configuration from a file path.
    ///
    /// Files ending in `.yaml` or `.yml` are parsed as YAML, everything else
    /// as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// * The file cannot be read
    /// * The file contents are not valid JSON/YAML
    /// * The document does not conform to the expected schema
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigParse(format!("Failed to read config file: {}", e)))?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::parse_from_yaml_str(&content),
            _ => Self::parse_from_str(&content),
        }
    }

    /// Parses a configuration from a JSON string.
    pub fn parse_from_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse JSON config: {}", e)))
    }

    /// Parses a configuration from a YAML string.
    pub fn parse_from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse YAML config: {}", e)))
    }
}
