//! Local HTTP bridge between the native shell and the supervisor.
//!
//! The shell (a desktop window) loads the backend URL and talks to the
//! supervisor through a small Actix Web server on localhost:
//!
//! - `GET /app-info` returns `{name, version, serverRunning, serverUrl}`
//! - `POST /restart` restarts the backend and returns `{restarted}`
//! - `GET /logs` returns the lifecycle event history
//! - `GET /events` streams `status-update`, `error-message`, `server-ready`
//!   and `connection-lost` as Server-Sent Events
//!
//! Requests can be protected with a bearer token; CORS is open so the shell
//! can call the bridge from its web content.

pub use self::handlers::BridgeState;
pub use self::server::{BridgeHandle, BridgeServer};
pub use self::types::{AppInfo, LogsResponse, RestartResponse, SSEMessage};

pub mod actix_error;
pub mod auth;
pub mod events;
pub mod handlers;
pub mod server;
pub mod types;
