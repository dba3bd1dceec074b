/// Error handling module for the backend supervisor.
///
/// This module defines the error types used throughout the library.
/// Most variants describe why a single start-up attempt failed; the state
/// machine recovers from those on its own and only logs them. A few are
/// fatal and end up in front of the user (see [`Error::is_fatal`]).
///
/// # Example
///
/// ```
/// use backend_supervisor::error::{Error, Result};
///
/// fn handle_error(result: Result<()>) {
///     match result {
///         Ok(_) => println!("Operation succeeded"),
///         Err(Error::ExecutableNotFound(path)) => println!("Backend missing: {}", path),
///         Err(e) if e.is_fatal() => println!("{}: {}", e.title(), e),
///         Err(e) => println!("Transient error: {}", e),
///     }
/// }
/// ```
use thiserror::Error;

/// Errors that can occur in the backend-supervisor library.
///
/// Every variant carries a human-readable description. Variants are `Clone`
/// so the supervisor can keep the last error in its state snapshot.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Failed to parse configuration from a file or string.
    ///
    /// This error occurs when:
    /// - The configuration JSON or YAML is malformed
    /// - Required fields are missing
    /// - Field types are incorrect
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration parsed but contains values that fail validation checks.
    ///
    /// This error occurs when:
    /// - The launch command is empty
    /// - A port is zero
    /// - The readiness marker set is empty
    /// - A retry budget is zero
    #[error("Config validation error: {0}")]
    ConfigValidation(String),

    /// The backend executable does not exist.
    ///
    /// Unlike [`Error::Spawn`] this cannot be fixed by retrying, so it is
    /// surfaced to the user straight away.
    #[error("Backend executable not found: {0}")]
    ExecutableNotFound(String),

    /// The operating system refused to create the backend process.
    #[error("Failed to spawn backend process: {0}")]
    Spawn(String),

    /// The backend port is already bound by another process.
    #[error("Port already in use: {0}")]
    PortInUse(String),

    /// No readiness marker was printed within the readiness window.
    #[error("Backend did not report readiness within {0}")]
    ReadinessTimeout(String),

    /// HTTP probing kept failing after the backend reported readiness.
    #[error("HTTP probe failed: {0}")]
    ProbeFailure(String),

    /// Health checks have been failing for longer than the grace threshold.
    #[error("Connection to backend lost: {0}")]
    ConnectionLoss(String),

    /// The backend exited unexpectedly.
    #[error("Backend process crashed: {0}")]
    ProcessCrash(String),

    /// Too many consecutive start-up attempts failed.
    ///
    /// This error is fatal: the supervisor stays in `Failed` and waits for
    /// an explicit restart request.
    #[error("Backend failed to start after {attempts} attempts (last error: {last_error})")]
    AttemptBudgetExhausted {
        /// Number of attempts that were made
        attempts: u32,
        /// Description of the error that ended the final attempt
        last_error: String,
    },

    /// A phase change that the state machine does not allow.
    #[error("Invalid phase transition from {from} to {to}")]
    InvalidTransition {
        /// Phase before the transition
        from: String,
        /// Requested phase
        to: String,
    },

    /// Error while signalling, waiting on or reading from a process.
    #[error("Server process error: {0}")]
    Process(String),

    /// The controller already owns a live process.
    #[error("Already running")]
    AlreadyRunning,

    /// The supervisor task is gone or the process is not running.
    #[error("Not running")]
    NotRunning,

    /// Operation timed out.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Error while creating directories, migrating or backing up data.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Error in communication between the supervisor and its clients.
    #[error("Communication error: {0}")]
    Communication(String),

    /// Unauthorized access to the shell bridge.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Error in serializing or deserializing data.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Any other error not covered by the above categories.
    #[error("Other error: {0}")]
    Other(String),
}

impl Error {
    /// Whether the error stops automatic recovery and must be shown to the user.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ExecutableNotFound(_) | Error::AttemptBudgetExhausted { .. }
        )
    }

    /// Short dialog title for user-visible errors.
    pub fn title(&self) -> &'static str {
        match self {
            Error::ExecutableNotFound(_) => "Backend Not Found",
            Error::AttemptBudgetExhausted { .. } => "Unstable Server",
            Error::Spawn(_) => "Startup Error",
            Error::ProbeFailure(_) | Error::ConnectionLoss(_) => "Connection Error",
            Error::ConfigParse(_) | Error::ConfigValidation(_) => "Configuration Error",
            Error::Storage(_) => "Data Error",
            _ => "Error",
        }
    }

    /// Actionable advice appended to user-visible error messages.
    pub fn hint(&self) -> &'static str {
        match self {
            Error::ExecutableNotFound(_) => "Check that the application is installed correctly.",
            Error::AttemptBudgetExhausted { .. } => {
                "Try restarting the server from the menu, or restart the application."
            }
            Error::PortInUse(_) => "Close any other program using the server port.",
            _ => "Check the application log for details.",
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type for backend-supervisor operations.
///
/// This is a convenience type alias for `std::result::Result` with the `Error` type
/// from this module.
pub type Result<T> = std::result::Result<T, Error>;
