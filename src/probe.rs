//! Port and HTTP reachability checks.
//!
//! The supervisor never talks to the network directly; it goes through the
//! [`Prober`] trait so that tests can script probe outcomes. Failures such
//! as a refused connection or a timeout are ordinary values of
//! [`ProbeError`], not exceptional conditions.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;

pub use reqwest::StatusCode;

/// Why a probe did not produce a status code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    /// No response within the timeout
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// TCP connection could not be established
    #[error("connection failed: {0}")]
    Connect(String),
    /// Any other request failure
    #[error("request failed: {0}")]
    Request(String),
}

/// Outcome of a single HTTP probe.
pub type ProbeResult = std::result::Result<StatusCode, ProbeError>;

/// Network checks used by the supervisor and health monitor.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Returns `true` when a listener can be bound on `host:port`.
    ///
    /// The listener is released before returning.
    async fn is_port_free(&self, host: &str, port: u16) -> bool;

    /// Issues a HEAD request against `url` and returns the response status.
    async fn probe_http(&self, url: &str, timeout: Duration) -> ProbeResult;
}

/// Whether a probe outcome counts as "the backend answered".
pub fn is_success(result: &ProbeResult) -> bool {
    matches!(result, Ok(status) if status.is_success())
}

/// Human-readable description of a probe outcome, for logs and errors.
pub fn describe(result: &ProbeResult) -> String {
    match result {
        Ok(status) => format!("HTTP {}", status.as_u16()),
        Err(e) => e.to_string(),
    }
}

/// [`Prober`] backed by `tokio` sockets and a `reqwest` client.
#[derive(Clone)]
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    /// Creates a prober that bypasses any system proxy (the backend is local).
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .map_err(|e| Error::Other(format!("Failed to build HTTP client for probes: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn is_port_free(&self, host: &str, port: u16) -> bool {
        match tokio::net::TcpListener::bind((host, port)).await {
            Ok(listener) => {
                drop(listener);
                true
            }
            Err(e) => {
                tracing::debug!(host, port, error = %e, "Port is not free");
                false
            }
        }
    }

    async fn probe_http(&self, url: &str, timeout: Duration) -> ProbeResult {
        let request = self.client.head(url).timeout(timeout).send();

        match tokio::time::timeout(timeout, request).await {
            Ok(Ok(response)) => Ok(response.status()),
            Ok(Err(e)) if e.is_timeout() => Err(ProbeError::Timeout(timeout)),
            Ok(Err(e)) if e.is_connect() => Err(ProbeError::Connect(e.to_string())),
            Ok(Err(e)) => Err(ProbeError::Request(e.to_string())),
            Err(_) => Err(ProbeError::Timeout(timeout)),
        }
    }
}
