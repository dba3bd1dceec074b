use crate::config::{Config, LaunchConfig, ServerConfig, SupervisorConfig};
use crate::error::{Error, Result};

/// Validates the backend endpoint and readiness markers
pub fn validate_server_config(config: &ServerConfig) -> Result<()> {
    if config.host.trim().is_empty() {
        return Err(Error::ConfigValidation("Server host is empty".to_string()));
    }

    if config.port == 0 {
        return Err(Error::ConfigValidation("Server port must not be 0".to_string()));
    }

    if config.readiness_markers.is_empty() {
        return Err(Error::ConfigValidation(
            "At least one readiness marker is required".to_string(),
        ));
    }

    if config.readiness_markers.iter().any(|m| m.is_empty()) {
        return Err(Error::ConfigValidation(
            "Readiness markers must not be empty strings".to_string(),
        ));
    }

    Ok(())
}

/// Validates the launch recipe
pub fn validate_launch_config(config: &LaunchConfig) -> Result<()> {
    match config {
        LaunchConfig::Packaged { executable, .. } => {
            if executable.as_os_str().is_empty() {
                return Err(Error::ConfigValidation(
                    "Packaged launch has an empty executable path".to_string(),
                ));
            }
        }
        LaunchConfig::Script {
            interpreter_candidates,
            script,
            ..
        } => {
            if interpreter_candidates.iter().all(|c| c.trim().is_empty()) {
                return Err(Error::ConfigValidation(
                    "Script launch needs at least one interpreter candidate".to_string(),
                ));
            }
            if script.trim().is_empty() {
                return Err(Error::ConfigValidation(
                    "Script launch has an empty script path".to_string(),
                ));
            }
        }
    }

    Ok(())
}

/// Validates the state machine budgets and timings
pub fn validate_supervisor_config(config: &SupervisorConfig) -> Result<()> {
    if config.max_attempts == 0 {
        return Err(Error::ConfigValidation(
            "maxAttempts must be at least 1".to_string(),
        ));
    }

    if config.health_interval_ms == 0 {
        return Err(Error::ConfigValidation(
            "healthIntervalMs must be greater than 0".to_string(),
        ));
    }

    if config.probe_timeout_ms == 0 || config.health_timeout_ms == 0 {
        return Err(Error::ConfigValidation(
            "Probe timeouts must be greater than 0".to_string(),
        ));
    }

    // A grace period shorter than one interval declares loss on the first failed probe.
    if config.connection_grace_ms < config.health_interval_ms {
        tracing::warn!(
            connection_grace_ms = config.connection_grace_ms,
            health_interval_ms = config.health_interval_ms,
            "Connection grace period is shorter than the health check interval"
        );
    }

    Ok(())
}

/// Full configuration validation
pub fn validate_config(config: &Config) -> Result<()> {
    validate_server_config(&config.server)?;
    validate_launch_config(&config.launch)?;
    validate_supervisor_config(&config.supervisor)?;

    if config.storage.keep_backups == 0 {
        return Err(Error::ConfigValidation(
            "keepBackups must be at least 1".to_string(),
        ));
    }

    if let Some(bridge) = &config.bridge {
        if bridge.port == config.server.port && bridge.address == config.server.host {
            return Err(Error::ConfigValidation(format!(
                "Bridge and backend cannot share {}:{}",
                bridge.address, bridge.port
            )));
        }
    }

    Ok(())
}
