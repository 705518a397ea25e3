use crate::config::types::{
    Config, HarvestConfig, OutputConfig, ProxyConfig, RetryConfig, SolverConfig, TaskConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_retry_config(&config.retry)?;
    validate_proxy_config(&config.proxy)?;
    validate_solver_config(&config.solver)?;
    validate_harvest_config(&config.harvest)?;
    validate_task_config(&config.tasks)?;
    validate_output_config(&config.output)?;
    Ok(())
}

fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if config.rotation_interval < 1 {
        return Err(ConfigError::Validation(format!(
            "rotation-interval must be >= 1, got {}",
            config.rotation_interval
        )));
    }

    Ok(())
}

fn validate_proxy_config(config: &ProxyConfig) -> Result<(), ConfigError> {
    if config.socks_port == 0 || config.control_port == 0 {
        return Err(ConfigError::Validation(
            "proxy ports must be non-zero".to_string(),
        ));
    }

    if config.socks_port == config.control_port {
        return Err(ConfigError::Validation(format!(
            "socks-port and control-port must differ, both are {}",
            config.socks_port
        )));
    }

    if config.host.is_empty() {
        return Err(ConfigError::Validation(
            "proxy host cannot be empty".to_string(),
        ));
    }

    validate_url("ip-echo-url", &config.ip_echo_url)?;

    Ok(())
}

fn validate_solver_config(config: &SolverConfig) -> Result<(), ConfigError> {
    validate_url("solver endpoint", &config.endpoint)
}

fn validate_harvest_config(config: &HarvestConfig) -> Result<(), ConfigError> {
    if config.batch_size < 1 || config.batch_size > 100_000 {
        return Err(ConfigError::Validation(format!(
            "batch-size must be between 1 and 100000, got {}",
            config.batch_size
        )));
    }

    if config.concurrency < 1 || config.concurrency > 1000 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 1000, got {}",
            config.concurrency
        )));
    }

    validate_url("wayback-endpoint", &config.wayback_endpoint)?;

    Ok(())
}

fn validate_task_config(config: &TaskConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_runs < 1 {
        return Err(ConfigError::Validation(format!(
            "max-concurrent-runs must be >= 1, got {}",
            config.max_concurrent_runs
        )));
    }
    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    if matches!(config.summary_path.as_deref(), Some("")) {
        return Err(ConfigError::Validation(
            "summary-path cannot be empty when set".to_string(),
        ));
    }

    Ok(())
}

/// Checks that a configured endpoint is an absolute http(s) URL
fn validate_url(label: &str, raw: &str) -> Result<(), ConfigError> {
    let url = Url::parse(raw)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", label, raw, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            label, raw
        )));
    }

    Ok(())
}
