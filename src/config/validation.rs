use super::Config;
use crate::error::ConfigError;

/// Validate the full process config, returning an error if any invariant is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    validate_upstream(config)?;
    validate_intervals(config)?;
    validate_retry_config(config)?;
    validate_paths(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_upstream(config: &Config) -> Result<(), ConfigError> {
    if config.upstream_api_url.trim().is_empty() {
        return Err(validation_err("upstream_api_url must not be empty"));
    }
    if config.upstream_api_timeout == 0 {
        return Err(validation_err(
            "upstream_api_timeout must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_intervals(config: &Config) -> Result<(), ConfigError> {
    if !(config.polling_interval.is_finite() && config.polling_interval > 0.0) {
        return Err(validation_err("polling_interval must be greater than 0"));
    }
    if !(config.debounce_interval.is_finite() && config.debounce_interval >= 0.0) {
        return Err(validation_err(
            "debounce_interval must be greater than or equal to 0",
        ));
    }
    Ok(())
}

fn validate_retry_config(config: &Config) -> Result<(), ConfigError> {
    let retry = &config.api_retry_config;
    if retry.initial_backoff < 0.0 || !retry.initial_backoff.is_finite() {
        return Err(validation_err(
            "api_retry_config.initial_backoff must be greater than or equal to 0",
        ));
    }
    if retry.max_backoff < retry.initial_backoff {
        return Err(validation_err(
            "api_retry_config.max_backoff must be greater than or equal to initial_backoff",
        ));
    }
    Ok(())
}

fn validate_paths(config: &Config) -> Result<(), ConfigError> {
    if config.downstream_rules_path.trim().is_empty() {
        return Err(validation_err("downstream_rules_path must not be empty"));
    }
    if config.downstream_reload_command.trim().is_empty() {
        return Err(validation_err(
            "downstream_reload_command must not be empty",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        serde_yaml::from_str(
            r#"
upstream_api_url: "http://127.0.0.1:9090"
polling_interval: 30
debounce_interval: 5
downstream_rules_path: "/tmp/rules"
downstream_reload_command: "true"
"#,
        )
        .unwrap()
    }

    #[test]
    fn valid_config_passes() {
        assert!(validate_config(&base_config()).is_ok());
    }

    #[test]
    fn empty_upstream_url_rejected() {
        let mut config = base_config();
        config.upstream_api_url = String::new();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn zero_polling_interval_rejected() {
        let mut config = base_config();
        config.polling_interval = 0.0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn max_backoff_below_initial_rejected() {
        let mut config = base_config();
        config.api_retry_config.max_backoff = 0.5;
        config.api_retry_config.initial_backoff = 1.0;
        assert!(validate_config(&config).is_err());
    }
}
