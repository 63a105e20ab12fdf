pub mod validation;

use serde::Deserialize;

use self::validation::validate_config;
use crate::error::ConfigError;

/// Retry/backoff parameters shared by the upstream client (C1) and the rule-set cache (C3).
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff: f64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff: f64,
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

fn default_max_retries() -> u32 {
    3
}
fn default_initial_backoff() -> f64 {
    1.0
}
fn default_max_backoff() -> f64 {
    16.0
}
fn default_jitter() -> bool {
    true
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
            jitter: default_jitter(),
        }
    }
}

/// Top-level process configuration, constructed once in `main` and passed by
/// `Arc<Config>` through constructors rather than kept as a global singleton
/// (spec.md §9, "Process-wide config singleton").
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub upstream_api_url: String,
    #[serde(default = "default_upstream_timeout")]
    pub upstream_api_timeout: u64,
    #[serde(default)]
    pub upstream_api_secret: String,
    #[serde(default)]
    pub api_retry_config: RetryConfig,
    pub polling_interval: f64,
    pub debounce_interval: f64,
    pub downstream_rules_path: String,
    pub downstream_reload_command: String,
    #[serde(default)]
    pub upstream_local_config_path: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_upstream_timeout() -> u64 {
    10
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Path used to stage per-run intermediate files; a sibling of the final output directory.
    #[must_use]
    pub fn intermediate_dir(&self) -> std::path::PathBuf {
        let mut path = std::path::PathBuf::from(&self.downstream_rules_path);
        let file_name = path
            .file_name()
            .map(|n| format!("{}.intermediate", n.to_string_lossy()))
            .unwrap_or_else(|| "intermediate".to_string());
        path.set_file_name(file_name);
        path
    }

    /// Path used to cache downloaded rule-set content and validator metadata.
    #[must_use]
    pub fn cache_dir(&self) -> std::path::PathBuf {
        let mut path = std::path::PathBuf::from(&self.downstream_rules_path);
        let file_name = path
            .file_name()
            .map(|n| format!("{}.cache", n.to_string_lossy()))
            .unwrap_or_else(|| "cache".to_string());
        path.set_file_name(file_name);
        path
    }
}

/// Load configuration from a YAML file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = serde_yaml::from_str(&contents)?;
    validate_config(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_loads_with_defaults() {
        let yaml = r#"
upstream_api_url: "http://127.0.0.1:9090"
polling_interval: 30
debounce_interval: 5
downstream_rules_path: "/tmp/rules"
downstream_reload_command: "true"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        validate_config(&config).unwrap();
        assert_eq!(config.upstream_api_timeout, 10);
        assert_eq!(config.api_retry_config.max_retries, 3);
        assert_eq!(config.log_level, "info");
        assert!(config.upstream_local_config_path.is_none());
    }

    #[test]
    fn intermediate_and_cache_dirs_are_siblings_of_final() {
        let yaml = r#"
upstream_api_url: "http://127.0.0.1:9090"
polling_interval: 30
debounce_interval: 5
downstream_rules_path: "/etc/mosdns/rules"
downstream_reload_command: "true"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            config.intermediate_dir(),
            std::path::PathBuf::from("/etc/mosdns/rules.intermediate")
        );
        assert_eq!(
            config.cache_dir(),
            std::path::PathBuf::from("/etc/mosdns/rules.cache")
        );
    }
}
