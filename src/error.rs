/// Canonical error type used across the upstream client, cache, and pipeline stages.
///
/// Per-rule and per-provider failures (unresolved policy, unknown provider,
/// unsupported rule type, a bad parse line) are not represented here — those
/// are skip-and-log conditions handled locally at the call site, not
/// propagated `Result::Err` values.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("connect error: {0}")]
    Connect(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("client error ({status}): {body}")]
    Client { status: u16, body: String },
    #[error("server error ({status}): {body}")]
    Server { status: u16, body: String },
    #[error("exhausted {attempts} retries: {source}")]
    Exhausted { attempts: u32, source: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("write error: {0}")]
    Write(String),
    #[error("config error: {0}")]
    Config(String),
}

impl SyncError {
    /// Whether the source condition (connection failure, timeout, 5xx) warrants a retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Connect(_) | SyncError::Timeout(_) | SyncError::Server { .. }
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("config validation error: {0}")]
    Validation(String),
}
