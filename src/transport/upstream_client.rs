use std::time::Duration;

use reqwest::StatusCode;

use crate::config::{Config, RetryConfig};
use crate::error::SyncError;
use crate::model::{ProvidersResponse, ProxiesResponse, RulesResponse};

use super::retry::backoff_delay;

/// Thin, retrying HTTP client over the upstream router's read-only API.
///
/// One instance is built in `main` and shared (via `Arc`) across the state
/// observer, the dispatch orchestrator, and the rule-set cache — all HTTP
/// traffic in the process goes through a single `reqwest::Client`.
pub struct UpstreamClient {
    client: reqwest::Client,
    base_url: String,
    retry: RetryConfig,
}

impl UpstreamClient {
    /// Build a client from the process configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if the underlying `reqwest::Client`
    /// cannot be constructed (invalid TLS configuration, bad default headers).
    pub fn new(config: &Config) -> Result<Self, SyncError> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.upstream_api_timeout));

        if !config.upstream_api_secret.is_empty() {
            let mut headers = reqwest::header::HeaderMap::new();
            let value = format!("Bearer {}", config.upstream_api_secret);
            let mut header_value = reqwest::header::HeaderValue::from_str(&value)
                .map_err(|e| SyncError::Config(format!("invalid upstream_api_secret: {e}")))?;
            header_value.set_sensitive(true);
            headers.insert(reqwest::header::AUTHORIZATION, header_value);
            builder = builder.default_headers(headers);
        }

        let client = builder
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.upstream_api_url.trim_end_matches('/').to_string(),
            retry: config.api_retry_config.clone(),
        })
    }

    #[must_use]
    pub fn http_client(&self) -> reqwest::Client {
        self.client.clone()
    }

    /// Fetch the current routing rule list.
    ///
    /// # Errors
    ///
    /// See [`Self::get_json`].
    pub async fn get_rules(&self) -> Result<RulesResponse, SyncError> {
        self.get_json("/rules").await
    }

    /// Fetch the current proxy/policy graph.
    ///
    /// # Errors
    ///
    /// See [`Self::get_json`].
    pub async fn get_proxies(&self) -> Result<ProxiesResponse, SyncError> {
        self.get_json("/proxies").await
    }

    /// Fetch the current rule-provider registry.
    ///
    /// # Errors
    ///
    /// See [`Self::get_json`].
    pub async fn get_rule_providers(&self) -> Result<ProvidersResponse, SyncError> {
        self.get_json("/providers/rules").await
    }

    /// Fetch the upstream's general configuration blob. The core only uses
    /// this as a liveness signal (C12's health check, and as a fourth
    /// concurrent fetch in the dispatch phase per spec.md's "Concurrently:
    /// rules, proxies, providers, configs"); its contents are opaque.
    ///
    /// # Errors
    ///
    /// See [`Self::get_json`].
    pub async fn get_configs(&self) -> Result<serde_json::Value, SyncError> {
        self.get_json("/configs").await
    }

    /// `GET /configs` with errors coerced to a boolean; used only by the
    /// startup health check.
    pub async fn check_connectivity(&self) -> bool {
        self.get_configs().await.is_ok()
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, endpoint: &str) -> Result<T, SyncError> {
        let body = self.get_raw(endpoint).await?;
        serde_json::from_str(&body)
            .map_err(|e| SyncError::Client {
                status: 0,
                body: format!("malformed response from {endpoint}: {e}"),
            })
    }

    async fn get_raw(&self, endpoint: &str) -> Result<String, SyncError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let max_retries = self.retry.max_retries.max(1);

        let mut last_err = None;
        for attempt in 1..=max_retries {
            match self.try_once(&url).await {
                Ok(body) => return Ok(body),
                Err(err) => {
                    let retryable = err.is_retryable();
                    tracing::warn!(url = %url, attempt, max_retries, error = %err, retryable, "upstream request failed");
                    if !retryable || attempt == max_retries {
                        if !retryable {
                            return Err(err);
                        }
                        last_err = Some(err);
                        break;
                    }
                    let delay = backoff_delay(&self.retry, attempt);
                    tokio::time::sleep(delay).await;
                    last_err = Some(err);
                }
            }
        }

        Err(SyncError::Exhausted {
            attempts: max_retries,
            source: last_err.map(|e| e.to_string()).unwrap_or_default(),
        })
    }

    async fn try_once(&self, url: &str) -> Result<String, SyncError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                SyncError::Timeout(e.to_string())
            } else {
                SyncError::Connect(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return response
                .text()
                .await
                .map_err(|e| SyncError::Connect(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        if status.is_client_error() {
            return Err(SyncError::Client {
                status: status.as_u16(),
                body,
            });
        }

        Err(SyncError::Server {
            status: status.as_u16(),
            body,
        })
    }
}

/// Errors from a single non-retrying attempt carry no special status
/// classification beyond [`StatusCode::is_client_error`] /
/// [`StatusCode::is_success`] above; this helper exists purely so callers that
/// only have a raw status code (e.g. the rule-set cache) can reuse the same
/// client/server split.
#[must_use]
pub(crate) fn classify_status(status: StatusCode, body: String) -> SyncError {
    if status.is_client_error() {
        SyncError::Client {
            status: status.as_u16(),
            body,
        }
    } else {
        SyncError::Server {
            status: status.as_u16(),
            body,
        }
    }
}
