//! URL-keyed content cache for external rule-set files, refreshed via
//! conditional GET (`If-None-Match` / `ETag`).

use std::path::{Path, PathBuf};

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::RetryConfig;
use crate::error::SyncError;
use crate::transport::backoff_delay;

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    etag: Option<String>,
}

/// Content store for rule-set provider bodies, keyed by `sha256(url)`.
pub struct RuleSetCache {
    client: reqwest::Client,
    cache_dir: PathBuf,
    retry: RetryConfig,
}

impl RuleSetCache {
    #[must_use]
    pub fn new(client: reqwest::Client, cache_dir: PathBuf, retry: RetryConfig) -> Self {
        Self {
            client,
            cache_dir,
            retry,
        }
    }

    /// Deterministic, I/O-free path for a URL's cached content file.
    #[must_use]
    pub fn path_for(&self, url: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.list", hash_url(url)))
    }

    fn meta_path_for(&self, url: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.meta.json", hash_url(url)))
    }

    /// Concurrently refresh every URL's cache entry. Failures (after
    /// exhausting retries) are logged and leave the previous cache entry, if
    /// any, untouched — this never returns an error itself.
    pub async fn ensure_updated(&self, urls: &[String]) {
        if urls.is_empty() {
            return;
        }
        tokio::fs::create_dir_all(&self.cache_dir).await.ok();

        let tasks = urls.iter().map(|url| self.ensure_one(url));
        join_all(tasks).await;
    }

    async fn ensure_one(&self, url: &str) {
        let content_path = self.path_for(url);
        let meta_path = self.meta_path_for(url);
        let etag = read_etag(&meta_path).await;

        match self.get_conditional(url, etag.as_deref()).await {
            Ok(Some((body, new_etag))) => {
                if let Err(err) = atomic_write(&content_path, body.as_bytes()).await {
                    tracing::warn!(url, error = %err, "failed to write rule-set cache entry");
                    return;
                }
                match new_etag {
                    Some(etag) => {
                        let meta = CacheMeta { etag: Some(etag) };
                        if let Ok(json) = serde_json::to_vec(&meta) {
                            let _ = atomic_write(&meta_path, &json).await;
                        }
                    }
                    None => {
                        let _ = tokio::fs::remove_file(&meta_path).await;
                    }
                }
                tracing::debug!(url, "rule-set cache entry updated");
            }
            Ok(None) => {
                tracing::debug!(url, "rule-set cache hit (304)");
            }
            Err(err) => {
                tracing::warn!(url, error = %err, "failed to refresh rule-set cache entry, keeping previous content");
            }
        }
    }

    /// `Ok(Some((body, etag)))` on a fresh 2xx body, `Ok(None)` on `304`.
    async fn get_conditional(
        &self,
        url: &str,
        etag: Option<&str>,
    ) -> Result<Option<(String, Option<String>)>, SyncError> {
        let max_retries = self.retry.max_retries.max(1);
        let mut last_err = None;

        for attempt in 1..=max_retries {
            let mut request = self.client.get(url);
            if let Some(etag) = etag {
                request = request.header(reqwest::header::IF_NONE_MATCH, etag);
            }

            match request.send().await {
                Ok(response) => {
                    if response.status() == reqwest::StatusCode::NOT_MODIFIED {
                        return Ok(None);
                    }
                    let status = response.status();
                    if status.is_success() {
                        let new_etag = response
                            .headers()
                            .get(reqwest::header::ETAG)
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        let body = response
                            .text()
                            .await
                            .map_err(|e| SyncError::Connect(e.to_string()))?;
                        return Ok(Some((body, new_etag)));
                    }
                    let body = response.text().await.unwrap_or_default();
                    let err = crate::transport::classify_status(status, body);
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    last_err = Some(err);
                }
                Err(e) => {
                    let err = if e.is_timeout() {
                        SyncError::Timeout(e.to_string())
                    } else {
                        SyncError::Connect(e.to_string())
                    };
                    last_err = Some(err);
                }
            }

            if attempt < max_retries {
                let delay = backoff_delay(&self.retry, attempt);
                tokio::time::sleep(delay).await;
            }
        }

        Err(SyncError::Exhausted {
            attempts: max_retries,
            source: last_err.map(|e| e.to_string()).unwrap_or_default(),
        })
    }
}

fn hash_url(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

async fn read_etag(meta_path: &Path) -> Option<String> {
    let bytes = tokio::fs::read(meta_path).await.ok()?;
    let meta: CacheMeta = serde_json::from_slice(&bytes).ok()?;
    meta.etag
}

async fn atomic_write(path: &Path, contents: &[u8]) -> Result<(), SyncError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(dir).await?;
    let tmp_path = dir.join(format!(
        ".{}.tmp-{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("cache"),
        std::process::id()
    ));
    tokio::fs::write(&tmp_path, contents).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_for_is_deterministic_and_pure() {
        let cache = RuleSetCache::new(
            reqwest::Client::new(),
            PathBuf::from("/tmp/rule-cache"),
            RetryConfig {
                max_retries: 3,
                initial_backoff: 1.0,
                max_backoff: 16.0,
                jitter: false,
            },
        );
        let a = cache.path_for("https://example.com/list.txt");
        let b = cache.path_for("https://example.com/list.txt");
        assert_eq!(a, b);
        assert_ne!(a, cache.path_for("https://example.com/other.txt"));
    }

    #[test]
    fn hash_url_is_hex_sha256() {
        let digest = hash_url("https://example.com/list.txt");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
