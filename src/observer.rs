//! Polls the upstream router, computes a canonical state fingerprint,
//! debounces bursts of change, and drives the dispatch -> merge -> reload
//! pipeline under a single-flight guarantee.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

use crate::cache::RuleSetCache;
use crate::config::Config;
use crate::dispatch::DispatchOrchestrator;
use crate::merge::Merger;
use crate::policy::PolicyResolver;
use crate::reload::Reloader;
use crate::transport::UpstreamClient;

/// Cooperative shutdown signal shared between the signal-wiring task and
/// the observer loop, backed by `tokio::sync::Notify` rather than pulling in
/// `tokio-util` for a single cancellation token.
#[derive(Clone, Default)]
pub struct ShutdownSignal {
    notify: Arc<Notify>,
    fired: Arc<AtomicBool>,
}

impl ShutdownSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.fired.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub async fn wait(&self) {
        if self.fired.load(Ordering::SeqCst) {
            return;
        }
        self.notify.notified().await;
    }
}

#[derive(serde::Serialize)]
struct ProviderSnapshot {
    #[serde(rename = "updatedAt")]
    updated_at: Option<String>,
    #[serde(rename = "vehicleType")]
    vehicle_type: Option<String>,
}

struct Pipeline {
    dispatch: DispatchOrchestrator,
    merger: Merger,
    reloader: Reloader,
}

impl Pipeline {
    async fn run_once(&self) {
        let intermediate = match self.dispatch.run().await {
            Ok(path) => path,
            Err(err) => {
                tracing::error!(error = %err, "dispatch phase failed, aborting this run, previous final files are kept");
                return;
            }
        };
        tracing::debug!(path = %intermediate.display(), "dispatch phase complete");

        if let Err(err) = self.merger.merge().await {
            tracing::error!(error = %err, "merge phase failed, aborting this run, previous final files are kept");
            return;
        }
        tracing::info!("final rule files regenerated");

        if !self.reloader.reload().await {
            tracing::warn!("reload command failed, new files are in place but resolver was not signalled");
        }
    }
}

pub struct StateObserver {
    client: Arc<UpstreamClient>,
    polling_interval: Duration,
    debounce_interval: Duration,
    pipeline: Pipeline,
    run_lock: Mutex<()>,
    dirty: AtomicBool,
}

impl StateObserver {
    #[must_use]
    pub fn new(client: Arc<UpstreamClient>, config: &Config) -> Self {
        let cache = RuleSetCache::new(
            client.http_client(),
            config.cache_dir(),
            config.api_retry_config.clone(),
        );
        let dispatch = DispatchOrchestrator::new(Arc::clone(&client), cache, config);
        let merger = Merger::new(config.intermediate_dir(), PathBuf::from(&config.downstream_rules_path));
        let reloader = Reloader::new(config.downstream_reload_command.clone());

        Self {
            client,
            polling_interval: Duration::from_secs_f64(config.polling_interval),
            debounce_interval: Duration::from_secs_f64(config.debounce_interval),
            pipeline: Pipeline {
                dispatch,
                merger,
                reloader,
            },
            run_lock: Mutex::new(()),
            dirty: AtomicBool::new(false),
        }
    }

    /// Runs the poll/debounce/dispatch loop until `shutdown` fires. An
    /// in-flight pipeline run is allowed to finish; a pending (not yet
    /// fired) debounce timer is simply dropped.
    pub async fn run(self: Arc<Self>, shutdown: ShutdownSignal) {
        let mut last_hash: Option<String> = None;
        let mut debounce_handle: Option<JoinHandle<()>> = None;
        let mut interval = tokio::time::interval(self.polling_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.snapshot_hash().await {
                        Ok(hash) => {
                            let changed = last_hash.as_ref().is_some_and(|last| last != &hash);
                            if changed {
                                tracing::info!("upstream state changed, arming debounce timer");
                                if let Some(handle) = debounce_handle.take() {
                                    handle.abort();
                                }
                                let this = Arc::clone(&self);
                                let debounce_interval = self.debounce_interval;
                                debounce_handle = Some(tokio::spawn(async move {
                                    tokio::time::sleep(debounce_interval).await;
                                    this.trigger().await;
                                }));
                            }
                            last_hash = Some(hash);
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "failed to compute upstream state snapshot, will retry next poll");
                        }
                    }
                }
                () = shutdown.wait() => {
                    if let Some(handle) = debounce_handle.take() {
                        handle.abort();
                    }
                    tracing::info!("shutdown signal received, observer loop exiting");
                    break;
                }
            }
        }
    }

    /// Single-flight entry point: if a run is already in progress, mark the
    /// dirty flag and return; the in-flight run checks the flag after it
    /// finishes and re-triggers exactly once.
    async fn trigger(&self) {
        let Ok(_guard) = self.run_lock.try_lock() else {
            self.dirty.store(true, Ordering::SeqCst);
            return;
        };

        loop {
            self.pipeline.run_once().await;
            if !self.dirty.swap(false, Ordering::SeqCst) {
                break;
            }
            tracing::info!("change arrived during an in-flight run, re-running pipeline once more");
        }
    }

    /// SHA-256 over the canonicalized JSON of `{proxies, rule_providers}`,
    /// restricted to the fields that matter for routing-decision equality.
    /// Only strategy groups contribute to `proxies`; concrete nodes do not.
    async fn snapshot_hash(&self) -> Result<String, crate::error::SyncError> {
        let (proxies, providers) =
            tokio::try_join!(self.client.get_proxies(), self.client.get_rule_providers())?;

        let mut resolver = PolicyResolver::new(&proxies.proxies);
        let mut proxy_snapshot = BTreeMap::new();
        for (name, node) in &proxies.proxies {
            if !node.is_group() {
                continue;
            }
            let Some(now) = &node.now else { continue };
            let resolved = resolver.resolve(now);
            proxy_snapshot.insert(name.clone(), resolved.as_str());
        }

        let mut provider_snapshot = BTreeMap::new();
        for (name, record) in &providers.providers {
            provider_snapshot.insert(
                name.clone(),
                ProviderSnapshot {
                    updated_at: record.updated_at.clone(),
                    vehicle_type: record.vehicle_type.clone(),
                },
            );
        }

        let canonical = serde_json::json!({
            "proxies": proxy_snapshot,
            "providers": provider_snapshot,
        });
        let canonical_bytes = serde_json::to_vec(&canonical)
            .map_err(|e| crate::error::SyncError::Config(e.to_string()))?;

        let mut hasher = Sha256::new();
        hasher.update(&canonical_bytes);
        Ok(hex::encode(hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_signal_fires_idempotently() {
        let signal = ShutdownSignal::new();
        assert!(!signal.fired.load(Ordering::SeqCst));
        signal.trigger();
        signal.trigger();
        assert!(signal.fired.load(Ordering::SeqCst));
    }
}
