//! Dispatch phase: fetches upstream state, resolves policies, converts
//! rules, drives the rule-set cache, and aggregates everything into the
//! per-run intermediate tree.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::cache::RuleSetCache;
use crate::config::Config;
use crate::convert::{convert_inline, parse_provider_body, rewrite_binary_url};
use crate::error::SyncError;
use crate::local_config::load_local_providers;
use crate::model::{Behavior, CanonicalPolicy, Family, ProviderRecord, ProxyNode, UpstreamRule};
use crate::policy::PolicyResolver;
use crate::transport::UpstreamClient;

/// In-memory aggregator: `(policy, family, shard)` -> sorted/unique lines.
/// `shard` is `_inline_rules` for converted inline rules, or
/// `provider_<name>` for one rule-set provider's expansion.
type Bucket = HashMap<(CanonicalPolicy, Family, String), HashSet<String>>;

pub const INLINE_SHARD: &str = "_inline_rules";

pub struct DispatchOrchestrator {
    client: std::sync::Arc<UpstreamClient>,
    cache: RuleSetCache,
    intermediate_dir: PathBuf,
    local_config_path: Option<PathBuf>,
}

impl DispatchOrchestrator {
    #[must_use]
    pub fn new(client: std::sync::Arc<UpstreamClient>, cache: RuleSetCache, config: &Config) -> Self {
        Self {
            client,
            cache,
            intermediate_dir: config.intermediate_dir(),
            local_config_path: config.upstream_local_config_path.as_ref().map(PathBuf::from),
        }
    }

    /// Run the full dispatch phase; returns the intermediate directory path.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] if fetching upstream state fails after retries,
    /// or if preparing/writing the intermediate tree fails.
    pub async fn run(&self) -> Result<PathBuf, SyncError> {
        self.prepare_workspace().await?;

        let (rules, proxies, mut providers, _configs) = tokio::try_join!(
            self.client.get_rules(),
            self.client.get_proxies(),
            self.client.get_rule_providers(),
            self.client.get_configs(),
        )?;

        if let Some(path) = &self.local_config_path {
            let local_providers = load_local_providers(path).await;
            providers.providers.extend(local_providers);
        }

        let urls = collect_provider_urls(&rules.rules, &providers.providers);
        self.cache.ensure_updated(&urls).await;

        let mut resolver = PolicyResolver::new(&proxies.proxies);
        let mut bucket: Bucket = HashMap::new();

        for rule in &rules.rules {
            self.dispatch_rule(rule, &providers.providers, &mut resolver, &mut bucket)
                .await;
        }

        self.write_intermediate(&bucket).await?;
        Ok(self.intermediate_dir.clone())
    }

    async fn prepare_workspace(&self) -> Result<(), SyncError> {
        if tokio::fs::try_exists(&self.intermediate_dir).await? {
            tokio::fs::remove_dir_all(&self.intermediate_dir).await?;
        }
        for policy in CanonicalPolicy::ALL {
            tokio::fs::create_dir_all(self.intermediate_dir.join(policy.dir_name())).await?;
        }
        Ok(())
    }

    async fn dispatch_rule(
        &self,
        rule: &UpstreamRule,
        providers: &HashMap<String, ProviderRecord>,
        resolver: &mut PolicyResolver<'_>,
        bucket: &mut Bucket,
    ) {
        let Some(policy_name) = &rule.proxy else {
            tracing::warn!(rule_type = %rule.rule_type, "skipping rule with no proxy/policy field");
            return;
        };
        let policy = resolver.resolve(policy_name);

        if rule.rule_type.eq_ignore_ascii_case("rule-set") {
            self.dispatch_rule_set(&rule.payload, providers, policy, bucket)
                .await;
            return;
        }

        match convert_inline(&rule.rule_type, &rule.payload) {
            Some(converted) => {
                bucket
                    .entry((policy, converted.family, INLINE_SHARD.to_string()))
                    .or_default()
                    .insert(converted.line);
            }
            None => {
                tracing::debug!(rule_type = %rule.rule_type, "rule did not convert to a downstream line, skipping");
            }
        }
    }

    async fn dispatch_rule_set(
        &self,
        provider_name: &str,
        providers: &HashMap<String, ProviderRecord>,
        policy: CanonicalPolicy,
        bucket: &mut Bucket,
    ) {
        let Some(provider) = providers.get(provider_name) else {
            tracing::warn!(provider = provider_name, "unknown rule-set provider, skipping rule");
            return;
        };
        let Some(behavior) = Behavior::parse(&provider.behavior) else {
            tracing::warn!(provider = provider_name, behavior = %provider.behavior, "unsupported provider behavior, skipping rule");
            return;
        };

        let url = rewrite_binary_url(&provider.url, &provider.format, behavior);
        let cache_path = self.cache.path_for(&url);

        let body = match tokio::fs::read_to_string(&cache_path).await {
            Ok(body) => body,
            Err(err) => {
                tracing::warn!(provider = provider_name, url, error = %err, "rule-set content unavailable, skipping");
                return;
            }
        };

        let shard = format!("provider_{provider_name}");
        for converted in parse_provider_body(&body, behavior) {
            bucket
                .entry((policy, converted.family, shard.clone()))
                .or_default()
                .insert(converted.line);
        }
    }

    async fn write_intermediate(&self, bucket: &Bucket) -> Result<(), SyncError> {
        for ((policy, family, shard), lines) in bucket {
            if lines.is_empty() {
                continue;
            }
            let dir = self
                .intermediate_dir
                .join(policy.dir_name())
                .join(family.as_str());
            tokio::fs::create_dir_all(&dir).await?;

            let mut sorted: Vec<&String> = lines.iter().collect();
            sorted.sort();
            let mut contents = String::new();
            for line in sorted {
                contents.push_str(line);
                contents.push('\n');
            }

            let file_path = dir.join(format!("{shard}.list"));
            write_file(&file_path, contents.as_bytes()).await?;
        }
        Ok(())
    }
}

/// Walk rules for `RULE-SET` entries and collect their (binary-rewritten)
/// provider URLs into a set, deduplicating fetches across rules that share a
/// provider.
fn collect_provider_urls(
    rules: &[UpstreamRule],
    providers: &HashMap<String, ProviderRecord>,
) -> Vec<String> {
    let mut urls = HashSet::new();
    for rule in rules {
        if !rule.rule_type.eq_ignore_ascii_case("rule-set") {
            continue;
        }
        let Some(provider) = providers.get(&rule.payload) else {
            continue;
        };
        let Some(behavior) = Behavior::parse(&provider.behavior) else {
            continue;
        };
        if provider.url.is_empty() {
            continue;
        }
        urls.insert(rewrite_binary_url(&provider.url, &provider.format, behavior));
    }
    urls.into_iter().collect()
}

async fn write_file(path: &Path, contents: &[u8]) -> Result<(), SyncError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp_path = dir.join(format!(
        ".{}.tmp-{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("shard"),
        std::process::id()
    ));
    tokio::fs::write(&tmp_path, contents).await?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| SyncError::Write(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(kind: &str) -> ProxyNode {
        ProxyNode {
            kind: kind.to_string(),
            now: None,
            all: None,
        }
    }

    fn group(kind: &str, now: &str, members: &[&str]) -> ProxyNode {
        ProxyNode {
            kind: kind.to_string(),
            now: Some(now.to_string()),
            all: Some(members.iter().map(|s| s.to_string()).collect()),
        }
    }

    #[test]
    fn collect_provider_urls_dedups_and_rewrites() {
        let rules = vec![
            UpstreamRule {
                rule_type: "RULE-SET".to_string(),
                payload: "ads".to_string(),
                proxy: Some("REJECT".to_string()),
            },
            UpstreamRule {
                rule_type: "RULE-SET".to_string(),
                payload: "ads".to_string(),
                proxy: Some("DIRECT".to_string()),
            },
        ];
        let mut providers = HashMap::new();
        providers.insert(
            "ads".to_string(),
            ProviderRecord {
                name: "ads".to_string(),
                behavior: "domain".to_string(),
                format: "binary".to_string(),
                url: "https://example.com/ads.mrs".to_string(),
                path: None,
                updated_at: None,
                vehicle_type: None,
            },
        );

        let urls = collect_provider_urls(&rules, &providers);
        assert_eq!(urls, vec!["https://example.com/ads.list".to_string()]);
    }

    #[tokio::test]
    async fn seed_scenario_canonicalization() {
        // S1: chained selectors, inline DOMAIN rule resolves to PROXY.
        let mut proxies = HashMap::new();
        proxies.insert("G".to_string(), group("selector", "H", &["H"]));
        proxies.insert("H".to_string(), group("selector", "P", &["P"]));
        proxies.insert("P".to_string(), node("vmess"));

        let mut resolver = PolicyResolver::new(&proxies);
        let rule = UpstreamRule {
            rule_type: "DOMAIN".to_string(),
            payload: "example.com".to_string(),
            proxy: Some("G".to_string()),
        };
        let policy = resolver.resolve(rule.proxy.as_ref().unwrap());
        assert_eq!(policy, CanonicalPolicy::Proxy);
        let converted = convert_inline(&rule.rule_type, &rule.payload).unwrap();
        assert_eq!(converted.line, "full:example.com");
    }
}
