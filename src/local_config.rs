//! Parses an optional local YAML file that supplies rule-provider metadata
//! overriding the upstream-reported providers.

use std::collections::HashMap;
use std::path::Path;

use crate::model::ProviderRecord;

/// Read `rule-providers` from a local YAML config file. A missing or
/// unreadable file is non-fatal — callers fall back to the upstream-supplied
/// provider list.
pub async fn load_local_providers(path: &Path) -> HashMap<String, ProviderRecord> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "no local provider config, falling back to upstream providers");
            return HashMap::new();
        }
    };

    match serde_yaml::from_str::<LocalConfig>(&contents) {
        Ok(config) => config.rule_providers,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "failed to parse local provider config");
            HashMap::new()
        }
    }
}

#[derive(Debug, Default, serde::Deserialize)]
struct LocalConfig {
    #[serde(default, rename = "rule-providers")]
    rule_providers: HashMap<String, ProviderRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_returns_empty_map() {
        let providers = load_local_providers(Path::new("/nonexistent/path.yaml")).await;
        assert!(providers.is_empty());
    }

    #[tokio::test]
    async fn parses_rule_providers_with_anchors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        tokio::fs::write(
            &path,
            r#"
common: &common
  type: http
  behavior: domain
  interval: 86400

rule-providers:
  ads:
    <<: *common
    url: "https://example.com/ads.txt"
  private:
    <<: *common
    behavior: ipcidr
    url: "https://example.com/private.txt"
"#,
        )
        .await
        .unwrap();

        let providers = load_local_providers(&path).await;
        assert_eq!(providers.len(), 2);
        assert_eq!(providers["ads"].behavior, "domain");
        assert_eq!(providers["private"].behavior, "ipcidr");
        assert_eq!(providers["ads"].url, "https://example.com/ads.txt");
    }
}
