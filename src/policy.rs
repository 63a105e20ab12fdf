//! Reduces any upstream proxy/policy name to one of the three canonical
//! routing classes by walking the strategy-group graph reported by `/proxies`.

use std::collections::{HashMap, HashSet};

use crate::model::{CanonicalPolicy, ProxyNode};

/// Kind-string -> canonical-policy lookup, seeded with the defaults observed
/// across the upstream ecosystem but never hard-coded into match arms, so an
/// operator could in principle extend it without a code change.
pub struct ProxyKindTable {
    reject_kinds: HashSet<&'static str>,
    direct_kinds: HashSet<&'static str>,
    proxy_kinds: HashSet<&'static str>,
}

impl Default for ProxyKindTable {
    fn default() -> Self {
        Self {
            reject_kinds: ["reject", "reject-drop", "block"].into_iter().collect(),
            direct_kinds: ["direct", "static"].into_iter().collect(),
            proxy_kinds: [
                "shadowsocks",
                "vmess",
                "vless",
                "trojan",
                "snell",
                "socks5",
                "http",
                "https",
                "hysteria",
                "hysteria2",
                "tuic",
                "wireguard",
                "ssh",
                "anytls",
            ]
            .into_iter()
            .collect(),
        }
    }
}

impl ProxyKindTable {
    /// Classify a terminal node by kind and name, case-insensitively, name
    /// substring checks winning over kind-table lookups as in §4.2's table
    /// ("name contains REJECT/BLOCK" is checked alongside the kind set).
    #[must_use]
    pub fn classify(&self, name: &str, kind: &str) -> CanonicalPolicy {
        let kind = kind.to_ascii_lowercase();
        let name_upper = name.to_ascii_uppercase();

        if self.reject_kinds.contains(kind.as_str())
            || name_upper.contains("REJECT")
            || name_upper.contains("BLOCK")
        {
            return CanonicalPolicy::Reject;
        }
        if self.direct_kinds.contains(kind.as_str()) || name_upper.contains("DIRECT") {
            return CanonicalPolicy::Direct;
        }
        if self.proxy_kinds.contains(kind.as_str()) {
            return CanonicalPolicy::Proxy;
        }
        CanonicalPolicy::Direct
    }
}

/// Walks the proxy graph for a single pipeline run. A fresh instance is
/// created per run so its memo table never outlives the `proxies` snapshot
/// it was built against.
pub struct PolicyResolver<'a> {
    proxies: &'a HashMap<String, ProxyNode>,
    kinds: ProxyKindTable,
    memo: HashMap<String, CanonicalPolicy>,
}

impl<'a> PolicyResolver<'a> {
    #[must_use]
    pub fn new(proxies: &'a HashMap<String, ProxyNode>) -> Self {
        Self {
            proxies,
            kinds: ProxyKindTable::default(),
            memo: HashMap::new(),
        }
    }

    /// Resolve `name` to one of `{DIRECT, PROXY, REJECT}`.
    ///
    /// Cycles are detected via a per-call visiting set, logged at `warn`, and
    /// resolved to `DIRECT` — the rule that reached the cycle is still
    /// emitted, just with the conservative policy.
    pub fn resolve(&mut self, name: &str) -> CanonicalPolicy {
        let mut visiting = HashSet::new();
        self.resolve_inner(name, &mut visiting)
    }

    fn resolve_inner(&mut self, name: &str, visiting: &mut HashSet<String>) -> CanonicalPolicy {
        if let Some(cached) = self.memo.get(name) {
            return *cached;
        }
        if visiting.contains(name) {
            tracing::warn!(policy = name, "cycle detected while resolving policy chain, falling back to DIRECT");
            return CanonicalPolicy::Direct;
        }

        let Some(node) = self.proxies.get(name) else {
            // Unknown nodes behave as terminal, classified purely by name.
            let resolved = self.kinds.classify(name, "");
            self.memo.insert(name.to_string(), resolved);
            return resolved;
        };

        let resolved = if node.is_group() {
            visiting.insert(name.to_string());
            let resolved = match &node.now {
                Some(now) => self.resolve_inner(now, visiting),
                None => CanonicalPolicy::Direct,
            };
            visiting.remove(name);
            resolved
        } else {
            self.kinds.classify(name, &node.kind)
        };

        self.memo.insert(name.to_string(), resolved);
        resolved
    }
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
    fn resolves_through_chained_groups() {
        let mut proxies = HashMap::new();
        proxies.insert("G".to_string(), group("selector", "H", &["H"]));
        proxies.insert("H".to_string(), group("selector", "P", &["P"]));
        proxies.insert("P".to_string(), node("vmess"));

        let mut resolver = PolicyResolver::new(&proxies);
        assert_eq!(resolver.resolve("G"), CanonicalPolicy::Proxy);
    }

    #[test]
    fn cycle_resolves_to_direct() {
        let mut proxies = HashMap::new();
        proxies.insert("A".to_string(), group("selector", "B", &["B"]));
        proxies.insert("B".to_string(), group("selector", "A", &["A"]));

        let mut resolver = PolicyResolver::new(&proxies);
        assert_eq!(resolver.resolve("A"), CanonicalPolicy::Direct);
    }

    #[test]
    fn reject_kind_and_name_substring_both_classify_as_reject() {
        let mut proxies = HashMap::new();
        proxies.insert("REJECT".to_string(), node("reject"));
        proxies.insert("MyBlockList".to_string(), node("unknown-kind"));

        let mut resolver = PolicyResolver::new(&proxies);
        assert_eq!(resolver.resolve("REJECT"), CanonicalPolicy::Reject);
        assert_eq!(resolver.resolve("MyBlockList"), CanonicalPolicy::Reject);
    }

    #[test]
    fn group_with_no_now_resolves_to_direct() {
        let mut proxies = HashMap::new();
        proxies.insert(
            "Empty".to_string(),
            ProxyNode {
                kind: "selector".to_string(),
                now: None,
                all: Some(vec!["X".to_string()]),
            },
        );

        let mut resolver = PolicyResolver::new(&proxies);
        assert_eq!(resolver.resolve("Empty"), CanonicalPolicy::Direct);
    }

    #[test]
    fn memoizes_across_calls() {
        let mut proxies = HashMap::new();
        proxies.insert("P".to_string(), node("vmess"));
        let mut resolver = PolicyResolver::new(&proxies);
        assert_eq!(resolver.resolve("P"), CanonicalPolicy::Proxy);
        assert_eq!(resolver.memo.len(), 1);
        assert_eq!(resolver.resolve("P"), CanonicalPolicy::Proxy);
        assert_eq!(resolver.memo.len(), 1);
    }
}
