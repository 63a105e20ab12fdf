//! Wire types for the upstream router's read-only API, plus the canonical
//! domain vocabulary (policies, rule families, provider behaviors) that the
//! rest of the pipeline operates on.

use std::collections::HashMap;

use serde::Deserialize;

/// `GET /rules` response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct RulesResponse {
    #[serde(default)]
    pub rules: Vec<UpstreamRule>,
}

/// A single routing rule as reported by the upstream router.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamRule {
    #[serde(rename = "type")]
    pub rule_type: String,
    pub payload: String,
    #[serde(default, alias = "provider")]
    pub proxy: Option<String>,
}

/// `GET /proxies` response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxiesResponse {
    #[serde(default)]
    pub proxies: HashMap<String, ProxyNode>,
}

/// A single node in the proxy/policy graph: either a concrete proxy (no
/// `all` field), or a strategy group (`all` holds its member names).
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyNode {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub now: Option<String>,
    #[serde(default)]
    pub all: Option<Vec<String>>,
}

impl ProxyNode {
    /// A node is a strategy group iff it carries a non-empty `all` list,
    /// independent of its declared `type` string.
    #[must_use]
    pub fn is_group(&self) -> bool {
        self.all.as_ref().is_some_and(|members| !members.is_empty())
    }
}

/// `GET /providers/rules` response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersResponse {
    #[serde(default)]
    pub providers: HashMap<String, ProviderRecord>,
}

/// Metadata for a single external rule-set provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub behavior: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default, rename = "updatedAt")]
    pub updated_at: Option<String>,
    #[serde(default, rename = "vehicleType")]
    pub vehicle_type: Option<String>,
}

/// The reduced routing decision a policy resolves to, after walking through
/// any number of strategy-group indirections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalPolicy {
    Direct,
    Proxy,
    Reject,
}

impl CanonicalPolicy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CanonicalPolicy::Direct => "DIRECT",
            CanonicalPolicy::Proxy => "PROXY",
            CanonicalPolicy::Reject => "REJECT",
        }
    }

    /// Lowercase form used for intermediate/final directory and file names.
    #[must_use]
    pub fn dir_name(self) -> &'static str {
        match self {
            CanonicalPolicy::Direct => "direct",
            CanonicalPolicy::Proxy => "proxy",
            CanonicalPolicy::Reject => "reject",
        }
    }

    pub const ALL: [CanonicalPolicy; 3] = [
        CanonicalPolicy::Direct,
        CanonicalPolicy::Proxy,
        CanonicalPolicy::Reject,
    ];
}

/// The downstream DNS dialect's rule families, one output file set per
/// `(policy, family)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Domain,
    Ipv4,
    Ipv6,
}

impl Family {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Family::Domain => "domain",
            Family::Ipv4 => "ipv4",
            Family::Ipv6 => "ipv6",
        }
    }

    pub const ALL: [Family; 3] = [Family::Domain, Family::Ipv4, Family::Ipv6];
}

/// Rule-provider fetch/parse behavior, mirrored from the upstream's own
/// `behavior` field (`domain`, `ipcidr`, `classical`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Domain,
    IpCidr,
    Classical,
}

impl Behavior {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "domain" => Some(Behavior::Domain),
            "ipcidr" => Some(Behavior::IpCidr),
            "classical" => Some(Behavior::Classical),
            _ => None,
        }
    }
}
