//! Translates upstream rule syntax into the downstream DNS dialect, and
//! parses the three rule-set provider file formats.

use crate::model::{Behavior, Family};

/// A converted inline rule: one output line plus the family it belongs to.
pub struct Converted {
    pub line: String,
    pub family: Family,
}

/// Convert a single inline rule. Returns `None` for unsupported rule types
/// and for `RULE-SET` (which is expanded separately via provider content,
/// not through this function).
#[must_use]
pub fn convert_inline(rule_type: &str, payload: &str) -> Option<Converted> {
    match rule_type {
        "DOMAIN" => Some(Converted {
            line: format!("full:{payload}"),
            family: Family::Domain,
        }),
        "DOMAIN-SUFFIX" | "DomainSuffix" => Some(Converted {
            line: convert_domain_suffix(payload),
            family: Family::Domain,
        }),
        "DOMAIN-KEYWORD" => Some(Converted {
            line: format!("keyword:{payload}"),
            family: Family::Domain,
        }),
        "DOMAIN-WILDCARD" => Some(Converted {
            line: convert_domain_wildcard(payload),
            family: Family::Domain,
        }),
        "DOMAIN-REGEX" => Some(Converted {
            line: format!("regexp:{payload}"),
            family: Family::Domain,
        }),
        "IP-CIDR" | "IPCIDR" | "IP-SUFFIX" => Some(Converted {
            line: payload.to_string(),
            family: ip_family(payload),
        }),
        "IP-CIDR6" => Some(Converted {
            line: payload.to_string(),
            family: Family::Ipv6,
        }),
        _ => {
            tracing::debug!(rule_type, "skipping unsupported inline rule type");
            None
        }
    }
}

fn convert_domain_suffix(payload: &str) -> String {
    if let Some(rest) = payload.strip_prefix("*.") {
        format!("domain:{rest}")
    } else if let Some(rest) = payload.strip_prefix("+.") {
        format!("domain:{rest}")
    } else if let Some(rest) = payload.strip_prefix('.') {
        format!("domain:{rest}")
    } else if payload == "*" {
        "keyword:".to_string()
    } else {
        format!("domain:{payload}")
    }
}

fn convert_domain_wildcard(payload: &str) -> String {
    if let Some(rest) = payload.strip_prefix("*.") {
        format!("domain:{rest}")
    } else if payload.starts_with('*') {
        "keyword:".to_string()
    } else {
        format!("keyword:{payload}")
    }
}

/// An `ip-cidr` literal is `ipv4` iff it contains `.`, `ipv6` iff it
/// contains `:` and no `.`.
#[must_use]
pub fn ip_family(payload: &str) -> Family {
    if payload.contains('.') {
        Family::Ipv4
    } else {
        Family::Ipv6
    }
}

/// Rewrite a provider URL whose `format` is `binary`/`mrs` to the list/yaml
/// equivalent appropriate to `behavior` — an upstream-ecosystem convention
/// that must be preserved verbatim for `RULE-SET` providers to resolve.
#[must_use]
pub fn rewrite_binary_url(url: &str, format: &str, behavior: Behavior) -> String {
    if !format.eq_ignore_ascii_case("binary") && !format.eq_ignore_ascii_case("mrs") {
        return url.to_string();
    }
    match behavior {
        Behavior::Domain | Behavior::IpCidr => url.replacen(".mrs", ".list", 1),
        Behavior::Classical => url.replacen(".mrs", ".yaml", 1),
    }
}

/// Parse a provider file body under a given behavior into downstream lines,
/// already tagged with their family where the behavior implies one.
#[must_use]
pub fn parse_provider_body(body: &str, behavior: Behavior) -> Vec<Converted> {
    match behavior {
        Behavior::Domain => parse_domain_body(body),
        Behavior::IpCidr => parse_ipcidr_body(body),
        Behavior::Classical => parse_classical_body(body),
    }
}

fn non_comment_lines(body: &str) -> impl Iterator<Item = &str> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

fn parse_domain_body(body: &str) -> Vec<Converted> {
    non_comment_lines(body)
        .map(|line| Converted {
            line: convert_domain_suffix(line),
            family: Family::Domain,
        })
        .collect()
}

fn parse_ipcidr_body(body: &str) -> Vec<Converted> {
    non_comment_lines(body)
        .filter(|line| line.contains('/'))
        .map(|line| Converted {
            line: line.to_string(),
            family: ip_family(line),
        })
        .collect()
}

/// Accepts either bare `TYPE,payload[,...]` lines, or a YAML document
/// shaped like `{ payload: ["TYPE,value", ...] }` — the upstream's classical
/// rule-sets are themselves served as YAML wrapping the same line grammar.
fn parse_classical_body(body: &str) -> Vec<Converted> {
    #[derive(serde::Deserialize)]
    struct ClassicalDoc {
        #[serde(default)]
        payload: Vec<String>,
    }

    if let Ok(doc) = serde_yaml::from_str::<ClassicalDoc>(body) {
        if !doc.payload.is_empty() {
            return doc
                .payload
                .iter()
                .filter_map(|line| parse_classical_line(line))
                .collect();
        }
    }

    non_comment_lines(body)
        .filter_map(parse_classical_line)
        .collect()
}

fn parse_classical_line(line: &str) -> Option<Converted> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let mut parts = line.splitn(2, ',');
    let rule_type = parts.next()?.trim();
    let rest = parts.next()?.trim();
    // Extra trailing fields (e.g. `,no-resolve`) are ignored by taking only
    // the payload up to the next comma when the downstream line itself
    // doesn't need them.
    let payload = rest.split(',').next().unwrap_or(rest).trim();
    convert_inline(rule_type, payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_suffix_boundary_payloads() {
        assert_eq!(convert_domain_suffix("*"), "keyword:");
        assert_eq!(convert_domain_suffix("*.x"), "domain:x");
        assert_eq!(convert_domain_suffix("+.x"), "domain:x");
        assert_eq!(convert_domain_suffix(".x"), "domain:x");
        assert_eq!(convert_domain_suffix("plain.com"), "domain:plain.com");
    }

    #[test]
    fn domain_rule_is_full() {
        let converted = convert_inline("DOMAIN", "example.com").unwrap();
        assert_eq!(converted.line, "full:example.com");
        assert!(matches!(converted.family, Family::Domain));
    }

    #[test]
    fn ip_cidr_family_split() {
        assert!(matches!(ip_family("1.2.3.0/24"), Family::Ipv4));
        assert!(matches!(ip_family("2001:db8::/32"), Family::Ipv6));
    }

    #[test]
    fn unsupported_rule_type_is_skipped() {
        assert!(convert_inline("GEOIP", "CN").is_none());
    }

    #[test]
    fn rule_set_type_is_not_converted_here() {
        assert!(convert_inline("RULE-SET", "my-provider").is_none());
    }

    #[test]
    fn binary_url_rewritten_per_behavior() {
        assert_eq!(
            rewrite_binary_url("https://x/list.mrs", "binary", Behavior::Domain),
            "https://x/list.list"
        );
        assert_eq!(
            rewrite_binary_url("https://x/list.mrs", "binary", Behavior::Classical),
            "https://x/list.yaml"
        );
        assert_eq!(
            rewrite_binary_url("https://x/list.txt", "text", Behavior::Domain),
            "https://x/list.txt"
        );
    }

    #[test]
    fn classical_body_bare_lines() {
        let body = "DOMAIN,example.com\nDOMAIN-SUFFIX,example.org\n# comment\nGEOIP,CN\n";
        let lines = parse_classical_body(body);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].line, "full:example.com");
        assert_eq!(lines[1].line, "domain:example.org");
    }

    #[test]
    fn classical_body_yaml_wrapped() {
        let body = "payload:\n  - 'DOMAIN,example.com'\n  - 'IP-CIDR,1.2.3.0/24'\n";
        let lines = parse_classical_body(body);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].line, "full:example.com");
        assert_eq!(lines[1].line, "1.2.3.0/24");
    }

    #[test]
    fn domain_body_parses_each_line() {
        let body = "*.example.com\nplain.org\n# skip\n\n*\n";
        let lines = parse_domain_body(body);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].line, "domain:example.com");
        assert_eq!(lines[1].line, "domain:plain.org");
        assert_eq!(lines[2].line, "keyword:");
    }

    #[test]
    fn ipcidr_body_skips_lines_without_slash() {
        let body = "1.2.3.0/24\nnotacidr\n2001:db8::/32\n";
        let lines = parse_ipcidr_body(body);
        assert_eq!(lines.len(), 2);
        assert!(matches!(lines[0].family, Family::Ipv4));
        assert!(matches!(lines[1].family, Family::Ipv6));
    }
}
