//! Proxy naming (spec §4.I): expose every upstream tool under a distinct,
//! length-bounded name in the outer tool namespace.

use dashmap::DashMap;
use sha2::{Digest, Sha256};

const COMPACT_PREFIX: &str = "up_";
const LEGACY_PREFIX: &str = "upstream__";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedProxyName {
    /// `up_<server_id>_<tool>`
    Compact { server_id: String, tool: String },
    /// `up_<hash>_<tool>` (or `up_<hash>_<truncated-tool>..`)
    Hash { hash_prefix: String, tool: String },
    /// `upstream__<server_id>__<tool>`, accepted on parse, never produced.
    Legacy { server_id: String, tool: String },
}

/// Generates and parses proxy names, keeping the hash -> server_id
/// reverse map populated as names are generated (spec §4.I parsing rule).
#[derive(Default)]
pub struct ProxyNaming {
    reverse_hash: DashMap<String, String>,
}

impl ProxyNaming {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compact_name(server_id: &str, tool: &str) -> String {
        format!("{COMPACT_PREFIX}{server_id}_{tool}")
    }

    /// Implements the three-step fallback: compact, then hash (8/6/4 hex
    /// prefix, truncating the tool name with an ellipsis marker as a last
    /// resort), never producing the legacy form.
    pub fn generate(&self, server_id: &str, tool: &str, max_len: usize) -> String {
        let compact = Self::compact_name(server_id, tool);
        if compact.len() <= max_len {
            return compact;
        }

        let digest = Sha256::digest(server_id.as_bytes());
        let hex = hex_string(&digest);

        for prefix_len in [8usize, 6, 4] {
            let prefix = &hex[..prefix_len];
            let candidate = format!("{COMPACT_PREFIX}{prefix}_{tool}");
            if candidate.len() <= max_len {
                self.reverse_hash.insert(prefix.to_string(), server_id.to_string());
                return candidate;
            }
        }

        let prefix = &hex[..4];
        self.reverse_hash.insert(prefix.to_string(), server_id.to_string());
        let fixed_len = format!("{COMPACT_PREFIX}{prefix}_..").len();
        let budget = max_len.saturating_sub(fixed_len);
        let truncated: String = tool.chars().take(budget).collect();
        tracing::warn!(
            server_id,
            tool,
            max_len,
            "tool name overflows proxy-name budget even under hash fallback; truncating with ellipsis marker"
        );
        format!("{COMPACT_PREFIX}{prefix}_{truncated}..")
    }

    /// Recognises all three forms. A leading 4-8 hex-character token is
    /// treated as a hash alias; otherwise it's a literal `server_id`.
    pub fn parse(&self, name: &str) -> Option<ParsedProxyName> {
        if let Some(rest) = name.strip_prefix(LEGACY_PREFIX) {
            let (server_id, tool) = rest.split_once("__")?;
            return Some(ParsedProxyName::Legacy {
                server_id: server_id.to_string(),
                tool: tool.to_string(),
            });
        }

        let rest = name.strip_prefix(COMPACT_PREFIX)?;
        let (token, tool) = rest.split_once('_')?;
        if is_hash_token(token) {
            Some(ParsedProxyName::Hash {
                hash_prefix: token.to_string(),
                tool: tool.trim_end_matches("..").to_string(),
            })
        } else {
            Some(ParsedProxyName::Compact {
                server_id: token.to_string(),
                tool: tool.to_string(),
            })
        }
    }

    /// Resolves a hash alias recorded by an earlier `generate` call back
    /// to its originating `server_id`.
    pub fn resolve_hash(&self, hash_prefix: &str) -> Option<String> {
        self.reverse_hash.get(hash_prefix).map(|e| e.value().clone())
    }
}

fn is_hash_token(token: &str) -> bool {
    matches!(token.len(), 4 | 6 | 8) && token.chars().all(|c| c.is_ascii_hexdigit())
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_name_under_budget_round_trips() {
        let naming = ProxyNaming::new();
        let name = naming.generate("srv1", "sum", 60);
        assert_eq!(name, "up_srv1_sum");
        match naming.parse(&name).unwrap() {
            ParsedProxyName::Compact { server_id, tool } => {
                assert_eq!(server_id, "srv1");
                assert_eq!(tool, "sum");
            }
            other => panic!("expected compact, got {other:?}"),
        }
    }

    #[test]
    fn tight_budget_falls_back_to_hash_and_resolves() {
        let naming = ProxyNaming::new();
        let server_id = "windows-driver-input";
        let tool = "Input-RateLimiter-Config";
        let max_len = 47;
        let name = naming.generate(server_id, tool, max_len);
        assert!(name.len() <= max_len, "name {name} exceeds budget {max_len}");

        match naming.parse(&name).unwrap() {
            ParsedProxyName::Hash { hash_prefix, tool: parsed_tool } => {
                assert_eq!(parsed_tool, tool);
                assert_eq!(naming.resolve_hash(&hash_prefix).as_deref(), Some(server_id));
            }
            other => panic!("expected hash fallback, got {other:?}"),
        }
    }

    #[test]
    fn legacy_form_parses_but_is_never_generated() {
        let naming = ProxyNaming::new();
        let parsed = naming.parse("upstream__srv1__sum").unwrap();
        assert_eq!(
            parsed,
            ParsedProxyName::Legacy {
                server_id: "srv1".to_string(),
                tool: "sum".to_string()
            }
        );
    }
}
