//! Chain and endpoint identity types.

use serde::{Deserialize, Serialize};
use url::Url;

/// Chain ID type for strong typing. Each chain is one logical endpoint group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChainId(pub u64);

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<ChainId> for u64 {
    fn from(id: ChainId) -> Self {
        id.0
    }
}

impl std::fmt::Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable identity of one upstream endpoint within a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointIdentity {
    url: String,
    provider_name: String,
}

impl EndpointIdentity {
    /// Build an identity from an endpoint URL.
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let provider_name = derive_provider_name(&url);
        Self { url, provider_name }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Short provider label used in logs, metrics and store keys.
    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }
}

impl std::fmt::Display for EndpointIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.url)
    }
}

/// Derive a provider label from the URL host.
///
/// Well-known hosted providers collapse to their brand name so that rotating
/// API keys does not change the label. Anything else uses the host (and port).
pub fn derive_provider_name(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return "UNKNOWN".to_string();
    };
    let Some(host) = parsed.host_str() else {
        return "UNKNOWN".to_string();
    };
    let host = host.to_ascii_lowercase();

    const KNOWN: [(&str, &str); 6] = [
        ("infura", "INFURA"),
        ("alchemy", "ALCHEMY"),
        ("quiknode", "QUICKNODE"),
        ("ankr", "ANKR"),
        ("llamarpc", "LLAMARPC"),
        ("blastapi", "BLAST"),
    ];
    if let Some((_, name)) = KNOWN.iter().find(|(needle, _)| host.contains(needle)) {
        return name.to_string();
    }

    let mut name = host.replace('.', "-").to_ascii_uppercase();
    if let Some(port) = parsed.port() {
        name.push('-');
        name.push_str(&port.to_string());
    }
    name
}
