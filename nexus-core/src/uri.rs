//! The `agent://` URI scheme.
//!
//! A Nexus URI pins an agent to a permanent, resolvable name:
//!
//! ```text
//! agent://<trust_root>/<capability>/<primary_skill>/<agent_id>   (4-segment)
//! agent://<trust_root>/<capability>/<agent_id>                   (3-segment)
//! ```
//!
//! The trust root is either a DNS-verified domain or the literal `nap` for
//! registry-hosted agents. Every field encoded in the URI is immutable for
//! the lifetime of the agent.

use crate::{RegistryError, RegistryResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// URI scheme prefix, including the authority separator.
pub const URI_SCHEME: &str = "agent://";

/// Trust root used by all registry-hosted agents.
pub const HOSTED_TRUST_ROOT: &str = "nap";

/// Prefix of every external agent identifier.
pub const AGENT_ID_PREFIX: &str = "agent_";

/// Number of random characters following the prefix.
pub const AGENT_ID_RANDOM_LEN: usize = 10;

/// Lowercase RFC 4648 base32 alphabet used for agent id suffixes.
pub const AGENT_ID_ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";

/// Canonical separator between capability levels in storage.
pub const CAPABILITY_SEPARATOR: char = '>';

/// Maximum number of capability levels.
pub const MAX_CAPABILITY_DEPTH: usize = 3;

// ============================================================================
// TRUST ROOT
// ============================================================================

/// The identity anchor at the head of an agent URI.
///
/// Domain roots are only meaningful once the domain has passed DNS-01
/// verification; hosted roots are always the fixed literal `nap` and are
/// never derived from user input, which is what prevents a hosted user
/// named `amazon` from minting `agent://amazon/...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TrustRoot {
    /// A DNS-verified apex or subdomain, stored lowercase.
    Domain(String),
    /// The registry-hosted namespace, rendered as `nap`.
    Hosted,
}

impl TrustRoot {
    /// Parse and validate a trust root string.
    pub fn parse(s: &str) -> RegistryResult<Self> {
        let s = s.trim().to_ascii_lowercase();
        if s == HOSTED_TRUST_ROOT {
            return Ok(TrustRoot::Hosted);
        }
        validate_domain(&s)?;
        Ok(TrustRoot::Domain(s))
    }

    /// The domain name, when this is a domain root.
    pub fn domain(&self) -> Option<&str> {
        match self {
            TrustRoot::Domain(d) => Some(d),
            TrustRoot::Hosted => None,
        }
    }

    /// Whether this is the hosted (`nap`) namespace.
    pub fn is_hosted(&self) -> bool {
        matches!(self, TrustRoot::Hosted)
    }

    /// String form as it appears in URIs and storage.
    pub fn as_str(&self) -> &str {
        match self {
            TrustRoot::Domain(d) => d,
            TrustRoot::Hosted => HOSTED_TRUST_ROOT,
        }
    }
}

impl fmt::Display for TrustRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrustRoot {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TrustRoot::parse(s)
    }
}

impl Serialize for TrustRoot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TrustRoot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        TrustRoot::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Validate an FQDN: dotted lowercase labels of `[a-z0-9-]`, no empty or
/// hyphen-edged labels, at most 253 bytes total.
pub fn validate_domain(domain: &str) -> RegistryResult<()> {
    let invalid = |reason: &str| RegistryError::Validation {
        field: "domain".to_string(),
        reason: reason.to_string(),
    };

    if domain.is_empty() || domain.len() > 253 {
        return Err(invalid("must be 1-253 characters"));
    }
    if !domain.contains('.') {
        return Err(invalid("must be a fully qualified domain name"));
    }
    for label in domain.split('.') {
        if label.is_empty() || label.len() > 63 {
            return Err(invalid("labels must be 1-63 characters"));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(invalid("labels must not start or end with a hyphen"));
        }
        if !label
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        {
            return Err(invalid("labels may only contain a-z, 0-9 and hyphens"));
        }
    }
    Ok(())
}

// ============================================================================
// CAPABILITY NODE
// ============================================================================

/// A normalized capability path of one to three lowercase levels.
///
/// Stored with `>` separators. The URI renders at most the first two
/// levels; deeper levels stay searchable in the record only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CapabilityNode(Vec<String>);

impl CapabilityNode {
    /// Normalize and validate a capability path.
    ///
    /// Accepts both `>` and `/` as level separators (the submission formats
    /// seen in the wild), trims whitespace, lowercases, and collapses
    /// repeated separators.
    pub fn parse(raw: &str) -> RegistryResult<Self> {
        let invalid = |reason: String| RegistryError::Validation {
            field: "capability".to_string(),
            reason,
        };

        let segments: Vec<String> = raw
            .split(|c| c == CAPABILITY_SEPARATOR || c == '/')
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        if segments.is_empty() {
            return Err(invalid("capability must not be empty".to_string()));
        }
        if segments.len() > MAX_CAPABILITY_DEPTH {
            return Err(invalid(format!(
                "capability supports at most {} levels, got {}",
                MAX_CAPABILITY_DEPTH,
                segments.len()
            )));
        }
        for segment in &segments {
            validate_label(segment).map_err(|reason| invalid(reason))?;
        }
        Ok(CapabilityNode(segments))
    }

    /// All levels in order.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// The first (top-level) capability.
    pub fn top_level(&self) -> &str {
        &self.0[0]
    }

    /// The second level, when present. This is what the 4-segment URI
    /// renders as the primary skill.
    pub fn primary_skill(&self) -> Option<&str> {
        self.0.get(1).map(String::as_str)
    }

    /// Number of levels (1-3).
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Canonical `>`-joined storage form.
    pub fn as_storage_str(&self) -> String {
        self.0.join(">")
    }
}

impl fmt::Display for CapabilityNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_storage_str())
    }
}

impl FromStr for CapabilityNode {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CapabilityNode::parse(s)
    }
}

impl Serialize for CapabilityNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_storage_str())
    }
}

impl<'de> Deserialize<'de> for CapabilityNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        CapabilityNode::parse(&s).map_err(serde::de::Error::custom)
    }
}

fn validate_label(label: &str) -> Result<(), String> {
    if label
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    {
        Ok(())
    } else {
        Err(format!(
            "level {:?} may only contain a-z, 0-9 and hyphens",
            label
        ))
    }
}

// ============================================================================
// AGENT ID
// ============================================================================

/// External short identifier: `agent_` followed by ten lowercase base32
/// characters. Unique within `(trust_root, capability_node)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AgentId(String);

impl AgentId {
    /// Validate a full identifier (`agent_xxxxxxxxxx`).
    pub fn parse(s: &str) -> RegistryResult<Self> {
        let invalid = |reason: &str| RegistryError::Validation {
            field: "agent_id".to_string(),
            reason: reason.to_string(),
        };

        let suffix = s
            .strip_prefix(AGENT_ID_PREFIX)
            .ok_or_else(|| invalid("must start with \"agent_\""))?;
        if suffix.len() != AGENT_ID_RANDOM_LEN {
            return Err(invalid("must have exactly 10 characters after the prefix"));
        }
        if !suffix.bytes().all(|b| AGENT_ID_ALPHABET.contains(&b)) {
            return Err(invalid("suffix must be lowercase base32 (a-z, 2-7)"));
        }
        Ok(AgentId(s.to_string()))
    }

    /// Build an identifier from a pre-sampled 10-character suffix.
    pub fn from_suffix(suffix: &str) -> RegistryResult<Self> {
        Self::parse(&format!("{}{}", AGENT_ID_PREFIX, suffix))
    }

    /// The full identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The ten random characters after the prefix.
    pub fn suffix(&self) -> &str {
        &self.0[AGENT_ID_PREFIX.len()..]
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AgentId {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgentId::parse(s)
    }
}

impl Serialize for AgentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for AgentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        AgentId::parse(&s).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// AGENT URI
// ============================================================================

/// A parsed `agent://` URI.
///
/// The capability rendered here is the first level of the agent's
/// capability node; `primary_skill` is the second level when the node has
/// two or more.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AgentUri {
    pub trust_root: TrustRoot,
    pub capability: String,
    pub primary_skill: Option<String>,
    pub agent_id: AgentId,
}

impl AgentUri {
    /// Derive the permanent URI for an agent from its immutable fields.
    pub fn derive(trust_root: TrustRoot, node: &CapabilityNode, agent_id: AgentId) -> Self {
        AgentUri {
            trust_root,
            capability: node.top_level().to_string(),
            primary_skill: node.primary_skill().map(str::to_string),
            agent_id,
        }
    }

    /// Parse a URI string, validating every segment.
    pub fn parse(s: &str) -> RegistryResult<Self> {
        let invalid = |reason: &str| RegistryError::Validation {
            field: "uri".to_string(),
            reason: reason.to_string(),
        };

        let rest = s
            .strip_prefix(URI_SCHEME)
            .ok_or_else(|| invalid("must start with \"agent://\""))?;
        let segments: Vec<&str> = rest.split('/').collect();

        let (root, capability, skill, id) = match segments.as_slice() {
            [root, capability, id] => (*root, *capability, None, *id),
            [root, capability, skill, id] => (*root, *capability, Some(*skill), *id),
            _ => {
                return Err(invalid(
                    "expected agent://<root>/<capability>[/<skill>]/<agent_id>",
                ))
            }
        };

        validate_label(capability).map_err(|reason| RegistryError::Validation {
            field: "uri".to_string(),
            reason,
        })?;
        if capability.is_empty() {
            return Err(invalid("capability segment must not be empty"));
        }
        if let Some(skill) = skill {
            validate_label(skill).map_err(|reason| RegistryError::Validation {
                field: "uri".to_string(),
                reason,
            })?;
            if skill.is_empty() {
                return Err(invalid("skill segment must not be empty"));
            }
        }

        Ok(AgentUri {
            trust_root: TrustRoot::parse(root)?,
            capability: capability.to_string(),
            primary_skill: skill.map(str::to_string),
            agent_id: AgentId::parse(id)?,
        })
    }

    /// Number of path segments this URI renders (3 or 4).
    pub fn segment_count(&self) -> usize {
        if self.primary_skill.is_some() {
            4
        } else {
            3
        }
    }
}

impl fmt::Display for AgentUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.primary_skill {
            Some(skill) => write!(
                f,
                "{}{}/{}/{}/{}",
                URI_SCHEME, self.trust_root, self.capability, skill, self.agent_id
            ),
            None => write!(
                f,
                "{}{}/{}/{}",
                URI_SCHEME, self.trust_root, self.capability, self.agent_id
            ),
        }
    }
}

impl FromStr for AgentUri {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgentUri::parse(s)
    }
}

impl Serialize for AgentUri {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AgentUri {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        AgentUri::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn hosted_root_round_trip() {
        let root = TrustRoot::parse("nap").unwrap();
        assert!(root.is_hosted());
        assert_eq!(root.as_str(), "nap");
    }

    #[test]
    fn domain_root_lowercases() {
        let root = TrustRoot::parse("Acme.COM").unwrap();
        assert_eq!(root.as_str(), "acme.com");
    }

    #[test]
    fn bare_hostname_rejected() {
        assert!(TrustRoot::parse("localhost").is_err());
        assert!(TrustRoot::parse("").is_err());
        assert!(TrustRoot::parse("-bad.com").is_err());
    }

    #[test]
    fn capability_normalization_collapses_separators() {
        let node = CapabilityNode::parse(" Finance >> Billing ").unwrap();
        assert_eq!(node.as_storage_str(), "finance>billing");
        assert_eq!(node.top_level(), "finance");
        assert_eq!(node.primary_skill(), Some("billing"));
    }

    #[test]
    fn capability_accepts_slash_separator() {
        let node = CapabilityNode::parse("finance/billing/invoices").unwrap();
        assert_eq!(node.as_storage_str(), "finance>billing>invoices");
        assert_eq!(node.depth(), 3);
    }

    #[test]
    fn capability_depth_limit() {
        assert!(CapabilityNode::parse("a>b>c>d").is_err());
        assert!(CapabilityNode::parse(">>").is_err());
    }

    #[test]
    fn agent_id_grammar() {
        assert!(AgentId::parse("agent_abcdefgh23").is_ok());
        assert!(AgentId::parse("agent_ABCDEFGH23").is_err());
        assert!(AgentId::parse("agent_abc").is_err());
        assert!(AgentId::parse("agent_abcdefgh01").is_err()); // 0 and 1 not in alphabet
        assert!(AgentId::parse("robot_abcdefgh23").is_err());
    }

    #[test]
    fn agent_id_matches_pinned_regex() {
        let re = regex::Regex::new("^agent_[a-z2-7]{10}$").unwrap();
        let id = AgentId::from_suffix("abcdefgh23").unwrap();
        assert!(re.is_match(id.as_str()));
    }

    #[test]
    fn three_segment_uri_round_trip() {
        let node = CapabilityNode::parse("retail").unwrap();
        let uri = AgentUri::derive(
            TrustRoot::Hosted,
            &node,
            AgentId::from_suffix("abcdefgh23").unwrap(),
        );
        assert_eq!(uri.segment_count(), 3);
        assert_eq!(uri.to_string(), "agent://nap/retail/agent_abcdefgh23");
        assert_eq!(AgentUri::parse(&uri.to_string()).unwrap(), uri);
    }

    #[test]
    fn four_segment_uri_round_trip() {
        let node = CapabilityNode::parse("finance>billing>invoices").unwrap();
        let uri = AgentUri::derive(
            TrustRoot::Domain("acme.com".to_string()),
            &node,
            AgentId::from_suffix("abcdefgh23").unwrap(),
        );
        assert_eq!(uri.segment_count(), 4);
        assert_eq!(
            uri.to_string(),
            "agent://acme.com/finance/billing/agent_abcdefgh23"
        );
        assert_eq!(AgentUri::parse(&uri.to_string()).unwrap(), uri);
    }

    #[test]
    fn uri_rejects_wrong_shapes() {
        assert!(AgentUri::parse("agent://acme.com/agent_abcdefgh23").is_err());
        assert!(AgentUri::parse("agent://a/b/c/d/agent_abcdefgh23").is_err());
        assert!(AgentUri::parse("http://acme.com/x/agent_abcdefgh23").is_err());
    }

    fn label_strategy() -> impl Strategy<Value = String> {
        // No leading or trailing hyphen, so every label is also a valid
        // domain label.
        "[a-z]([a-z0-9-]{0,7}[a-z0-9])?"
    }

    fn suffix_strategy() -> impl Strategy<Value = String> {
        "[a-z2-7]{10}"
    }

    proptest! {
        #[test]
        fn derived_uri_parses_to_same_triple(
            domain_label in label_strategy(),
            cap in label_strategy(),
            skill in proptest::option::of(label_strategy()),
            suffix in suffix_strategy(),
        ) {
            let domain = format!("{}.example", domain_label);
            let raw_node = match &skill {
                Some(s) => format!("{}>{}", cap, s),
                None => cap.clone(),
            };
            let node = CapabilityNode::parse(&raw_node).unwrap();
            let uri = AgentUri::derive(
                TrustRoot::parse(&domain).unwrap(),
                &node,
                AgentId::from_suffix(&suffix).unwrap(),
            );
            let reparsed = AgentUri::parse(&uri.to_string()).unwrap();
            prop_assert_eq!(reparsed, uri);
        }
    }
}
