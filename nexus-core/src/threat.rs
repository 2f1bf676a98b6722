//! Rule-based pre-registration threat screening.
//!
//! A pure function over the registration request: no network, no state.
//! Each rule adds a weighted finding; the clamped total maps to a severity
//! band, and a score at or above [`THREAT_REJECT_THRESHOLD`] rejects the
//! registration outright.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Score at or above which a registration is rejected.
pub const THREAT_REJECT_THRESHOLD: u8 = 85;

/// Capability keywords worth +40 (any match, once).
const CAPABILITY_KEYWORDS: &[&str] = &[
    "exec", "shell", "sudo", "admin", "root", "system", "kernel", "daemon",
];

/// Description substrings worth +35 each.
const DESCRIPTION_PATTERNS: &[&str] = &[
    "exfiltrat",
    "bypass",
    "escalat",
    "inject",
    "exploit",
    "payload",
    "malware",
    "ransomware",
    "c2",
    "botnet",
];

/// Display-name phrases worth +20 each.
const DISPLAY_NAME_PATTERNS: &[&str] = &[
    "shell executor",
    "command executor",
    "system agent",
    "root agent",
];

/// Weight of an insecure (non-HTTPS, non-loopback) endpoint.
const INSECURE_ENDPOINT_WEIGHT: u32 = 25;

// ============================================================================
// REPORT TYPES
// ============================================================================

/// Severity band for a threat score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum ThreatSeverity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatSeverity {
    /// Band boundaries: 0-24 none, 25-49 low, 50-64 medium, 65-84 high,
    /// 85-100 critical.
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=24 => ThreatSeverity::None,
            25..=49 => ThreatSeverity::Low,
            50..=64 => ThreatSeverity::Medium,
            65..=84 => ThreatSeverity::High,
            _ => ThreatSeverity::Critical,
        }
    }
}

impl fmt::Display for ThreatSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ThreatSeverity::None => "none",
            ThreatSeverity::Low => "low",
            ThreatSeverity::Medium => "medium",
            ThreatSeverity::High => "high",
            ThreatSeverity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// One matched rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ThreatFinding {
    /// Which field triggered the rule.
    pub field: String,
    /// The pattern that matched.
    pub pattern: String,
    /// Points this finding contributed.
    pub weight: u32,
}

/// Outcome of screening one registration request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ThreatReport {
    /// Clamped to 0-100.
    pub score: u8,
    pub severity: ThreatSeverity,
    pub findings: Vec<ThreatFinding>,
    /// True iff `score >= 85`.
    pub rejected: bool,
}

// ============================================================================
// SCORER
// ============================================================================

/// Screen a registration request.
///
/// `capability` is the raw submitted capability path; matching is
/// case-insensitive substring containment throughout.
pub fn score_registration(
    display_name: &str,
    description: &str,
    endpoint: &str,
    capability: &str,
) -> ThreatReport {
    let display_name = display_name.to_ascii_lowercase();
    let description = description.to_ascii_lowercase();
    let capability = capability.to_ascii_lowercase();

    let mut findings = Vec::new();
    let mut total: u32 = 0;

    if let Some(keyword) = CAPABILITY_KEYWORDS
        .iter()
        .find(|k| capability.contains(**k))
    {
        findings.push(ThreatFinding {
            field: "capability".to_string(),
            pattern: (*keyword).to_string(),
            weight: 40,
        });
        total += 40;
    }

    for pattern in DESCRIPTION_PATTERNS {
        if description.contains(pattern) {
            findings.push(ThreatFinding {
                field: "description".to_string(),
                pattern: (*pattern).to_string(),
                weight: 35,
            });
            total += 35;
        }
    }

    if endpoint_is_insecure(endpoint) {
        findings.push(ThreatFinding {
            field: "endpoint".to_string(),
            pattern: "non-https non-loopback".to_string(),
            weight: INSECURE_ENDPOINT_WEIGHT,
        });
        total += INSECURE_ENDPOINT_WEIGHT;
    }

    for pattern in DISPLAY_NAME_PATTERNS {
        if display_name.contains(pattern) {
            findings.push(ThreatFinding {
                field: "display_name".to_string(),
                pattern: (*pattern).to_string(),
                weight: 20,
            });
            total += 20;
        }
    }

    let score = total.min(100) as u8;
    ThreatReport {
        score,
        severity: ThreatSeverity::from_score(score),
        findings,
        rejected: score >= THREAT_REJECT_THRESHOLD,
    }
}

/// A non-HTTPS endpoint whose host is not loopback.
fn endpoint_is_insecure(endpoint: &str) -> bool {
    let lower = endpoint.to_ascii_lowercase();
    if lower.starts_with("https://") {
        return false;
    }
    let host = lower
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(&lower);
    let host = host
        .split(['/', '?', '#'])
        .next()
        .unwrap_or("")
        .rsplit('@')
        .next()
        .unwrap_or("");
    let host = host.split(':').next().unwrap_or("");
    host != "localhost" && host != "127.0.0.1"
}
