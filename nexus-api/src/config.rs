//! Environment-driven configuration.

use std::time::Duration;

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env_var(name)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// HTTP server binding configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_host: String,
    pub port: u16,
}

impl ApiConfig {
    pub fn from_env() -> Self {
        ApiConfig {
            bind_host: env_var("NEXUS_API_BIND").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: env_parse("NEXUS_API_PORT", 3000),
        }
    }
}

/// Registry behavior configuration. Defaults match the documented
/// operational envelope; every knob has a `NEXUS_*` override.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Public base URL of this registry; used as JWT `iss` and stamped
    /// into agent cards.
    pub registry_url: String,
    /// Directory holding the persisted CA key and certificate.
    pub ca_dir: String,
    /// Free-tier cap on non-revoked hosted agents per user.
    pub max_agents_per_user: u32,
    /// Enforce HTTPS endpoints (loopback exempt). On in production.
    pub require_https: bool,
    /// Health probe tick interval.
    pub probe_interval: Duration,
    /// Per-probe request timeout.
    pub probe_timeout: Duration,
    /// Probe worker pool size per tick.
    pub probe_concurrency: usize,
    /// Consecutive failures before an agent is marked degraded.
    pub probe_fail_threshold: u32,
    /// DNS TXT lookup timeout.
    pub dns_timeout: Duration,
    /// Per-attempt webhook delivery timeout.
    pub webhook_timeout: Duration,
    /// Certificate expiry sweep interval.
    pub expiry_sweep_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            registry_url: "http://localhost:3000".to_string(),
            ca_dir: "./data/ca".to_string(),
            max_agents_per_user: 3,
            require_https: false,
            probe_interval: Duration::from_secs(300),
            probe_timeout: Duration::from_secs(10),
            probe_concurrency: 10,
            probe_fail_threshold: 3,
            dns_timeout: Duration::from_secs(5),
            webhook_timeout: Duration::from_secs(10),
            expiry_sweep_interval: Duration::from_secs(3600),
        }
    }
}

impl RegistryConfig {
    pub fn from_env() -> Self {
        let defaults = RegistryConfig::default();
        RegistryConfig {
            registry_url: env_var("NEXUS_REGISTRY_URL").unwrap_or(defaults.registry_url),
            ca_dir: env_var("NEXUS_CA_DIR").unwrap_or(defaults.ca_dir),
            max_agents_per_user: env_parse("NEXUS_MAX_AGENTS", defaults.max_agents_per_user),
            require_https: env_parse("NEXUS_REQUIRE_HTTPS", defaults.require_https),
            probe_interval: Duration::from_secs(env_parse("NEXUS_PROBE_INTERVAL_SECS", 300)),
            probe_timeout: Duration::from_secs(env_parse("NEXUS_PROBE_TIMEOUT_SECS", 10)),
            probe_concurrency: env_parse("NEXUS_PROBE_CONCURRENCY", defaults.probe_concurrency),
            probe_fail_threshold: env_parse(
                "NEXUS_PROBE_FAIL_THRESHOLD",
                defaults.probe_fail_threshold,
            ),
            dns_timeout: Duration::from_secs(env_parse("NEXUS_DNS_TIMEOUT_SECS", 5)),
            webhook_timeout: Duration::from_secs(env_parse("NEXUS_WEBHOOK_TIMEOUT_SECS", 10)),
            expiry_sweep_interval: Duration::from_secs(env_parse(
                "NEXUS_EXPIRY_SWEEP_SECS",
                3600,
            )),
        }
    }
}
