//! Configuration types for the sync policy gateway
//!
//! Uses the `config` crate for layered configuration from files and environment.

use crate::policy::{EmptinessRule, TombstoneRouting};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Policy evaluation configuration
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Commit path configuration
    #[serde(default)]
    pub gateway: CommitConfig,

    /// Admin API configuration
    #[serde(default)]
    pub admin: AdminApiConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Policy evaluation configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Which values count as "not provided": "falsy" or "strict"
    #[serde(default)]
    pub emptiness: EmptinessRule,

    /// Tombstone routing for owner-scoped documents: "pass_through" or "previous_owner"
    #[serde(default)]
    pub tombstone_routing: TombstoneRouting,
}

/// Commit path configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitConfig {
    /// Upper bound on a single commit, including the wait for the document lock
    #[serde(with = "humantime_serde", default = "default_commit_timeout")]
    pub commit_timeout: Duration,

    /// Number of rejected writes kept for inspection
    #[serde(default = "default_rejection_log_size")]
    pub rejection_log_size: usize,

    /// Maximum requests accepted in one bulk commit
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

fn default_commit_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_rejection_log_size() -> usize {
    1000
}

fn default_max_batch_size() -> usize {
    500
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            commit_timeout: default_commit_timeout(),
            rejection_log_size: default_rejection_log_size(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

/// Admin API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminApiConfig {
    /// Enable admin API
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Listen address
    #[serde(default = "default_admin_listen")]
    pub listen: String,
}

fn default_true() -> bool {
    true
}

fn default_admin_listen() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for AdminApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: default_admin_listen(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format: "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics: MetricsConfig::default(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Record evaluation and commit metrics
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

// ============================================================================
// Configuration Loading
// ============================================================================

impl GatewayConfig {
    /// Load configuration from file and environment
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = Self::defaults()?;

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment variables with prefix SYNC_POLICY_, e.g. SYNC_POLICY__POLICY__EMPTINESS
        builder = builder.add_source(
            config::Environment::with_prefix("SYNC_POLICY")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Load configuration from TOML text layered over the defaults
    pub fn from_toml(text: &str) -> Result<Self, config::ConfigError> {
        Self::defaults()?
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
        Ok(config::Config::builder().add_source(config::Config::try_from(&Self::default())?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.policy.emptiness, EmptinessRule::Falsy);
        assert_eq!(config.policy.tombstone_routing, TombstoneRouting::PassThrough);
        assert_eq!(config.gateway.commit_timeout, Duration::from_secs(5));
        assert!(config.admin.enabled);
        assert_eq!(config.observability.log_format, "json");
    }

    #[test]
    fn test_toml_overrides() {
        let config = GatewayConfig::from_toml(
            r#"
            [policy]
            emptiness = "strict"
            tombstone_routing = "previous_owner"

            [gateway]
            commit_timeout = "250ms"
            rejection_log_size = 10

            [observability]
            log_format = "pretty"
            "#,
        )
        .unwrap();

        assert_eq!(config.policy.emptiness, EmptinessRule::Strict);
        assert_eq!(config.policy.tombstone_routing, TombstoneRouting::PreviousOwner);
        assert_eq!(config.gateway.commit_timeout, Duration::from_millis(250));
        assert_eq!(config.gateway.rejection_log_size, 10);
        assert_eq!(config.gateway.max_batch_size, 500);
        assert_eq!(config.admin.listen, "0.0.0.0:8080");
        assert_eq!(config.observability.log_format, "pretty");
    }
}
