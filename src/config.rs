//! Unified configuration for FileHorizon.
//!
//! Loaded with the `config` crate (defaults → file → environment) and
//! validated before the composition root wires up any collaborator. Field
//! names mirror spec §6's hierarchical configuration contract.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{FileHorizonError, FileHorizonResult};
use crate::model::ChecksumAlgorithm;

/// Process role (spec §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub enum Role {
    Poller,
    Worker,
    #[default]
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub role: Role,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { role: Role::All }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    pub interval_milliseconds: u64,
    pub batch_read_limit: usize,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_milliseconds: 5000,
            batch_read_limit: 32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSourceConfig {
    pub name: String,
    pub path: String,
    pub destination_path: Option<String>,
    pub move_after_processing: bool,
    pub create_destination_directories: bool,
    pub recursive: bool,
    pub pattern: Option<String>,
    pub min_stable_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteProtocol {
    Ftp,
    Sftp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteFileSourceConfig {
    pub name: String,
    pub protocol: RemoteProtocol,
    pub host: String,
    pub port: u16,
    pub path: String,
    pub pattern: Option<String>,
    pub recursive: bool,
    pub credential_secret_ref: Option<String>,
    pub min_stable_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationType {
    Local,
    ObjectStore,
    Sftp,
    MessageBus,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DestinationOptions {
    pub overwrite: bool,
    pub create_directories: bool,
    pub rename_pattern: Option<String>,
    /// Required when `Type` is `Sftp`; resolved the same way as
    /// `RemoteFileSources[].CredentialSecretRef`.
    pub credential_secret_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDestinationConfig {
    pub name: String,
    pub r#type: DestinationType,
    pub target: String,
    pub options: DestinationOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub enum FailurePolicy {
    #[default]
    AllOrNothing,
    BestEffort,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RoutingMatch {
    pub protocol: Option<RemoteProtocolOrLocal>,
    pub source_name: Option<String>,
    pub path_pattern: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteProtocolOrLocal {
    Local,
    Ftp,
    Sftp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRuleConfig {
    pub r#match: RoutingMatch,
    pub destinations: Vec<String>,
    pub failure_policy: FailurePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RoutingConfig {
    pub rules: Vec<RoutingRuleConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 200,
            backoff_max_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecksumConfig {
    pub algorithm: ChecksumAlgorithm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    pub max_concurrent_per_destination: usize,
    pub chunk_size_bytes: usize,
    pub retry: RetryConfig,
    pub checksum: ChecksumConfig,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_concurrent_per_destination: 4,
            chunk_size_bytes: 64 * 1024,
            retry: RetryConfig::default(),
            checksum: ChecksumConfig {
                algorithm: ChecksumAlgorithm::None,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyConfig {
    pub enabled: bool,
    pub ttl_seconds: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: 86_400,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub enabled: bool,
    pub connection_string: String,
    pub stream_name: String,
    pub consumer_group: String,
    pub dead_letter_stream: String,
    pub visibility_timeout_seconds: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            connection_string: "redis://127.0.0.1:6379".to_string(),
            stream_name: "filehorizon:events".to_string(),
            consumer_group: "filehorizon-workers".to_string(),
            dead_letter_stream: "filehorizon:dead-letter".to_string(),
            visibility_timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineFeatures {
    pub enable_local_poller: bool,
    pub enable_ftp_poller: bool,
    pub enable_sftp_poller: bool,
    pub enable_file_transfer: bool,
    pub enable_service_bus_ingress: bool,
    pub enable_service_bus_egress: bool,
}

impl Default for PipelineFeatures {
    fn default() -> Self {
        Self {
            enable_local_poller: true,
            enable_ftp_poller: true,
            enable_sftp_poller: true,
            enable_file_transfer: true,
            enable_service_bus_ingress: false,
            enable_service_bus_egress: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContentDetectionConfig {
    pub enable_xml: bool,
    pub enable_edifact: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    pub bind_address: String,
    pub port: u16,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Top level configuration tree. Every leaf named in spec §6 appears here.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileHorizonConfig {
    pub pipeline: PipelineConfig,
    pub polling: PollingConfig,
    #[serde(default)]
    pub file_sources: Vec<FileSourceConfig>,
    #[serde(default)]
    pub remote_file_sources: Vec<RemoteFileSourceConfig>,
    #[serde(default)]
    pub file_destinations: Vec<FileDestinationConfig>,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub idempotency: IdempotencyConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub pipeline_features: PipelineFeatures,
    #[serde(default)]
    pub content_detection: ContentDetectionConfig,
    #[serde(default)]
    pub health: HealthConfig,
    /// Whether notifier failure should fail the pipeline event (default
    /// false; see DESIGN.md's resolution of the corresponding Open
    /// Question).
    #[serde(default)]
    pub fail_pipeline_on_notify_failure: bool,
}

impl FileHorizonConfig {
    /// Load configuration from `config/default.toml` (if present), an
    /// optional file named by `FILEHORIZON_CONFIG`, and environment
    /// variables prefixed `FILEHORIZON__` with `__` as the nesting
    /// separator, then validate it.
    pub fn load() -> FileHorizonResult<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false));

        if let Ok(path) = std::env::var("FILEHORIZON_CONFIG") {
            builder = builder.add_source(config::File::with_name(&path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("FILEHORIZON")
                .separator("__")
                .try_parsing(true),
        );

        let raw = builder
            .build()
            .map_err(|e| FileHorizonError::Configuration {
                field: "<load>".to_string(),
                message: e.to_string(),
            })?;

        let config: FileHorizonConfig =
            raw.try_deserialize()
                .map_err(|e| FileHorizonError::Configuration {
                    field: "<deserialize>".to_string(),
                    message: e.to_string(),
                })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field invariants that `serde` defaults cannot express.
    fn validate(&self) -> FileHorizonResult<()> {
        if self.transfer.max_concurrent_per_destination == 0 {
            return Err(FileHorizonError::Configuration {
                field: "Transfer.MaxConcurrentPerDestination".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if self.redis.enabled && self.redis.connection_string.trim().is_empty() {
            return Err(FileHorizonError::Configuration {
                field: "Redis.ConnectionString".to_string(),
                message: "required when Redis.Enabled is true".to_string(),
            });
        }

        let known_destinations: std::collections::HashSet<&str> = self
            .file_destinations
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        for rule in &self.routing.rules {
            for dest in &rule.destinations {
                if !known_destinations.contains(dest.as_str()) {
                    return Err(FileHorizonError::Configuration {
                        field: "Routing.Rules[].Destinations".to_string(),
                        message: format!("unknown destination '{dest}'"),
                    });
                }
            }
        }

        Ok(())
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling.interval_milliseconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = FileHorizonConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn redis_enabled_without_connection_string_fails() {
        let mut config = FileHorizonConfig::default();
        config.redis.enabled = true;
        config.redis.connection_string = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn routing_rule_with_unknown_destination_fails() {
        let mut config = FileHorizonConfig::default();
        config.routing.rules.push(RoutingRuleConfig {
            r#match: RoutingMatch::default(),
            destinations: vec!["missing".to_string()],
            failure_policy: FailurePolicy::AllOrNothing,
        });
        assert!(config.validate().is_err());
    }
}
