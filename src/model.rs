//! Core data entities shared by every pipeline stage.
//!
//! These types are intentionally thin: they carry no behavior beyond
//! construction helpers and the identity-key algorithm, so that poller,
//! queue, orchestrator and sinks can all depend on them without depending on
//! each other.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Protocol a `FileReference` was discovered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Local,
    Ftp,
    Sftp,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Local => write!(f, "local"),
            Protocol::Ftp => write!(f, "ftp"),
            Protocol::Sftp => write!(f, "sftp"),
        }
    }
}

/// Locates a file across any supported protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReference {
    pub scheme: Protocol,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: String,
    pub source_name: Option<String>,
}

impl FileReference {
    pub fn new(scheme: Protocol, path: impl Into<String>) -> Self {
        Self {
            scheme,
            host: None,
            port: None,
            path: path.into(),
            source_name: None,
        }
    }

    /// Canonical identity key used for dedup and idempotency (spec §3).
    ///
    /// For `local` references this is the absolute, normalized path. For
    /// remote references it is `scheme://host[:port]/normalized-path` with
    /// the host lowercased and backslashes normalized to `/`.
    pub fn identity_key(&self) -> String {
        let normalized = normalize_path(&self.path);
        match self.scheme {
            Protocol::Local => normalized,
            Protocol::Ftp | Protocol::Sftp => {
                let host = self
                    .host
                    .as_deref()
                    .unwrap_or_default()
                    .to_ascii_lowercase();
                match self.port {
                    Some(port) => format!("{}://{}:{}{}", self.scheme, host, port, normalized),
                    None => format!("{}://{}{}", self.scheme, host, normalized),
                }
            }
        }
    }
}

fn normalize_path(path: &str) -> String {
    let replaced = path.replace('\\', "/");
    if replaced.starts_with('/') {
        replaced
    } else {
        format!("/{replaced}")
    }
}

/// A point-in-time snapshot of a file's attributes, as reported by a
/// protocol client's `list`/`getInfo` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAttributes {
    pub size: u64,
    pub last_write_utc: DateTime<Utc>,
    pub hash: Option<String>,
}

/// Poller-local bookkeeping for a file that has not yet been emitted.
#[derive(Debug, Clone)]
pub struct FileObservationSnapshot {
    pub size: u64,
    pub last_write_utc: DateTime<Utc>,
    pub first_observed_utc: DateTime<Utc>,
    pub last_observed_utc: DateTime<Utc>,
    pub observation_count: u32,
}

impl FileObservationSnapshot {
    pub fn first(attrs: &FileAttributes, now: DateTime<Utc>) -> Self {
        Self {
            size: attrs.size,
            last_write_utc: attrs.last_write_utc,
            first_observed_utc: now,
            last_observed_utc: now,
            observation_count: 1,
        }
    }

    /// Record a new observation, resetting `first_observed_utc` iff the
    /// size changed (spec §4.2: "a file whose size changes resets
    /// `firstObservedUtc`").
    pub fn observe(&mut self, attrs: &FileAttributes, now: DateTime<Utc>) {
        if attrs.size != self.size {
            self.first_observed_utc = now;
            self.observation_count = 0;
        }
        self.size = attrs.size;
        self.last_write_utc = attrs.last_write_utc;
        self.last_observed_utc = now;
        self.observation_count += 1;
    }

    pub fn stable_for(&self, now: DateTime<Utc>) -> Duration {
        (now - self.first_observed_utc)
            .to_std()
            .unwrap_or_default()
    }
}

/// Checksum algorithm selected for a transfer (`Transfer.Checksum.Algorithm`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    #[default]
    None,
    Md5,
    Sha256,
}

/// Metadata captured at discovery time and carried with the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEventMetadata {
    pub source_path: String,
    pub size: u64,
    pub last_mod_utc: DateTime<Utc>,
    pub hash_alg: ChecksumAlgorithm,
    pub checksum: Option<String>,
}

/// A single unit of work representing one file to be moved/published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEvent {
    pub id: Uuid,
    pub metadata: FileEventMetadata,
    pub discovered_at_utc: DateTime<Utc>,
    pub protocol: Protocol,
    pub destination_path_hint: Option<String>,
    pub delete_after_transfer: bool,
    pub source_name: Option<String>,
}

impl FileEvent {
    pub fn new(
        reference: &FileReference,
        attrs: &FileAttributes,
        delete_after_transfer: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            metadata: FileEventMetadata {
                source_path: reference.path.clone(),
                size: attrs.size,
                last_mod_utc: attrs.last_write_utc,
                hash_alg: ChecksumAlgorithm::None,
                checksum: attrs.hash.clone(),
            },
            discovered_at_utc: Utc::now(),
            protocol: reference.scheme,
            destination_path_hint: None,
            delete_after_transfer,
            source_name: reference.source_name.clone(),
        }
    }
}

/// Per-destination write knobs resolved by the router.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WriteOptions {
    pub overwrite: bool,
    pub compute_hash: bool,
    pub rename_pattern: Option<String>,
}

/// A concrete (destination, targetPath, writeOptions) triple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationPlan {
    pub destination_name: String,
    pub target_path: String,
    pub write_options: WriteOptions,
}

/// Request to publish whole-file content to a queue or topic destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilePublishRequest {
    pub source_path: String,
    pub file_name: String,
    pub content_bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub destination_name: String,
    pub is_topic: bool,
    pub app_props: Option<serde_json::Value>,
}

/// Terminal status of an orchestration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationStatus {
    Success,
    Failure,
}

/// Outcome of a single attempted sink write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationResult {
    pub r#type: String,
    pub identifier: String,
    pub success: bool,
    pub bytes_written: u64,
    pub latency: Option<Duration>,
}

/// One per terminal event, schema v1, published by the Notifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileProcessedNotification {
    pub schema_version: u8,
    pub protocol: Protocol,
    pub full_path: String,
    pub size: u64,
    pub last_mod_utc: DateTime<Utc>,
    pub status: NotificationStatus,
    pub duration: Duration,
    pub idempotency_key: String,
    pub correlation_id: Uuid,
    pub completed_utc: DateTime<Utc>,
    pub destinations: Vec<DestinationResult>,
}

impl FileProcessedNotification {
    pub const SCHEMA_VERSION: u8 = 1;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_identity_key_is_normalized_absolute_path() {
        let r = FileReference::new(Protocol::Local, "tmp/in/a.txt");
        assert_eq!(r.identity_key(), "/tmp/in/a.txt");
    }

    #[test]
    fn remote_identity_key_lowercases_host_and_is_idempotent() {
        let mut r = FileReference::new(Protocol::Sftp, "/Incoming\\File.txt");
        r.host = Some("SFTP.Example.COM".to_string());
        r.port = Some(22);
        let key1 = r.identity_key();
        let key2 = r.identity_key();
        assert_eq!(key1, key2);
        assert_eq!(key1, "sftp://sftp.example.com:22/Incoming/File.txt");
    }

    #[test]
    fn observation_resets_first_observed_on_size_change() {
        let t0 = Utc::now();
        let attrs = FileAttributes {
            size: 100,
            last_write_utc: t0,
            hash: None,
        };
        let mut snap = FileObservationSnapshot::first(&attrs, t0);
        let t1 = t0 + chrono::Duration::seconds(2);
        snap.observe(
            &FileAttributes {
                size: 200,
                last_write_utc: t1,
                hash: None,
            },
            t1,
        );
        assert_eq!(snap.first_observed_utc, t1);
        assert_eq!(snap.size, 200);
    }
}
