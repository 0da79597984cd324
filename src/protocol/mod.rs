//! Protocol clients.
//!
//! One `ProtocolClient` implementation per transport (local filesystem, FTP,
//! SFTP). The poller and sinks depend only on this trait, never on a
//! concrete transport, mirroring the way the mesh keeps transports behind a
//! `TransportConnection` seam.

pub mod ftp;
pub mod local;
pub mod sftp;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::FileHorizonResult;
use crate::model::FileAttributes;

/// A file entry surfaced by a directory listing, prior to attribute lookup.
#[derive(Debug, Clone)]
pub struct RemoteFileInfo {
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified_utc: Option<DateTime<Utc>>,
}

/// Transport-agnostic file access used by the poller and by sinks that write
/// through a protocol (SFTP destinations, FTP uploads).
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// List entries directly under `path`. Recursion, if configured, is
    /// driven by the poller calling this repeatedly.
    async fn list(&self, path: &str) -> FileHorizonResult<Vec<RemoteFileInfo>>;

    /// Fetch current attributes for a single file.
    async fn stat(&self, path: &str) -> FileHorizonResult<FileAttributes>;

    /// Read the whole file into memory. Sized sources only; spec explicitly
    /// scopes out streaming of arbitrarily large files.
    async fn read(&self, path: &str) -> FileHorizonResult<Vec<u8>>;

    /// Write `content` to `path`, creating parent directories first when
    /// `create_dirs` is set.
    async fn write(&self, path: &str, content: &[u8], create_dirs: bool) -> FileHorizonResult<()>;

    /// Delete a file after a successful transfer with `DeleteAfterTransfer`.
    async fn delete(&self, path: &str) -> FileHorizonResult<()>;

    /// Move/rename a file, used by `MoveAfterProcessing` local sources.
    async fn rename(&self, from: &str, to: &str) -> FileHorizonResult<()>;
}
