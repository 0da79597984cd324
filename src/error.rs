//! Unified error handling for FileHorizon.
//!
//! Every surfaced error carries a stable `code()` for dashboarding and a
//! `classification()` matching the four-way split in the design: recovered
//! locally, retried within an orchestration, surfaced as an event failure,
//! or fatal to the process.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for all FileHorizon operations.
#[derive(Error, Debug)]
pub enum FileHorizonError {
    #[error("file not found: {path}")]
    FileNotFound { path: String },

    #[error("file size unstable at {path}")]
    FileSizeUnstable { path: String },

    #[error("file lock unavailable for {path}")]
    FileLockUnavailable { path: String },

    #[error("event already processed: {key}")]
    AlreadyProcessed { key: String },

    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("queue is full")]
    QueueFull,

    #[error("enqueue cancelled")]
    EnqueueCancelled,

    #[error("failed to create destination directory: {path}")]
    DirectoryCreateFailed { path: PathBuf },

    #[error("validation failed for {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("I/O error: {source} (path: {path:?})")]
    Io {
        #[source]
        source: std::io::Error,
        path: Option<String>,
    },

    #[error("transport error: {message}")]
    Transport { message: String },

    #[error("transport timeout after {timeout_ms}ms")]
    TransportTimeout { timeout_ms: u64 },

    #[error("configuration error: {field} - {message}")]
    Configuration { field: String, message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("sink write failed: {sink} - {reason}")]
    SinkWrite { sink: String, reason: String },

    #[error("unspecified error: {0}")]
    Unspecified(String),
}

/// Result type alias for FileHorizon operations.
pub type FileHorizonResult<T> = Result<T, FileHorizonError>;

/// How an error should be handled by the orchestrator (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClassification {
    /// No event failure: readiness not met, already processed, empty route,
    /// notifier failure unless configured otherwise.
    RecoveredLocally,
    /// Retried within the orchestration with exponential backoff.
    RetriedInOrchestration,
    /// Event is acked and dead-lettered.
    SurfacedAsEventFailure,
    /// The process cannot continue and must exit.
    FatalToProcess,
}

impl FileHorizonError {
    /// Stable error code for dashboarding. Secrets are never interpolated
    /// into these strings or into `Display` output.
    pub fn code(&self) -> &'static str {
        match self {
            FileHorizonError::FileNotFound { .. } => "File.NotFound",
            FileHorizonError::FileSizeUnstable { .. } => "File.SizeUnstable",
            FileHorizonError::FileLockUnavailable { .. } => "File.LockUnavailable",
            FileHorizonError::AlreadyProcessed { .. } => "Processing.AlreadyProcessed",
            FileHorizonError::ChecksumMismatch { .. } => "Processing.ChecksumMismatch",
            FileHorizonError::QueueFull => "Queue.Full",
            FileHorizonError::EnqueueCancelled => "Queue.EnqueueCancelled",
            FileHorizonError::DirectoryCreateFailed { .. } => {
                "FileTransfer.DirectoryCreateFailed"
            }
            FileHorizonError::Validation { .. } => "Validation.Failed",
            FileHorizonError::Io { .. } => "Unspecified.Io",
            FileHorizonError::Transport { .. } => "Unspecified.Transport",
            FileHorizonError::TransportTimeout { .. } => "Unspecified.TransportTimeout",
            FileHorizonError::Configuration { .. } => "Unspecified.Configuration",
            FileHorizonError::Serialization(_) => "Unspecified.Serialization",
            FileHorizonError::SinkWrite { .. } => "Unspecified.SinkWrite",
            FileHorizonError::Unspecified(_) => "Unspecified",
        }
    }

    pub fn classification(&self) -> ErrorClassification {
        use ErrorClassification::*;
        match self {
            FileHorizonError::FileSizeUnstable { .. }
            | FileHorizonError::AlreadyProcessed { .. } => RecoveredLocally,

            FileHorizonError::Transport { .. }
            | FileHorizonError::TransportTimeout { .. }
            | FileHorizonError::FileLockUnavailable { .. } => RetriedInOrchestration,

            FileHorizonError::Io { source, .. } => match source.kind() {
                std::io::ErrorKind::Interrupted
                | std::io::ErrorKind::WouldBlock
                | std::io::ErrorKind::TimedOut
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionAborted => RetriedInOrchestration,
                _ => SurfacedAsEventFailure,
            },

            FileHorizonError::FileNotFound { .. }
            | FileHorizonError::ChecksumMismatch { .. }
            | FileHorizonError::Validation { .. }
            | FileHorizonError::DirectoryCreateFailed { .. }
            | FileHorizonError::SinkWrite { .. } => SurfacedAsEventFailure,

            FileHorizonError::QueueFull | FileHorizonError::EnqueueCancelled => {
                SurfacedAsEventFailure
            }

            FileHorizonError::Configuration { .. } => FatalToProcess,

            FileHorizonError::Serialization(_) | FileHorizonError::Unspecified(_) => {
                SurfacedAsEventFailure
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.classification() == ErrorClassification::RetriedInOrchestration
    }
}
