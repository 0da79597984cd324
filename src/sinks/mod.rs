//! Destination sinks.
//!
//! A `Sink` writes event content to one destination kind. The orchestrator
//! fans an event out to every destination its routing plan names, collecting
//! a `DestinationResult` per attempt.

pub mod local_fs;
pub mod object_store_sink;
pub mod publisher;
pub mod sftp_sink;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::FileHorizonResult;
use crate::model::WriteOptions;

#[async_trait]
pub trait Sink: Send + Sync {
    /// Write `content` to `target_path`, returning the write latency.
    async fn write(
        &self,
        target_path: &str,
        content: &[u8],
        options: &WriteOptions,
    ) -> FileHorizonResult<Duration>;
}
