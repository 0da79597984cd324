//! SFTP destination sink, built on top of `protocol::sftp::SftpClient`'s
//! transport so connection setup, auth and subsystem negotiation are shared
//! with the poller side of the pipeline.

use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::{FileHorizonError, FileHorizonResult};
use crate::model::WriteOptions;
use crate::protocol::sftp::SftpClient;
use crate::protocol::ProtocolClient;

use super::Sink;

pub struct SftpSink {
    client: SftpClient,
}

impl SftpSink {
    pub fn new(client: SftpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Sink for SftpSink {
    async fn write(
        &self,
        target_path: &str,
        content: &[u8],
        options: &WriteOptions,
    ) -> FileHorizonResult<Duration> {
        let start = Instant::now();

        if !options.overwrite && self.client.stat(target_path).await.is_ok() {
            return Err(FileHorizonError::SinkWrite {
                sink: "sftp".to_string(),
                reason: format!("{target_path} already exists and Overwrite is false"),
            });
        }

        self.client.write(target_path, content, true).await?;
        Ok(start.elapsed())
    }
}
