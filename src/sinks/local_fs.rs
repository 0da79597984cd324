//! Local filesystem sink: write to a temp file, then atomically rename into
//! place so partial writes are never visible to a concurrent poller.

use async_trait::async_trait;
use std::time::{Duration, Instant};

use crate::error::{FileHorizonError, FileHorizonResult};
use crate::model::WriteOptions;

use super::Sink;

pub struct LocalFsSink;

#[async_trait]
impl Sink for LocalFsSink {
    async fn write(
        &self,
        target_path: &str,
        content: &[u8],
        options: &WriteOptions,
    ) -> FileHorizonResult<Duration> {
        let start = Instant::now();

        if !options.overwrite && tokio::fs::metadata(target_path).await.is_ok() {
            return Err(FileHorizonError::SinkWrite {
                sink: "local_fs".to_string(),
                reason: format!("{target_path} already exists and Overwrite is false"),
            });
        }

        if let Some(parent) = std::path::Path::new(target_path).parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|_| FileHorizonError::DirectoryCreateFailed {
                    path: parent.to_path_buf(),
                })?;
        }

        let tmp_path = format!("{target_path}.filehorizon-tmp");
        tokio::fs::write(&tmp_path, content)
            .await
            .map_err(|e| FileHorizonError::Io {
                source: e,
                path: Some(tmp_path.clone()),
            })?;
        tokio::fs::rename(&tmp_path, target_path)
            .await
            .map_err(|e| FileHorizonError::Io {
                source: e,
                path: Some(target_path.to_string()),
            })?;

        Ok(start.elapsed())
    }
}
