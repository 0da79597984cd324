//! Message-bus destination: publishes whole-file content onto a Redis
//! stream rather than writing bytes to a filesystem-shaped target, for
//! `DestinationType::MessageBus` (spec's service-bus egress).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::{FileHorizonError, FileHorizonResult};
use crate::model::{FilePublishRequest, WriteOptions};

use super::Sink;

pub struct FileContentPublisher {
    connection: ConnectionManager,
    stream_or_topic: String,
}

impl FileContentPublisher {
    pub async fn connect(
        connection_string: &str,
        stream_or_topic: impl Into<String>,
    ) -> FileHorizonResult<Self> {
        let client =
            redis::Client::open(connection_string).map_err(|e| FileHorizonError::Transport {
                message: format!("invalid redis connection string: {e}"),
            })?;
        let connection = client
            .get_connection_manager()
            .await
            .map_err(|e| FileHorizonError::Transport {
                message: format!("redis connection failed: {e}"),
            })?;
        Ok(Self {
            connection,
            stream_or_topic: stream_or_topic.into(),
        })
    }

    pub async fn publish(&self, request: &FilePublishRequest) -> FileHorizonResult<Duration> {
        let start = Instant::now();
        let mut connection = self.connection.clone();
        let app_props = request
            .app_props
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_default();

        let _: String = connection
            .xadd_map(
                &self.stream_or_topic,
                "*",
                &[
                    ("file_name", request.file_name.as_bytes().to_vec()),
                    ("source_path", request.source_path.as_bytes().to_vec()),
                    (
                        "content_type",
                        request
                            .content_type
                            .as_deref()
                            .unwrap_or_default()
                            .as_bytes()
                            .to_vec(),
                    ),
                    ("app_props", app_props.as_bytes().to_vec()),
                    ("content", request.content_bytes.clone()),
                ],
            )
            .await
            .map_err(|e| FileHorizonError::Transport {
                message: format!("redis XADD (publish) failed: {e}"),
            })?;

        Ok(start.elapsed())
    }
}

#[async_trait]
impl Sink for FileContentPublisher {
    async fn write(
        &self,
        target_path: &str,
        content: &[u8],
        _options: &WriteOptions,
    ) -> FileHorizonResult<Duration> {
        let file_name = std::path::Path::new(target_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| target_path.to_string());

        self.publish(&FilePublishRequest {
            source_path: target_path.to_string(),
            file_name,
            content_bytes: content.to_vec(),
            content_type: None,
            destination_name: self.stream_or_topic.clone(),
            is_topic: false,
            app_props: None,
        })
        .await
    }
}
