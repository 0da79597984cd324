//! Redis Streams backed event queue.
//!
//! Uses a consumer group so that multiple worker processes can share one
//! stream without double-processing (spec §5's horizontal worker scaling).
//! `XCLAIM`/`XAUTOCLAIM` implement redelivery after a visibility timeout,
//! mirroring SQS-style semantics on top of Redis.

use redis::aio::ConnectionManager;
use redis::streams::StreamReadOptions;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::error::{FileHorizonError, FileHorizonResult};
use crate::model::FileEvent;

use super::{EventQueue, QueuedEvent};

const FIELD_PAYLOAD: &str = "payload";

pub struct RedisStreamQueue {
    connection: ConnectionManager,
    stream: String,
    group: String,
    consumer: String,
    dead_letter_stream: String,
    visibility_timeout_ms: usize,
}

impl RedisStreamQueue {
    pub async fn connect(
        connection_string: &str,
        stream: impl Into<String>,
        group: impl Into<String>,
        dead_letter_stream: impl Into<String>,
        visibility_timeout_ms: usize,
    ) -> FileHorizonResult<Self> {
        let client =
            redis::Client::open(connection_string).map_err(|e| FileHorizonError::Transport {
                message: format!("invalid redis connection string: {e}"),
            })?;
        let mut connection = client
            .get_connection_manager()
            .await
            .map_err(|e| FileHorizonError::Transport {
                message: format!("redis connection failed: {e}"),
            })?;

        let stream = stream.into();
        let group = group.into();

        let created: Result<(), redis::RedisError> = connection
            .xgroup_create_mkstream(&stream, &group, "0")
            .await;
        if let Err(err) = created {
            if !err.to_string().contains("BUSYGROUP") {
                return Err(FileHorizonError::Transport {
                    message: format!("redis XGROUP CREATE failed: {err}"),
                });
            }
        }

        Ok(Self {
            connection,
            stream,
            group,
            consumer: format!("worker-{}", Uuid::new_v4()),
            dead_letter_stream: dead_letter_stream.into(),
            visibility_timeout_ms,
        })
    }

    fn delivery_id(stream_id: &str) -> String {
        stream_id.to_string()
    }
}

#[async_trait::async_trait]
impl EventQueue for RedisStreamQueue {
    async fn enqueue(&self, event: &FileEvent) -> FileHorizonResult<()> {
        let payload = serde_json::to_string(event)?;
        let mut connection = self.connection.clone();
        let _: String = connection
            .xadd(&self.stream, "*", &[(FIELD_PAYLOAD, payload)])
            .await
            .map_err(|e| FileHorizonError::Transport {
                message: format!("redis XADD failed: {e}"),
            })?;
        Ok(())
    }

    async fn dequeue(&self, max: usize) -> FileHorizonResult<Vec<QueuedEvent>> {
        let mut connection = self.connection.clone();
        let options = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(max);
        let reply: Option<redis::streams::StreamReadReply> = connection
            .xread_options(&[self.stream.as_str()], &[">"], &options)
            .await
            .map_err(|e| FileHorizonError::Transport {
                message: format!("redis XREADGROUP failed: {e}"),
            })?;

        let mut out = Vec::new();
        let Some(reply) = reply else {
            return Ok(out);
        };
        for key in reply.keys {
            for id in key.ids {
                let Some(redis::Value::BulkString(bytes)) = id.map.get(FIELD_PAYLOAD) else {
                    continue;
                };
                let event: FileEvent = serde_json::from_slice(bytes)?;
                out.push(QueuedEvent {
                    event,
                    delivery_id: Self::delivery_id(&id.id),
                    delivery_count: 1,
                });
            }
        }
        Ok(out)
    }

    async fn ack(&self, delivery_id: &str) -> FileHorizonResult<()> {
        let mut connection = self.connection.clone();
        let _: usize = connection
            .xack(&self.stream, &self.group, &[delivery_id])
            .await
            .map_err(|e| FileHorizonError::Transport {
                message: format!("redis XACK failed: {e}"),
            })?;
        Ok(())
    }

    async fn dead_letter(&self, delivery_id: &str, reason: &str) -> FileHorizonResult<()> {
        let mut connection = self.connection.clone();
        let claimed: redis::streams::StreamClaimReply = connection
            .xclaim(
                &self.stream,
                &self.group,
                &self.consumer,
                0,
                &[delivery_id],
            )
            .await
            .map_err(|e| FileHorizonError::Transport {
                message: format!("redis XCLAIM (dead-letter) failed: {e}"),
            })?;

        if let Some(id) = claimed.ids.first() {
            if let Some(redis::Value::BulkString(bytes)) = id.map.get(FIELD_PAYLOAD) {
                let _: String = connection
                    .xadd(
                        &self.dead_letter_stream,
                        "*",
                        &[
                            (FIELD_PAYLOAD, String::from_utf8_lossy(bytes).into_owned()),
                            ("reason", reason.to_string()),
                        ],
                    )
                    .await
                    .map_err(|e| FileHorizonError::Transport {
                        message: format!("redis dead-letter XADD failed: {e}"),
                    })?;
            }
        }

        self.ack(delivery_id).await
    }

    async fn reclaim_expired(&self) -> FileHorizonResult<Vec<QueuedEvent>> {
        let mut connection = self.connection.clone();
        let options = redis::streams::StreamAutoClaimOptions::default();
        let reply: redis::streams::StreamAutoClaimReply = connection
            .xautoclaim_options(
                &self.stream,
                &self.group,
                &self.consumer,
                self.visibility_timeout_ms,
                "0",
                options,
            )
            .await
            .map_err(|e| FileHorizonError::Transport {
                message: format!("redis XAUTOCLAIM failed: {e}"),
            })?;

        let mut out = Vec::new();
        for id in reply.claimed {
            let Some(redis::Value::BulkString(bytes)) = id.map.get(FIELD_PAYLOAD) else {
                continue;
            };
            let event: FileEvent = serde_json::from_slice(bytes)?;
            out.push(QueuedEvent {
                event,
                delivery_id: Self::delivery_id(&id.id),
                delivery_count: 2,
            });
        }
        Ok(out)
    }

    async fn depth(&self) -> FileHorizonResult<u64> {
        let mut connection = self.connection.clone();
        let len: u64 = connection
            .xlen(&self.stream)
            .await
            .map_err(|e| FileHorizonError::Transport {
                message: format!("redis XLEN failed: {e}"),
            })?;
        Ok(len)
    }
}
