//! Redis-backed idempotency store, shared across all worker processes.
//!
//! `try_claim` uses `SET key value NX EX ttl`, Redis's standard
//! distributed-lock idiom, so only one worker wins the race for a given
//! identity key.

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, ExistenceCheck, SetExpiry, SetOptions};

use crate::error::{FileHorizonError, FileHorizonResult};

use super::IdempotencyStore;

pub struct RedisIdempotencyStore {
    connection: ConnectionManager,
    key_prefix: String,
}

impl RedisIdempotencyStore {
    pub async fn connect(connection_string: &str, key_prefix: impl Into<String>) -> FileHorizonResult<Self> {
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
            key_prefix: key_prefix.into(),
        })
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }
}

#[async_trait::async_trait]
impl IdempotencyStore for RedisIdempotencyStore {
    async fn try_claim(&self, key: &str, ttl_seconds: u64) -> FileHorizonResult<bool> {
        let mut connection = self.connection.clone();
        let options = SetOptions::default()
            .conditional_set(ExistenceCheck::NX)
            .with_expiration(SetExpiry::EX(ttl_seconds));
        let result: Option<String> = connection
            .set_options(self.namespaced(key), "1", options)
            .await
            .map_err(|e| FileHorizonError::Transport {
                message: format!("redis SET NX failed: {e}"),
            })?;
        Ok(result.is_some())
    }

    async fn mark_processed(&self, key: &str, ttl_seconds: u64) -> FileHorizonResult<()> {
        let mut connection = self.connection.clone();
        let _: () = connection
            .set_ex(self.namespaced(key), "1", ttl_seconds)
            .await
            .map_err(|e| FileHorizonError::Transport {
                message: format!("redis SETEX failed: {e}"),
            })?;
        Ok(())
    }

    async fn release_claim(&self, key: &str) -> FileHorizonResult<()> {
        let mut connection = self.connection.clone();
        let _: usize = connection
            .del(self.namespaced(key))
            .await
            .map_err(|e| FileHorizonError::Transport {
                message: format!("redis DEL failed: {e}"),
            })?;
        Ok(())
    }
}
