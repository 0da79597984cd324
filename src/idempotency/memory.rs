//! DashMap-backed idempotency store for single-process deployments,
//! grounded on the manager's `active_files` concurrent registry pattern.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::FileHorizonResult;

use super::IdempotencyStore;

pub struct MemoryIdempotencyStore {
    entries: DashMap<String, Instant>,
}

impl MemoryIdempotencyStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl Default for MemoryIdempotencyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdempotencyStore for MemoryIdempotencyStore {
    async fn try_claim(&self, key: &str, ttl_seconds: u64) -> FileHorizonResult<bool> {
        let now = Instant::now();
        let new_expiry = now + Duration::from_secs(ttl_seconds);
        // Single atomic entry access: whoever observes the slot vacant or
        // expired wins the claim, mirroring the Redis backend's `SET NX`.
        match self.entries.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(new_expiry);
                Ok(true)
            }
            dashmap::mapref::entry::Entry::Occupied(mut slot) => {
                if now >= *slot.get() {
                    slot.insert(new_expiry);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    async fn mark_processed(&self, key: &str, ttl_seconds: u64) -> FileHorizonResult<()> {
        self.entries
            .insert(key.to_string(), Instant::now() + Duration::from_secs(ttl_seconds));
        Ok(())
    }

    async fn release_claim(&self, key: &str) -> FileHorizonResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_claim_of_same_key_fails_until_released() {
        let store = MemoryIdempotencyStore::new();
        assert!(store.try_claim("k1", 60).await.unwrap());
        assert!(!store.try_claim("k1", 60).await.unwrap());

        store.release_claim("k1").await.unwrap();
        assert!(store.try_claim("k1", 60).await.unwrap());
    }

    #[tokio::test]
    async fn expired_claim_can_be_retaken() {
        let store = MemoryIdempotencyStore::new();
        assert!(store.try_claim("k1", 0).await.unwrap());
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(store.try_claim("k1", 60).await.unwrap());
    }
}
