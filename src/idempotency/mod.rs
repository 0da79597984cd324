//! Idempotency store.
//!
//! Keyed by `FileReference::identity_key()`. A key that is already marked
//! processed causes the orchestrator to short-circuit with
//! `FileHorizonError::AlreadyProcessed`, which spec §7 classifies as
//! recovered locally rather than a failure.

pub mod memory;
pub mod redis;

use async_trait::async_trait;

use crate::error::FileHorizonResult;

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Atomically marks `key` as in-progress. Returns `true` if this call
    /// won the race (the key was not already present), `false` otherwise.
    async fn try_claim(&self, key: &str, ttl_seconds: u64) -> FileHorizonResult<bool>;

    /// Marks `key` as durably processed, independent of the claim above, so
    /// reprocessing after a crash mid-transfer still dedupes correctly.
    async fn mark_processed(&self, key: &str, ttl_seconds: u64) -> FileHorizonResult<()>;

    /// Releases a claim without marking it processed, used when validation
    /// or routing fails before any destination write happened.
    async fn release_claim(&self, key: &str) -> FileHorizonResult<()>;
}
