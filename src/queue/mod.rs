//! Durable event queue.
//!
//! `EventQueue` is the seam between pollers (producers) and orchestration
//! workers (consumers). `memory` backs single-process/dev deployments;
//! `redis_stream` backs horizontally-scaled deployments via consumer groups,
//! matching spec §5's poller/worker scale-out model.

pub mod memory;
pub mod redis_stream;

use async_trait::async_trait;

use crate::error::FileHorizonResult;
use crate::model::FileEvent;

/// A dequeued event plus the token needed to acknowledge or dead-letter it.
#[derive(Debug, Clone)]
pub struct QueuedEvent {
    pub event: FileEvent,
    pub delivery_id: String,
    pub delivery_count: u32,
}

#[async_trait]
pub trait EventQueue: Send + Sync {
    /// Durably enqueue an event. Returns once the write is acknowledged by
    /// the backend.
    async fn enqueue(&self, event: &FileEvent) -> FileHorizonResult<()>;

    /// Dequeue up to `max` events not yet claimed by any consumer.
    async fn dequeue(&self, max: usize) -> FileHorizonResult<Vec<QueuedEvent>>;

    /// Acknowledge successful processing, removing the event from the
    /// pending list.
    async fn ack(&self, delivery_id: &str) -> FileHorizonResult<()>;

    /// Move an event straight to the dead-letter sink (spec §7: dead-lettered
    /// events are never auto-retried).
    async fn dead_letter(&self, delivery_id: &str, reason: &str) -> FileHorizonResult<()>;

    /// Reclaim events whose visibility timeout has elapsed without an ack,
    /// making them eligible for redelivery.
    async fn reclaim_expired(&self) -> FileHorizonResult<Vec<QueuedEvent>>;

    /// Approximate number of events awaiting processing.
    async fn depth(&self) -> FileHorizonResult<u64>;
}
