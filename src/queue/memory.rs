//! In-memory event queue, used when Redis is disabled or unreachable at
//! startup (spec S6: a single-process deployment falls back to this backend
//! and logs the fact once rather than failing).

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{FileHorizonError, FileHorizonResult};
use crate::model::FileEvent;

use super::{EventQueue, QueuedEvent};

struct InFlight {
    event: FileEvent,
    claimed_at: Instant,
    delivery_count: u32,
}

pub struct MemoryEventQueue {
    pending: Mutex<VecDeque<FileEvent>>,
    in_flight: DashMap<String, InFlight>,
    dead_letter: DashMap<String, (FileEvent, String)>,
    visibility_timeout: Duration,
}

impl MemoryEventQueue {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            in_flight: DashMap::new(),
            dead_letter: DashMap::new(),
            visibility_timeout,
        }
    }

    pub fn dead_letter_len(&self) -> usize {
        self.dead_letter.len()
    }
}

impl Default for MemoryEventQueue {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

#[async_trait]
impl EventQueue for MemoryEventQueue {
    async fn enqueue(&self, event: &FileEvent) -> FileHorizonResult<()> {
        self.pending.lock().await.push_back(event.clone());
        Ok(())
    }

    async fn dequeue(&self, max: usize) -> FileHorizonResult<Vec<QueuedEvent>> {
        let mut pending = self.pending.lock().await;
        let mut out = Vec::with_capacity(max.min(pending.len()));
        for _ in 0..max {
            let Some(event) = pending.pop_front() else {
                break;
            };
            let delivery_id = Uuid::new_v4().to_string();
            self.in_flight.insert(
                delivery_id.clone(),
                InFlight {
                    event: event.clone(),
                    claimed_at: Instant::now(),
                    delivery_count: 1,
                },
            );
            out.push(QueuedEvent {
                event,
                delivery_id,
                delivery_count: 1,
            });
        }
        Ok(out)
    }

    async fn ack(&self, delivery_id: &str) -> FileHorizonResult<()> {
        self.in_flight
            .remove(delivery_id)
            .map(|_| ())
            .ok_or_else(|| FileHorizonError::Unspecified(format!(
                "no in-flight event for delivery id {delivery_id}"
            )))
    }

    async fn dead_letter(&self, delivery_id: &str, reason: &str) -> FileHorizonResult<()> {
        let (_, entry) = self
            .in_flight
            .remove(delivery_id)
            .ok_or_else(|| FileHorizonError::Unspecified(format!(
                "no in-flight event for delivery id {delivery_id}"
            )))?;
        self.dead_letter
            .insert(delivery_id.to_string(), (entry.event, reason.to_string()));
        Ok(())
    }

    async fn reclaim_expired(&self) -> FileHorizonResult<Vec<QueuedEvent>> {
        let now = Instant::now();
        let mut reclaimed = Vec::new();
        let expired_ids: Vec<String> = self
            .in_flight
            .iter()
            .filter(|entry| now.duration_since(entry.claimed_at) >= self.visibility_timeout)
            .map(|entry| entry.key().clone())
            .collect();

        for old_id in expired_ids {
            if let Some((_, entry)) = self.in_flight.remove(&old_id) {
                let delivery_id = Uuid::new_v4().to_string();
                let delivery_count = entry.delivery_count + 1;
                self.in_flight.insert(
                    delivery_id.clone(),
                    InFlight {
                        event: entry.event.clone(),
                        claimed_at: Instant::now(),
                        delivery_count,
                    },
                );
                reclaimed.push(QueuedEvent {
                    event: entry.event,
                    delivery_id,
                    delivery_count,
                });
            }
        }
        Ok(reclaimed)
    }

    async fn depth(&self) -> FileHorizonResult<u64> {
        Ok((self.pending.lock().await.len() + self.in_flight.len()) as u64)
    }
}

pub type SharedMemoryEventQueue = Arc<MemoryEventQueue>;
