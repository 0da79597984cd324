//! Worker loop: dequeue → validate → idempotency-gate → route → write →
//! delete → notify → ack (spec §4.8).
//!
//! The linear stage sequence maps to the state machine spec §9 calls out
//! (`Received, Validated, Deduped, Routed, Reading, Writing(i), Deleting,
//! Notifying, Acked, DeadLettered`); each stage's outcome decides the next
//! or the terminal ack/dead-letter, logged at `tracing::debug!` for replay.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{DestinationType, FailurePolicy, FileDestinationConfig, RetryConfig, RoutingRuleConfig};
use crate::error::{ErrorClassification, FileHorizonResult};
use crate::idempotency::IdempotencyStore;
use crate::model::{DestinationResult, FileProcessedNotification, NotificationStatus};
use crate::protocol::ProtocolClient;
use crate::queue::{EventQueue, QueuedEvent};
use crate::router::Router;
use crate::sinks::Sink;
use crate::telemetry::Telemetry;
use crate::validator::EventValidator;

/// Publishes the terminal notification for a processed event. Kept as a
/// narrow trait so tests can assert on a recording double instead of a real
/// transport.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, notification: &FileProcessedNotification) -> FileHorizonResult<()>;
}

/// Logs the notification at info level. The only implementation this
/// pipeline ships: downstream systems tail structured logs rather than a
/// dedicated notification channel in v1.
pub struct LoggingNotifier;

#[async_trait::async_trait]
impl Notifier for LoggingNotifier {
    async fn publish(&self, notification: &FileProcessedNotification) -> FileHorizonResult<()> {
        let payload = serde_json::to_string(notification)?;
        tracing::info!(notification = %payload, "file processed");
        Ok(())
    }
}

pub struct Orchestrator {
    queue: Arc<dyn EventQueue>,
    validator: Arc<dyn EventValidator>,
    idempotency: Arc<dyn IdempotencyStore>,
    idempotency_ttl_seconds: u64,
    routing_rules: Vec<RoutingRuleConfig>,
    destinations: Vec<FileDestinationConfig>,
    sinks: HashMap<String, Arc<dyn Sink>>,
    source_clients: HashMap<String, Arc<dyn ProtocolClient>>,
    retry: RetryConfig,
    telemetry: Arc<dyn Telemetry>,
    notifier: Arc<dyn Notifier>,
    fail_pipeline_on_notify_failure: bool,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<dyn EventQueue>,
        validator: Arc<dyn EventValidator>,
        idempotency: Arc<dyn IdempotencyStore>,
        idempotency_ttl_seconds: u64,
        routing_rules: Vec<RoutingRuleConfig>,
        destinations: Vec<FileDestinationConfig>,
        sinks: HashMap<String, Arc<dyn Sink>>,
        source_clients: HashMap<String, Arc<dyn ProtocolClient>>,
        retry: RetryConfig,
        telemetry: Arc<dyn Telemetry>,
        notifier: Arc<dyn Notifier>,
        fail_pipeline_on_notify_failure: bool,
    ) -> Self {
        Self {
            queue,
            validator,
            idempotency,
            idempotency_ttl_seconds,
            routing_rules,
            destinations,
            sinks,
            source_clients,
            retry,
            telemetry,
            notifier,
            fail_pipeline_on_notify_failure,
        }
    }

    /// Dequeue up to `max` events and drive each to completion.
    pub async fn run_once(&self, max: usize) -> FileHorizonResult<usize> {
        let claimed = self.queue.dequeue(max).await?;
        let count = claimed.len();
        for queued in claimed {
            self.process(queued).await;
        }
        self.telemetry.queue_depth(self.queue.depth().await.unwrap_or(0));
        Ok(count)
    }

    /// Reclaim events whose visibility timeout elapsed and process them as
    /// redeliveries.
    pub async fn reclaim_and_process(&self) -> FileHorizonResult<usize> {
        let reclaimed = self.queue.reclaim_expired().await?;
        let count = reclaimed.len();
        for queued in reclaimed {
            self.process(queued).await;
        }
        Ok(count)
    }

    async fn process(&self, queued: QueuedEvent) {
        let QueuedEvent {
            event,
            delivery_id,
            delivery_count: _,
        } = queued;

        let start = Instant::now();
        tracing::debug!(event_id = %event.id, state = "Received", "orchestrating event");

        if let Err(err) = self.validator.validate(&event) {
            tracing::debug!(event_id = %event.id, state = "Validated", error = %err, "validation failed");
            self.telemetry.event_failed(err.code());
            self.telemetry.event_dead_lettered(err.code());
            let _ = self.queue.dead_letter(&delivery_id, err.code()).await;
            return;
        }

        let idempotency_key = format!("file:{}", event.id);
        match self
            .idempotency
            .try_claim(&idempotency_key, self.idempotency_ttl_seconds)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(event_id = %event.id, state = "Deduped", "already processed");
                let _ = self.queue.ack(&delivery_id).await;
                return;
            }
            Err(err) => {
                tracing::warn!(event_id = %event.id, error = %err, "idempotency store unavailable");
                self.telemetry.event_failed(err.code());
                return;
            }
        }

        let router = Router::new(&self.routing_rules, &self.destinations);
        let routed = match router.route(&event) {
            Ok(routed) => routed,
            Err(err) => {
                tracing::debug!(event_id = %event.id, error = %err, "routing failed");
                self.telemetry.event_failed(err.code());
                self.telemetry.event_dead_lettered(err.code());
                let _ = self.idempotency.release_claim(&idempotency_key).await;
                let _ = self.queue.dead_letter(&delivery_id, err.code()).await;
                return;
            }
        };

        let Some((plans, failure_policy)) = routed else {
            tracing::debug!(event_id = %event.id, state = "Routed", "no matching rule, no-op");
            let _ = self.idempotency.release_claim(&idempotency_key).await;
            let _ = self.queue.ack(&delivery_id).await;
            return;
        };

        let Some(source_client) = event
            .source_name
            .as_deref()
            .and_then(|name| self.source_clients.get(name))
        else {
            tracing::warn!(event_id = %event.id, "no protocol client registered for source");
            self.telemetry.event_dead_lettered("Unspecified.Configuration");
            let _ = self.queue.dead_letter(&delivery_id, "no protocol client for source").await;
            return;
        };

        let content = match with_retry(&self.retry, || source_client.read(&event.metadata.source_path)).await {
            Ok(content) => content,
            Err(err) => {
                tracing::debug!(event_id = %event.id, error = %err, "source read failed");
                self.telemetry.event_failed(err.code());
                self.telemetry.event_dead_lettered(err.code());
                let _ = self.queue.dead_letter(&delivery_id, err.code()).await;
                return;
            }
        };

        let mut results = Vec::with_capacity(plans.len());
        let mut all_succeeded = true;
        for plan in &plans {
            let Some(sink) = self.sinks.get(&plan.destination_name) else {
                results.push(DestinationResult {
                    r#type: "unknown".to_string(),
                    identifier: plan.destination_name.clone(),
                    success: false,
                    bytes_written: 0,
                    latency: None,
                });
                all_succeeded = false;
                if failure_policy == FailurePolicy::AllOrNothing {
                    break;
                }
                continue;
            };

            let destination_type = self
                .destinations
                .iter()
                .find(|d| d.name == plan.destination_name)
                .map(|d| destination_type_label(d.r#type))
                .unwrap_or("unknown");

            let write_result = with_retry(&self.retry, || sink.write(&plan.target_path, &content, &plan.write_options)).await;
            match write_result {
                Ok(latency) => {
                    results.push(DestinationResult {
                        r#type: destination_type.to_string(),
                        identifier: plan.target_path.clone(),
                        success: true,
                        bytes_written: content.len() as u64,
                        latency: Some(latency),
                    });
                }
                Err(err) => {
                    tracing::debug!(event_id = %event.id, destination = %plan.destination_name, error = %err, "sink write failed");
                    self.telemetry.event_failed(err.code());
                    results.push(DestinationResult {
                        r#type: destination_type.to_string(),
                        identifier: plan.target_path.clone(),
                        success: false,
                        bytes_written: 0,
                        latency: None,
                    });
                    all_succeeded = false;
                    if failure_policy == FailurePolicy::AllOrNothing {
                        break;
                    }
                }
            }
        }

        if all_succeeded && event.delete_after_transfer {
            if let Err(err) = source_client.delete(&event.metadata.source_path).await {
                tracing::warn!(event_id = %event.id, error = %err, "source delete failed after successful transfer");
            }
        }

        let notification = FileProcessedNotification {
            schema_version: FileProcessedNotification::SCHEMA_VERSION,
            protocol: event.protocol,
            full_path: event.metadata.source_path.clone(),
            size: event.metadata.size,
            last_mod_utc: event.metadata.last_mod_utc,
            status: if all_succeeded { NotificationStatus::Success } else { NotificationStatus::Failure },
            duration: start.elapsed(),
            idempotency_key: idempotency_key.clone(),
            correlation_id: event.id,
            completed_utc: chrono::Utc::now(),
            destinations: results,
        };

        if let Err(err) = self.notifier.publish(&notification).await {
            tracing::warn!(event_id = %event.id, error = %err, "notifier publish failed");
            if self.fail_pipeline_on_notify_failure {
                self.telemetry.event_dead_lettered(err.code());
                let _ = self.queue.dead_letter(&delivery_id, "notifier publish failed").await;
                return;
            }
        }

        if all_succeeded {
            let _ = self
                .idempotency
                .mark_processed(&idempotency_key, self.idempotency_ttl_seconds)
                .await;
            self.telemetry.event_processed(notification.destinations.len(), notification.duration);
            let _ = self.queue.ack(&delivery_id).await;
        } else {
            self.telemetry.event_dead_lettered("Unspecified.SinkWrite");
            let _ = self.queue.dead_letter(&delivery_id, "one or more destinations failed").await;
        }
    }
}

fn destination_type_label(destination_type: DestinationType) -> &'static str {
    match destination_type {
        DestinationType::Local => "local",
        DestinationType::ObjectStore => "object_store",
        DestinationType::Sftp => "sftp",
        DestinationType::MessageBus => "message_bus",
    }
}

/// Retries `f` while the returned error classifies as retryable (spec §4.8:
/// transient sink errors retry with exponential backoff up to
/// `retry.max_attempts`).
async fn with_retry<F, Fut, T>(retry: &RetryConfig, mut f: F) -> FileHorizonResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = FileHorizonResult<T>>,
{
    let mut attempt = 0;
    let mut backoff = Duration::from_millis(retry.backoff_base_ms);
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if err.classification() == ErrorClassification::RetriedInOrchestration => {
                attempt += 1;
                if attempt >= retry.max_attempts {
                    return Err(err);
                }
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(Duration::from_millis(retry.backoff_max_ms));
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DestinationOptions, FailurePolicy, RoutingMatch};
    use crate::idempotency::memory::MemoryIdempotencyStore;
    use crate::model::{FileAttributes, FileEvent, FileReference, Protocol, WriteOptions};
    use crate::protocol::RemoteFileInfo;
    use crate::queue::memory::MemoryEventQueue;
    use crate::telemetry::NoopTelemetry;
    use crate::validator::StructuralValidator;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubClient {
        content: Vec<u8>,
        deletes: AtomicUsize,
    }

    #[async_trait]
    impl ProtocolClient for StubClient {
        async fn list(&self, _path: &str) -> FileHorizonResult<Vec<RemoteFileInfo>> {
            Ok(vec![])
        }
        async fn stat(&self, _path: &str) -> FileHorizonResult<FileAttributes> {
            unimplemented!()
        }
        async fn read(&self, _path: &str) -> FileHorizonResult<Vec<u8>> {
            Ok(self.content.clone())
        }
        async fn write(&self, _path: &str, _content: &[u8], _create_dirs: bool) -> FileHorizonResult<()> {
            unimplemented!()
        }
        async fn delete(&self, _path: &str) -> FileHorizonResult<()> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn rename(&self, _from: &str, _to: &str) -> FileHorizonResult<()> {
            unimplemented!()
        }
    }

    struct RecordingSink {
        writes: AtomicUsize,
    }

    #[async_trait]
    impl Sink for RecordingSink {
        async fn write(&self, _target_path: &str, _content: &[u8], _options: &WriteOptions) -> FileHorizonResult<Duration> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(Duration::from_millis(1))
        }
    }

    fn sample_event(delete_after: bool) -> FileEvent {
        let reference = FileReference::new(Protocol::Local, "/in/a.txt");
        let attrs = FileAttributes {
            size: 5,
            last_write_utc: Utc::now(),
            hash: None,
        };
        let mut event = FileEvent::new(&reference, &attrs, delete_after);
        event.source_name = Some("local".to_string());
        event
    }

    fn routing_fixture() -> (Vec<RoutingRuleConfig>, Vec<FileDestinationConfig>) {
        let destinations = vec![FileDestinationConfig {
            name: "archive".to_string(),
            r#type: DestinationType::Local,
            target: "/archive".to_string(),
            options: DestinationOptions::default(),
        }];
        let rules = vec![RoutingRuleConfig {
            r#match: RoutingMatch::default(),
            destinations: vec!["archive".to_string()],
            failure_policy: FailurePolicy::AllOrNothing,
        }];
        (rules, destinations)
    }

    #[tokio::test]
    async fn successful_event_is_acked_and_deletes_source() {
        let (rules, destinations) = routing_fixture();
        let queue: Arc<dyn EventQueue> = Arc::new(MemoryEventQueue::default());
        let source_client = Arc::new(StubClient {
            content: b"hello".to_vec(),
            deletes: AtomicUsize::new(0),
        });
        let sink = Arc::new(RecordingSink { writes: AtomicUsize::new(0) });

        let mut sinks: HashMap<String, Arc<dyn Sink>> = HashMap::new();
        sinks.insert("archive".to_string(), sink.clone());
        let mut source_clients: HashMap<String, Arc<dyn ProtocolClient>> = HashMap::new();
        source_clients.insert("local".to_string(), source_client.clone());

        let orchestrator = Orchestrator::new(
            queue.clone(),
            Arc::new(StructuralValidator),
            Arc::new(MemoryIdempotencyStore::new()),
            60,
            rules,
            destinations,
            sinks,
            source_clients,
            RetryConfig::default(),
            Arc::new(NoopTelemetry),
            Arc::new(LoggingNotifier),
            false,
        );

        queue.enqueue(&sample_event(true)).await.unwrap();
        let processed = orchestrator.run_once(10).await.unwrap();

        assert_eq!(processed, 1);
        assert_eq!(sink.writes.load(Ordering::SeqCst), 1);
        assert_eq!(source_client.deletes.load(Ordering::SeqCst), 1);
        assert_eq!(queue.depth().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn duplicate_delivery_short_circuits_without_writing() {
        let (rules, destinations) = routing_fixture();
        let queue: Arc<dyn EventQueue> = Arc::new(MemoryEventQueue::default());
        let source_client = Arc::new(StubClient {
            content: b"hello".to_vec(),
            deletes: AtomicUsize::new(0),
        });
        let sink = Arc::new(RecordingSink { writes: AtomicUsize::new(0) });

        let mut sinks: HashMap<String, Arc<dyn Sink>> = HashMap::new();
        sinks.insert("archive".to_string(), sink.clone());
        let mut source_clients: HashMap<String, Arc<dyn ProtocolClient>> = HashMap::new();
        source_clients.insert("local".to_string(), source_client.clone());

        let idempotency = Arc::new(MemoryIdempotencyStore::new());
        let event = sample_event(false);
        idempotency.mark_processed(&format!("file:{}", event.id), 60).await.unwrap();

        let orchestrator = Orchestrator::new(
            queue.clone(),
            Arc::new(StructuralValidator),
            idempotency,
            60,
            rules,
            destinations,
            sinks,
            source_clients,
            RetryConfig::default(),
            Arc::new(NoopTelemetry),
            Arc::new(LoggingNotifier),
            false,
        );

        queue.enqueue(&event).await.unwrap();
        orchestrator.run_once(10).await.unwrap();

        assert_eq!(sink.writes.load(Ordering::SeqCst), 0);
        assert_eq!(queue.depth().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn validation_failure_is_dead_lettered() {
        let (rules, destinations) = routing_fixture();
        let queue: Arc<dyn EventQueue> = Arc::new(MemoryEventQueue::default());
        let mut event = sample_event(false);
        event.metadata.size = 0;

        let orchestrator = Orchestrator::new(
            queue.clone(),
            Arc::new(StructuralValidator),
            Arc::new(MemoryIdempotencyStore::new()),
            60,
            rules,
            destinations,
            HashMap::new(),
            HashMap::new(),
            RetryConfig::default(),
            Arc::new(NoopTelemetry),
            Arc::new(LoggingNotifier),
            false,
        );

        queue.enqueue(&event).await.unwrap();
        orchestrator.run_once(10).await.unwrap();

        assert_eq!(queue.depth().await.unwrap(), 0);
    }
}
