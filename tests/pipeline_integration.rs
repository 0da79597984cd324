//! End-to-end tests exercising the discovery → queue → orchestrator path
//! with real components (temp directories, the in-memory queue and
//! idempotency store) rather than unit-level doubles.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use filehorizon::config::{
    DestinationOptions, DestinationType, FailurePolicy, FileDestinationConfig, RemoteProtocolOrLocal,
    RetryConfig, RoutingMatch, RoutingRuleConfig,
};
use filehorizon::error::{FileHorizonError, FileHorizonResult};
use filehorizon::idempotency::memory::MemoryIdempotencyStore;
use filehorizon::model::{FileAttributes, Protocol};
use filehorizon::orchestrator::{LoggingNotifier, Orchestrator};
use filehorizon::poller::{Poller, PollerSource};
use filehorizon::protocol::local::LocalFileClient;
use filehorizon::protocol::{ProtocolClient, RemoteFileInfo};
use filehorizon::queue::memory::MemoryEventQueue;
use filehorizon::queue::EventQueue;
use filehorizon::sinks::local_fs::LocalFsSink;
use filehorizon::sinks::Sink;
use filehorizon::telemetry::{NoopTelemetry, Telemetry};
use filehorizon::validator::StructuralValidator;

fn all_or_nothing_rule(destinations: &[&str]) -> RoutingRuleConfig {
    RoutingRuleConfig {
        r#match: RoutingMatch {
            protocol: Some(RemoteProtocolOrLocal::Local),
            source_name: None,
            path_pattern: None,
        },
        destinations: destinations.iter().map(|s| s.to_string()).collect(),
        failure_policy: FailurePolicy::AllOrNothing,
    }
}

fn local_destination(name: &str, target_dir: &std::path::Path) -> FileDestinationConfig {
    FileDestinationConfig {
        name: name.to_string(),
        r#type: DestinationType::Local,
        target: target_dir.to_string_lossy().into_owned(),
        options: DestinationOptions {
            overwrite: false,
            create_directories: true,
            rename_pattern: None,
            credential_secret_ref: None,
        },
    }
}

fn make_orchestrator(
    queue: Arc<dyn EventQueue>,
    rules: Vec<RoutingRuleConfig>,
    destinations: Vec<FileDestinationConfig>,
    sinks: HashMap<String, Arc<dyn Sink>>,
    source_clients: HashMap<String, Arc<dyn ProtocolClient>>,
) -> Orchestrator {
    Orchestrator::new(
        queue,
        Arc::new(StructuralValidator),
        Arc::new(MemoryIdempotencyStore::new()),
        86_400,
        rules,
        destinations,
        sinks,
        source_clients,
        RetryConfig {
            max_attempts: 2,
            backoff_base_ms: 1,
            backoff_max_ms: 5,
        },
        Arc::new(NoopTelemetry),
        Arc::new(LoggingNotifier),
        false,
    )
}

/// A stable file discovered by the poller should be enqueued exactly once
/// across repeated polls and land in the destination with its content
/// intact after the orchestrator processes it.
#[tokio::test]
async fn stable_local_file_is_copied_to_destination_exactly_once() {
    let source_dir = tempfile::tempdir().unwrap();
    let dest_dir = tempfile::tempdir().unwrap();
    let source_path = source_dir.path().join("a.txt");
    tokio::fs::write(&source_path, b"hello").await.unwrap();

    let client: Arc<dyn ProtocolClient> = Arc::new(LocalFileClient::new());
    let queue: Arc<dyn EventQueue> = Arc::new(MemoryEventQueue::new(Duration::from_secs(60)));
    let telemetry: Arc<dyn Telemetry> = Arc::new(NoopTelemetry);

    let source = PollerSource {
        name: "inbound".to_string(),
        protocol: Protocol::Local,
        client: client.clone(),
        root_path: source_dir.path().to_string_lossy().into_owned(),
        host: None,
        port: None,
        pattern: None,
        recursive: false,
        min_stable_seconds: 0,
        destination_path_hint: None,
        move_after_processing: false,
    };
    let poller = Poller::new(vec![source], queue.clone(), telemetry, 32);

    poller.poll_once().await;
    poller.poll_once().await;
    assert_eq!(queue.depth().await.unwrap(), 1, "stable file enqueued exactly once");

    let dest_target = dest_dir.path().join("a.txt");
    let destination = local_destination("archive", dest_dir.path());
    let mut sinks: HashMap<String, Arc<dyn Sink>> = HashMap::new();
    sinks.insert("archive".to_string(), Arc::new(LocalFsSink));
    let mut source_clients: HashMap<String, Arc<dyn ProtocolClient>> = HashMap::new();
    source_clients.insert("inbound".to_string(), client);

    let orchestrator = make_orchestrator(
        queue.clone(),
        vec![all_or_nothing_rule(&["archive"])],
        vec![destination],
        sinks,
        source_clients,
    );

    let processed = orchestrator.run_once(10).await.unwrap();
    assert_eq!(processed, 1);
    assert_eq!(queue.depth().await.unwrap(), 0);

    let written = tokio::fs::read(&dest_target).await.unwrap();
    assert_eq!(written, b"hello");
}

/// A file that is still growing across polls must not be emitted until its
/// size has held steady for the configured stability window.
#[tokio::test]
async fn growing_file_is_not_emitted_until_size_settles() {
    let source_dir = tempfile::tempdir().unwrap();
    let path = source_dir.path().join("b.txt");
    tokio::fs::write(&path, vec![0u8; 100]).await.unwrap();

    let client: Arc<dyn ProtocolClient> = Arc::new(LocalFileClient::new());
    let queue: Arc<dyn EventQueue> = Arc::new(MemoryEventQueue::new(Duration::from_secs(60)));
    let source = PollerSource {
        name: "inbound".to_string(),
        protocol: Protocol::Local,
        client,
        root_path: source_dir.path().to_string_lossy().into_owned(),
        host: None,
        port: None,
        pattern: None,
        recursive: false,
        min_stable_seconds: 3600,
        destination_path_hint: None,
        move_after_processing: false,
    };
    let poller = Poller::new(vec![source], queue.clone(), Arc::new(NoopTelemetry), 32);

    poller.poll_once().await;
    assert_eq!(queue.depth().await.unwrap(), 0);

    tokio::fs::write(&path, vec![0u8; 200]).await.unwrap();
    poller.poll_once().await;
    assert_eq!(
        queue.depth().await.unwrap(),
        0,
        "size change must reset the stability window"
    );
}

/// Redelivering the same event (simulating a visibility-timeout reclaim or
/// a duplicate queue read) must not write to the destination twice.
#[tokio::test]
async fn duplicate_delivery_does_not_write_twice() {
    struct CountingSink {
        writes: AtomicUsize,
    }
    #[async_trait]
    impl Sink for CountingSink {
        async fn write(
            &self,
            _target_path: &str,
            _content: &[u8],
            _options: &filehorizon::model::WriteOptions,
        ) -> FileHorizonResult<Duration> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(Duration::from_millis(1))
        }
    }

    let source_dir = tempfile::tempdir().unwrap();
    let source_path = source_dir.path().join("c.txt");
    tokio::fs::write(&source_path, b"once only").await.unwrap();

    let client: Arc<dyn ProtocolClient> = Arc::new(LocalFileClient::new());
    let attrs = client.stat(source_path.to_str().unwrap()).await.unwrap();
    let reference = filehorizon::model::FileReference {
        scheme: Protocol::Local,
        host: None,
        port: None,
        path: source_path.to_string_lossy().into_owned(),
        source_name: Some("inbound".to_string()),
    };
    let event = filehorizon::model::FileEvent::new(&reference, &attrs, false);

    let queue: Arc<dyn EventQueue> = Arc::new(MemoryEventQueue::new(Duration::from_secs(60)));
    // Enqueue the same event id twice, simulating a redelivered message.
    queue.enqueue(&event).await.unwrap();
    queue.enqueue(&event).await.unwrap();

    let sink = Arc::new(CountingSink {
        writes: AtomicUsize::new(0),
    });
    let destination = FileDestinationConfig {
        name: "archive".to_string(),
        r#type: DestinationType::Local,
        target: "unused".to_string(),
        options: DestinationOptions {
            overwrite: true,
            create_directories: false,
            rename_pattern: None,
            credential_secret_ref: None,
        },
    };
    let sinks: HashMap<String, Arc<dyn Sink>> =
        HashMap::from([("archive".to_string(), sink.clone() as Arc<dyn Sink>)]);
    let source_clients: HashMap<String, Arc<dyn ProtocolClient>> =
        HashMap::from([("inbound".to_string(), client)]);

    let orchestrator = make_orchestrator(
        queue.clone(),
        vec![all_or_nothing_rule(&["archive"])],
        vec![destination],
        sinks,
        source_clients,
    );

    let processed = orchestrator.run_once(10).await.unwrap();
    assert_eq!(processed, 2, "both deliveries are dequeued in one batch");
    assert_eq!(queue.depth().await.unwrap(), 0);
    assert_eq!(
        sink.writes.load(Ordering::SeqCst),
        1,
        "the second delivery must short-circuit on the idempotency claim"
    );
}

/// When one of two destinations fails under an all-or-nothing policy, the
/// event must be dead-lettered and the source must not be deleted, even
/// though the first destination's write already landed (no rollback).
#[tokio::test]
async fn all_or_nothing_fan_out_dead_letters_on_partial_failure() {
    struct AlwaysFailsSink;
    #[async_trait]
    impl Sink for AlwaysFailsSink {
        async fn write(
            &self,
            _target_path: &str,
            _content: &[u8],
            _options: &filehorizon::model::WriteOptions,
        ) -> FileHorizonResult<Duration> {
            Err(FileHorizonError::SinkWrite {
                sink: "d2".to_string(),
                reason: "permanent failure".to_string(),
            })
        }
    }

    struct CountingDeleteClient {
        inner: LocalFileClient,
        deletes: AtomicUsize,
    }
    #[async_trait]
    impl ProtocolClient for CountingDeleteClient {
        async fn list(&self, path: &str) -> FileHorizonResult<Vec<RemoteFileInfo>> {
            self.inner.list(path).await
        }
        async fn stat(&self, path: &str) -> FileHorizonResult<FileAttributes> {
            self.inner.stat(path).await
        }
        async fn read(&self, path: &str) -> FileHorizonResult<Vec<u8>> {
            self.inner.read(path).await
        }
        async fn write(&self, path: &str, content: &[u8], create_dirs: bool) -> FileHorizonResult<()> {
            self.inner.write(path, content, create_dirs).await
        }
        async fn delete(&self, path: &str) -> FileHorizonResult<()> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            self.inner.delete(path).await
        }
        async fn rename(&self, from: &str, to: &str) -> FileHorizonResult<()> {
            self.inner.rename(from, to).await
        }
    }

    let source_dir = tempfile::tempdir().unwrap();
    let dest_dir = tempfile::tempdir().unwrap();
    let source_path = source_dir.path().join("d.txt");
    tokio::fs::write(&source_path, b"fan out me").await.unwrap();

    let client = Arc::new(CountingDeleteClient {
        inner: LocalFileClient::new(),
        deletes: AtomicUsize::new(0),
    });
    let attrs = client.stat(source_path.to_str().unwrap()).await.unwrap();
    let reference = filehorizon::model::FileReference {
        scheme: Protocol::Local,
        host: None,
        port: None,
        path: source_path.to_string_lossy().into_owned(),
        source_name: Some("inbound".to_string()),
    };
    let mut event = filehorizon::model::FileEvent::new(&reference, &attrs, true);
    event.destination_path_hint = Some("d.txt".to_string());

    let queue: Arc<dyn EventQueue> = Arc::new(MemoryEventQueue::new(Duration::from_secs(60)));
    queue.enqueue(&event).await.unwrap();

    let d1 = local_destination("d1", dest_dir.path());
    let d2 = FileDestinationConfig {
        name: "d2".to_string(),
        r#type: DestinationType::Local,
        target: dest_dir.path().to_string_lossy().into_owned(),
        options: DestinationOptions {
            overwrite: false,
            create_directories: true,
            rename_pattern: None,
            credential_secret_ref: None,
        },
    };
    let sinks: HashMap<String, Arc<dyn Sink>> = HashMap::from([
        ("d1".to_string(), Arc::new(LocalFsSink) as Arc<dyn Sink>),
        ("d2".to_string(), Arc::new(AlwaysFailsSink) as Arc<dyn Sink>),
    ]);
    let source_clients: HashMap<String, Arc<dyn ProtocolClient>> =
        HashMap::from([("inbound".to_string(), client.clone() as Arc<dyn ProtocolClient>)]);

    let orchestrator = make_orchestrator(
        queue.clone(),
        vec![all_or_nothing_rule(&["d1", "d2"])],
        vec![d1, d2],
        sinks,
        source_clients,
    );

    orchestrator.run_once(10).await.unwrap();

    assert_eq!(queue.depth().await.unwrap(), 0, "failed event is acked off the live queue");
    assert_eq!(
        client.deletes.load(Ordering::SeqCst),
        0,
        "source must not be deleted when any destination in an all-or-nothing fan-out fails"
    );
    assert!(
        tokio::fs::metadata(dest_dir.path().join("d.txt")).await.is_ok(),
        "d1's write is left in place; v1 performs no rollback"
    );
}

/// A source that fails every poll must back off exponentially, capped, and
/// report one failure per attempt rather than ever emitting an event.
#[tokio::test(start_paused = true)]
async fn repeated_poll_failures_back_off_and_report_each_failure() {
    struct AlwaysFailsClient;
    #[async_trait]
    impl ProtocolClient for AlwaysFailsClient {
        async fn list(&self, _path: &str) -> FileHorizonResult<Vec<RemoteFileInfo>> {
            Err(FileHorizonError::Transport {
                message: "connection refused".to_string(),
            })
        }
        async fn stat(&self, _path: &str) -> FileHorizonResult<FileAttributes> {
            unreachable!()
        }
        async fn read(&self, _path: &str) -> FileHorizonResult<Vec<u8>> {
            unreachable!()
        }
        async fn write(&self, _path: &str, _content: &[u8], _create_dirs: bool) -> FileHorizonResult<()> {
            unreachable!()
        }
        async fn delete(&self, _path: &str) -> FileHorizonResult<()> {
            unreachable!()
        }
        async fn rename(&self, _from: &str, _to: &str) -> FileHorizonResult<()> {
            unreachable!()
        }
    }

    #[derive(Default)]
    struct CountingTelemetry {
        failures: AtomicU32,
    }
    impl Telemetry for CountingTelemetry {
        fn file_discovered(&self, _source_name: &str) {}
        fn event_enqueued(&self, _source_name: &str) {}
        fn event_processed(&self, _destination_count: usize, _duration: Duration) {}
        fn event_failed(&self, _error_code: &str) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
        fn event_dead_lettered(&self, _error_code: &str) {}
        fn queue_depth(&self, _depth: u64) {}
    }

    let queue: Arc<dyn EventQueue> = Arc::new(MemoryEventQueue::new(Duration::from_secs(60)));
    let telemetry = Arc::new(CountingTelemetry::default());
    let source = PollerSource {
        name: "flaky-ftp".to_string(),
        protocol: Protocol::Ftp,
        client: Arc::new(AlwaysFailsClient),
        root_path: "/remote/in".to_string(),
        host: Some("ftp.example.test".to_string()),
        port: Some(21),
        pattern: None,
        recursive: false,
        min_stable_seconds: 0,
        destination_path_hint: None,
        move_after_processing: false,
    };
    let poller = Poller::new(vec![source], queue.clone(), telemetry.clone(), 32);

    // `poll_once` enforces per-source backoff via an internal `next_poll_at`
    // gate. With paused tokio time we can actually drive the 5s/10s/20s
    // doubling schedule instead of only observing the first attempt:
    // calling `poll_once` again before the gate elapses is a no-op (no new
    // failure recorded), and advancing exactly past each gate unblocks the
    // next attempt.
    poller.poll_once().await;
    assert_eq!(telemetry.failures.load(Ordering::SeqCst), 1);
    assert_eq!(queue.depth().await.unwrap(), 0);

    poller.poll_once().await;
    assert_eq!(
        telemetry.failures.load(Ordering::SeqCst),
        1,
        "source is still backing off; no new attempt before next_poll_at"
    );

    tokio::time::advance(Duration::from_secs(5)).await;
    poller.poll_once().await;
    assert_eq!(telemetry.failures.load(Ordering::SeqCst), 2);

    tokio::time::advance(Duration::from_secs(5)).await;
    poller.poll_once().await;
    assert_eq!(
        telemetry.failures.load(Ordering::SeqCst),
        2,
        "backoff doubled to 10s after the second failure; 5s is not enough"
    );

    tokio::time::advance(Duration::from_secs(5)).await;
    poller.poll_once().await;
    assert_eq!(telemetry.failures.load(Ordering::SeqCst), 3);

    tokio::time::advance(Duration::from_secs(20)).await;
    poller.poll_once().await;
    assert_eq!(
        telemetry.failures.load(Ordering::SeqCst),
        4,
        "backoff doubled again to 20s after the third failure"
    );

    assert_eq!(queue.depth().await.unwrap(), 0, "a flaky source never emits an event");
}
