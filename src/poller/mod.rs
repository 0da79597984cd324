//! Per-source discovery loop.
//!
//! One `PollerSource` per configured local or remote source, driven by a
//! single sequential dispatcher (spec §5: "a Poller process runs a single
//! polling loop ... it may run multiple sources sequentially (v1)"). Feature
//! flags and credential resolution happen at construction time in the
//! composition root; this module only ever sees sources it should poll.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use lru::LruCache;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::FileHorizonResult;
use crate::model::{FileEvent, FileObservationSnapshot, FileReference, Protocol};
use crate::protocol::ProtocolClient;
use crate::queue::EventQueue;
use crate::readiness::{observe, ReadinessChecker, SizeStabilityChecker};
use crate::router::glob_match;
use crate::telemetry::Telemetry;

const EMITTED_SET_CAPACITY: usize = 10_000;
const BACKOFF_BASE: Duration = Duration::from_secs(5);
const BACKOFF_CAP: Duration = Duration::from_secs(300);
/// An identity not seen in this many consecutive polls is evicted from the
/// emitted set (spec §4.3: "evicted ... by absence on two consecutive
/// polls").
const EMITTED_ABSENCE_LIMIT: u32 = 2;

/// One discovery source: a root to list, the client that lists it, and the
/// readiness/identity parameters that apply to everything found under it.
pub struct PollerSource {
    pub name: String,
    pub protocol: Protocol,
    pub client: Arc<dyn ProtocolClient>,
    pub root_path: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub pattern: Option<String>,
    pub recursive: bool,
    pub min_stable_seconds: u64,
    pub destination_path_hint: Option<String>,
    pub move_after_processing: bool,
}

struct SourceState {
    snapshots: HashMap<String, FileObservationSnapshot>,
    emitted: LruCache<String, u32>,
    poll_count: u32,
    backoff: Duration,
    next_poll_at: Instant,
}

impl SourceState {
    fn new() -> Self {
        Self {
            snapshots: HashMap::new(),
            emitted: LruCache::new(NonZeroUsize::new(EMITTED_SET_CAPACITY).unwrap()),
            poll_count: 0,
            backoff: BACKOFF_BASE,
            next_poll_at: Instant::now(),
        }
    }
}

pub struct Poller {
    sources: Vec<PollerSource>,
    queue: Arc<dyn EventQueue>,
    telemetry: Arc<dyn Telemetry>,
    batch_read_limit: usize,
    state: Mutex<HashMap<String, SourceState>>,
}

impl Poller {
    pub fn new(
        sources: Vec<PollerSource>,
        queue: Arc<dyn EventQueue>,
        telemetry: Arc<dyn Telemetry>,
        batch_read_limit: usize,
    ) -> Self {
        let state = sources
            .iter()
            .map(|source| (source.name.clone(), SourceState::new()))
            .collect();
        Self {
            sources,
            queue,
            telemetry,
            batch_read_limit,
            state: Mutex::new(state),
        }
    }

    /// Poll every configured source once, in order. Per-source errors are
    /// recorded and turned into backoff; they never abort the remaining
    /// sources in the same pass.
    pub async fn poll_once(&self) {
        for source in &self.sources {
            let eligible = {
                let state = self.state.lock().await;
                state
                    .get(&source.name)
                    .map(|s| Instant::now() >= s.next_poll_at)
                    .unwrap_or(true)
            };
            if !eligible {
                continue;
            }

            match self.poll_source(source).await {
                Ok(()) => {
                    let mut state = self.state.lock().await;
                    if let Some(s) = state.get_mut(&source.name) {
                        s.backoff = BACKOFF_BASE;
                        s.next_poll_at = Instant::now();
                    }
                }
                Err(err) => {
                    tracing::warn!(source = %source.name, error = %err, "poll failed");
                    self.telemetry.event_failed(err.code());
                    let mut state = self.state.lock().await;
                    if let Some(s) = state.get_mut(&source.name) {
                        s.next_poll_at = Instant::now() + s.backoff;
                        s.backoff = (s.backoff * 2).min(BACKOFF_CAP);
                    }
                }
            }
        }
    }

    async fn poll_source(&self, source: &PollerSource) -> FileHorizonResult<()> {
        let entries = list_recursive(
            source.client.as_ref(),
            &source.root_path,
            source.recursive,
            self.batch_read_limit,
        )
        .await?;

        let mut state = self.state.lock().await;
        let source_state = state
            .entry(source.name.clone())
            .or_insert_with(SourceState::new);
        source_state.poll_count += 1;
        let poll_count = source_state.poll_count;
        let checker = SizeStabilityChecker::new(source.min_stable_seconds);
        let now = Utc::now();

        for entry in entries {
            if let Some(pattern) = &source.pattern {
                let name = std::path::Path::new(&entry.path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                if !glob_match(pattern, &name) {
                    continue;
                }
            }

            let mut reference = FileReference::new(source.protocol, entry.path.clone());
            reference.host = source.host.clone();
            reference.port = source.port;
            reference.source_name = Some(source.name.clone());
            let identity_key = reference.identity_key();

            if let Some(last_seen) = source_state.emitted.get_mut(&identity_key) {
                *last_seen = poll_count;
                continue;
            }

            self.telemetry.file_discovered(&source.name);

            let attrs = crate::model::FileAttributes {
                size: entry.size,
                last_write_utc: entry.modified_utc.unwrap_or(now),
                hash: None,
            };

            let snapshot = observe(source_state.snapshots.remove(&identity_key), &attrs, now);
            let ready = checker.is_ready(&snapshot, now);

            if !ready {
                source_state.snapshots.insert(identity_key, snapshot);
                continue;
            }

            let event = FileEvent::new(&reference, &attrs, source.move_after_processing);
            self.queue.enqueue(&event).await?;
            self.telemetry.event_enqueued(&source.name);

            source_state.emitted.put(identity_key, poll_count);
        }

        let stale: Vec<String> = source_state
            .emitted
            .iter()
            .filter(|(_, last_seen)| poll_count.saturating_sub(**last_seen) >= EMITTED_ABSENCE_LIMIT)
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            source_state.emitted.pop(&key);
        }

        Ok(())
    }
}

async fn list_recursive(
    client: &dyn ProtocolClient,
    root: &str,
    recursive: bool,
    limit: usize,
) -> FileHorizonResult<Vec<crate::protocol::RemoteFileInfo>> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_string()];

    while let Some(dir) = stack.pop() {
        let entries = client.list(&dir).await?;
        for entry in entries {
            if entry.is_dir {
                if recursive {
                    stack.push(entry.path.clone());
                }
                continue;
            }
            out.push(entry);
            if out.len() >= limit {
                return Ok(out);
            }
        }
    }
    Ok(out)
}
