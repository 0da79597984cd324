//! Composition root.
//!
//! Loads configuration, resolves secrets, constructs protocol clients and
//! backends, and hands everything to `lifecycle::Runtime`. No business
//! logic lives here: this file only wires collaborators together the way
//! spec §9 asks ("a small composition root that selects implementations
//! from configuration at startup").

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use filehorizon::config::{
    FileDestinationConfig, FileSourceConfig, RemoteFileSourceConfig, RemoteProtocol, Role,
};
use filehorizon::content_sniffer::{ContentSniffer, MagicNumberSniffer, NoopSniffer};
use filehorizon::health::HealthState;
use filehorizon::idempotency::memory::MemoryIdempotencyStore;
use filehorizon::idempotency::redis::RedisIdempotencyStore;
use filehorizon::idempotency::IdempotencyStore;
use filehorizon::lifecycle::Runtime;
use filehorizon::orchestrator::{LoggingNotifier, Orchestrator};
use filehorizon::poller::{Poller, PollerSource};
use filehorizon::protocol::ftp::FtpClient;
use filehorizon::protocol::local::LocalFileClient;
use filehorizon::protocol::sftp::SftpClient;
use filehorizon::protocol::ProtocolClient;
use filehorizon::queue::memory::MemoryEventQueue;
use filehorizon::queue::redis_stream::RedisStreamQueue;
use filehorizon::queue::EventQueue;
use filehorizon::secrets::{EnvSecretResolver, SecretResolver};
use filehorizon::sinks::local_fs::LocalFsSink;
use filehorizon::sinks::object_store_sink::ObjectStoreSink;
use filehorizon::sinks::publisher::FileContentPublisher;
use filehorizon::sinks::sftp_sink::SftpSink;
use filehorizon::sinks::Sink;
use filehorizon::telemetry::{MetricsTelemetry, Telemetry};
use filehorizon::validator::StructuralValidator;
use filehorizon::{FileHorizonConfig, FileHorizonError, FileHorizonResult};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(err) = run().await {
        tracing::error!(error = %err, code = err.code(), "startup failed");
        std::process::exit(1);
    }
}

async fn run() -> FileHorizonResult<()> {
    let config = FileHorizonConfig::load()?;
    let secrets = EnvSecretResolver;
    let health_state = HealthState::new();

    let source_clients = build_source_clients(&config, &secrets)?;

    let (queue, queue_connected): (Arc<dyn EventQueue>, bool) = build_queue(&config).await;
    health_state.set_queue_connected(queue_connected);

    let idempotency: Arc<dyn IdempotencyStore> = if config.redis.enabled && queue_connected {
        match RedisIdempotencyStore::connect(&config.redis.connection_string, "filehorizon:idempotency").await {
            Ok(store) => Arc::new(store),
            Err(err) => {
                tracing::warn!(error = %err, "idempotency store falling back to in-memory");
                Arc::new(MemoryIdempotencyStore::new())
            }
        }
    } else {
        Arc::new(MemoryIdempotencyStore::new())
    };

    let telemetry: Arc<dyn Telemetry> = Arc::new(MetricsTelemetry);
    let _content_sniffer: Arc<dyn ContentSniffer> = if config.content_detection.enable_xml || config.content_detection.enable_edifact {
        Arc::new(MagicNumberSniffer::new(&config.content_detection))
    } else {
        Arc::new(NoopSniffer)
    };

    let poller = if matches!(config.pipeline.role, Role::Poller | Role::All) {
        Some(Arc::new(build_poller(
            &config,
            &source_clients,
            queue.clone(),
            telemetry.clone(),
        )))
    } else {
        None
    };

    let orchestrator = if matches!(config.pipeline.role, Role::Worker | Role::All) {
        let sinks = build_sinks(&config, &secrets).await?;
        Some(Arc::new(Orchestrator::new(
            queue.clone(),
            Arc::new(StructuralValidator),
            idempotency.clone(),
            config.idempotency.ttl_seconds,
            config.routing.rules.clone(),
            config.file_destinations.clone(),
            sinks,
            source_clients.clone(),
            config.transfer.retry.clone(),
            telemetry.clone(),
            Arc::new(LoggingNotifier),
            config.fail_pipeline_on_notify_failure,
        )))
    } else {
        None
    };

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown_signal.cancel();
    });

    let runtime = Runtime {
        config,
        poller,
        orchestrator,
        health_state,
    };
    runtime.run(shutdown, Duration::from_secs(30)).await;
    Ok(())
}

fn build_source_clients(
    config: &FileHorizonConfig,
    secrets: &dyn SecretResolver,
) -> FileHorizonResult<HashMap<String, Arc<dyn ProtocolClient>>> {
    let mut clients: HashMap<String, Arc<dyn ProtocolClient>> = HashMap::new();

    if config.pipeline_features.enable_local_poller || config.pipeline_features.enable_file_transfer {
        for source in &config.file_sources {
            clients.insert(source.name.clone(), Arc::new(LocalFileClient::new()));
        }
    }

    for source in &config.remote_file_sources {
        let enabled = match source.protocol {
            RemoteProtocol::Ftp => config.pipeline_features.enable_ftp_poller,
            RemoteProtocol::Sftp => config.pipeline_features.enable_sftp_poller,
        };
        if !enabled {
            continue;
        }

        let credential = match &source.credential_secret_ref {
            Some(reference) => secrets.resolve(reference)?,
            None => {
                return Err(FileHorizonError::Configuration {
                    field: format!("RemoteFileSources[{}].CredentialSecretRef", source.name),
                    message: "required for remote sources".to_string(),
                })
            }
        };

        let client: Arc<dyn ProtocolClient> = match source.protocol {
            RemoteProtocol::Ftp => Arc::new(FtpClient::new(source.host.clone(), source.port, credential)),
            RemoteProtocol::Sftp => Arc::new(SftpClient::new(source.host.clone(), source.port, credential)),
        };
        clients.insert(source.name.clone(), client);
    }

    Ok(clients)
}

async fn build_queue(config: &FileHorizonConfig) -> (Arc<dyn EventQueue>, bool) {
    if !config.redis.enabled {
        return (Arc::new(MemoryEventQueue::default()), false);
    }

    match RedisStreamQueue::connect(
        &config.redis.connection_string,
        config.redis.stream_name.clone(),
        config.redis.consumer_group.clone(),
        config.redis.dead_letter_stream.clone(),
        (config.redis.visibility_timeout_seconds * 1000) as usize,
    )
    .await
    {
        Ok(queue) => (Arc::new(queue), true),
        Err(err) => {
            tracing::warn!(error = %err, "redis queue unavailable at startup, falling back to in-memory queue");
            (
                Arc::new(MemoryEventQueue::new(Duration::from_secs(
                    config.redis.visibility_timeout_seconds,
                ))),
                false,
            )
        }
    }
}

fn build_poller(
    config: &FileHorizonConfig,
    source_clients: &HashMap<String, Arc<dyn ProtocolClient>>,
    queue: Arc<dyn EventQueue>,
    telemetry: Arc<dyn Telemetry>,
) -> Poller {
    let mut sources = Vec::new();

    if config.pipeline_features.enable_local_poller {
        for source in &config.file_sources {
            if let Some(client) = source_clients.get(&source.name) {
                sources.push(local_poller_source(source, client.clone()));
            }
        }
    }

    for source in &config.remote_file_sources {
        let enabled = match source.protocol {
            RemoteProtocol::Ftp => config.pipeline_features.enable_ftp_poller,
            RemoteProtocol::Sftp => config.pipeline_features.enable_sftp_poller,
        };
        if !enabled {
            continue;
        }
        if let Some(client) = source_clients.get(&source.name) {
            sources.push(remote_poller_source(source, client.clone()));
        }
    }

    Poller::new(sources, queue, telemetry, config.polling.batch_read_limit)
}

fn local_poller_source(source: &FileSourceConfig, client: Arc<dyn ProtocolClient>) -> PollerSource {
    PollerSource {
        name: source.name.clone(),
        protocol: filehorizon::model::Protocol::Local,
        client,
        root_path: source.path.clone(),
        host: None,
        port: None,
        pattern: source.pattern.clone(),
        recursive: source.recursive,
        min_stable_seconds: source.min_stable_seconds,
        destination_path_hint: source.destination_path.clone(),
        move_after_processing: source.move_after_processing,
    }
}

fn remote_poller_source(source: &RemoteFileSourceConfig, client: Arc<dyn ProtocolClient>) -> PollerSource {
    let protocol = match source.protocol {
        RemoteProtocol::Ftp => filehorizon::model::Protocol::Ftp,
        RemoteProtocol::Sftp => filehorizon::model::Protocol::Sftp,
    };
    PollerSource {
        name: source.name.clone(),
        protocol,
        client,
        root_path: source.path.clone(),
        host: Some(source.host.clone()),
        port: Some(source.port),
        pattern: source.pattern.clone(),
        recursive: source.recursive,
        min_stable_seconds: source.min_stable_seconds,
        destination_path_hint: None,
        move_after_processing: false,
    }
}

async fn build_sinks(
    config: &FileHorizonConfig,
    secrets: &dyn SecretResolver,
) -> FileHorizonResult<HashMap<String, Arc<dyn Sink>>> {
    let mut sinks: HashMap<String, Arc<dyn Sink>> = HashMap::new();

    for destination in &config.file_destinations {
        let sink: Arc<dyn Sink> = match destination.r#type {
            filehorizon::config::DestinationType::Local => Arc::new(LocalFsSink),
            filehorizon::config::DestinationType::ObjectStore => {
                Arc::new(ObjectStoreSink::from_url(&destination.target)?)
            }
            filehorizon::config::DestinationType::Sftp => {
                Arc::new(sftp_destination_sink(destination, secrets)?)
            }
            filehorizon::config::DestinationType::MessageBus => {
                Arc::new(FileContentPublisher::connect(&config.redis.connection_string, destination.target.clone()).await?)
            }
        };
        sinks.insert(destination.name.clone(), sink);
    }

    Ok(sinks)
}

fn sftp_destination_sink(
    destination: &FileDestinationConfig,
    secrets: &dyn SecretResolver,
) -> FileHorizonResult<SftpSink> {
    let url = url::Url::parse(&destination.target).map_err(|e| FileHorizonError::Configuration {
        field: format!("FileDestinations[{}].Target", destination.name),
        message: format!("invalid sftp URL: {e}"),
    })?;
    let host = url
        .host_str()
        .ok_or_else(|| FileHorizonError::Configuration {
            field: format!("FileDestinations[{}].Target", destination.name),
            message: "sftp URL is missing a host".to_string(),
        })?
        .to_string();
    let port = url.port().unwrap_or(22);
    let reference = destination
        .options
        .credential_secret_ref
        .as_ref()
        .ok_or_else(|| FileHorizonError::Configuration {
            field: format!("FileDestinations[{}].Options.CredentialSecretRef", destination.name),
            message: "required for sftp destinations".to_string(),
        })?;
    let credential = secrets.resolve(reference)?;
    Ok(SftpSink::new(SftpClient::new(host, port, credential)))
}
