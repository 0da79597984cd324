//! FileHorizon — a multi-protocol file-movement pipeline.
//!
//! Discovers files across local, FTP and SFTP sources, waits for them to
//! become stable, and routes them to one or more destinations (local
//! filesystem, object storage, SFTP, message bus) with at-least-once
//! delivery and idempotent re-processing. Runs as a poller, a worker, or
//! both in the same process, so a deployment can scale discovery and
//! transfer independently.

pub mod config;
pub mod content_sniffer;
pub mod error;
pub mod health;
pub mod idempotency;
pub mod lifecycle;
pub mod model;
pub mod orchestrator;
pub mod poller;
pub mod protocol;
pub mod queue;
pub mod readiness;
pub mod router;
pub mod secrets;
pub mod sinks;
pub mod telemetry;
pub mod validator;

pub use config::FileHorizonConfig;
pub use error::{FileHorizonError, FileHorizonResult};
