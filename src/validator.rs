//! Event validation.
//!
//! Runs before routing so that a malformed event never reaches a sink.
//! Failures here are always `Validation` errors, which spec §7 classifies
//! as surfaced event failures, never silent drops.

use chrono::{Duration, Utc};

use crate::error::{FileHorizonError, FileHorizonResult};
use crate::model::FileEvent;

pub trait EventValidator: Send + Sync {
    fn validate(&self, event: &FileEvent) -> FileHorizonResult<()>;
}

/// Clock skew tolerance for `lastModifiedUtc` (spec §4.5: "far future" means
/// further ahead than this past `now`).
const MAX_FUTURE_SKEW: Duration = Duration::minutes(5);

/// Structural checks every event must satisfy regardless of source.
pub struct StructuralValidator;

impl EventValidator for StructuralValidator {
    fn validate(&self, event: &FileEvent) -> FileHorizonResult<()> {
        if event.id.is_nil() {
            return Err(FileHorizonError::Validation {
                field: "id".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        if event.metadata.source_path.trim().is_empty() {
            return Err(FileHorizonError::Validation {
                field: "metadata.source_path".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        if std::path::Path::new(&event.metadata.source_path)
            .file_name()
            .is_none()
        {
            return Err(FileHorizonError::Validation {
                field: "metadata.source_path".to_string(),
                reason: "must name a file".to_string(),
            });
        }

        if event.metadata.size == 0 {
            return Err(FileHorizonError::Validation {
                field: "metadata.size".to_string(),
                reason: "zero-byte files are not processed".to_string(),
            });
        }

        if event.metadata.last_mod_utc > Utc::now() + MAX_FUTURE_SKEW {
            return Err(FileHorizonError::Validation {
                field: "metadata.last_mod_utc".to_string(),
                reason: "must not be in the far future".to_string(),
            });
        }

        Ok(())
    }
}
