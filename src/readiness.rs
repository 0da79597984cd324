//! Size-stability readiness policy.
//!
//! A file is ready to be queued once its size has not changed for
//! `min_stable_seconds`. Any size change resets the stability clock (spec
//! §4.2), so a file being actively appended to is never prematurely queued.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::model::{FileAttributes, FileObservationSnapshot};

/// Decides whether an observed file is ready to be emitted as an event.
pub trait ReadinessChecker: Send + Sync {
    fn is_ready(&self, snapshot: &FileObservationSnapshot, now: DateTime<Utc>) -> bool;
}

/// The only readiness policy spec §4.2 names: stable size for N seconds.
pub struct SizeStabilityChecker {
    pub min_stable: Duration,
}

impl SizeStabilityChecker {
    pub fn new(min_stable_seconds: u64) -> Self {
        Self {
            min_stable: Duration::from_secs(min_stable_seconds),
        }
    }
}

impl ReadinessChecker for SizeStabilityChecker {
    fn is_ready(&self, snapshot: &FileObservationSnapshot, now: DateTime<Utc>) -> bool {
        // §4.2: a file is only ready once size has been observed unchanged
        // across at least two polls; a lone first sighting is never ready,
        // even with MinStableSeconds == 0.
        snapshot.observation_count >= 2 && snapshot.stable_for(now) >= self.min_stable
    }
}

/// Folds a new observation into `existing` (or starts tracking it), returning
/// the updated snapshot. Pure function so the poller's map update and the
/// readiness check can be unit tested independently of any I/O.
pub fn observe(
    existing: Option<FileObservationSnapshot>,
    attrs: &FileAttributes,
    now: DateTime<Utc>,
) -> FileObservationSnapshot {
    match existing {
        Some(mut snapshot) => {
            snapshot.observe(attrs, now);
            snapshot
        }
        None => FileObservationSnapshot::first(attrs, now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_ready_until_min_stable_elapsed() {
        let t0 = Utc::now();
        let attrs = FileAttributes {
            size: 10,
            last_write_utc: t0,
            hash: None,
        };
        let snapshot = observe(None, &attrs, t0);
        let snapshot = observe(Some(snapshot), &attrs, t0 + chrono::Duration::seconds(1));
        let checker = SizeStabilityChecker::new(5);
        assert!(!checker.is_ready(&snapshot, t0 + chrono::Duration::seconds(2)));
        assert!(checker.is_ready(&snapshot, t0 + chrono::Duration::seconds(5)));
    }

    #[test]
    fn first_observation_is_never_ready_even_with_zero_min_stable() {
        let t0 = Utc::now();
        let attrs = FileAttributes {
            size: 10,
            last_write_utc: t0,
            hash: None,
        };
        let snapshot = observe(None, &attrs, t0);
        let checker = SizeStabilityChecker::new(0);
        assert!(!checker.is_ready(&snapshot, t0));

        let snapshot = observe(Some(snapshot), &attrs, t0);
        assert!(checker.is_ready(&snapshot, t0));
    }

    #[test]
    fn size_change_resets_stability_window() {
        let t0 = Utc::now();
        let attrs = FileAttributes {
            size: 10,
            last_write_utc: t0,
            hash: None,
        };
        let snapshot = observe(None, &attrs, t0);
        let t1 = t0 + chrono::Duration::seconds(10);
        let grown = FileAttributes {
            size: 20,
            last_write_utc: t1,
            hash: None,
        };
        let snapshot = observe(Some(snapshot), &grown, t1);
        let checker = SizeStabilityChecker::new(5);
        assert!(!checker.is_ready(&snapshot, t1 + chrono::Duration::seconds(2)));
    }
}
