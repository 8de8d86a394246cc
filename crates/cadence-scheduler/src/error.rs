//! Scheduler error types.

use std::time::Duration;

use thiserror::Error;

use cadence_core::{LaunchError, SnapshotError};

/// Errors that abort a wave. None of them are retried inside the wave.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("batch {0} has no workers")]
    NoWorkers(String),

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(#[from] SnapshotError),

    #[error("insufficient resource capacity on {scope}: {required:.2} required, {available:.2} available")]
    Capacity {
        scope: String,
        required: f64,
        available: f64,
    },

    #[error("dispatch of job {job} on {worker} failed: {source}")]
    Dispatch {
        job: String,
        worker: String,
        #[source]
        source: LaunchError,
    },

    #[error("job {0} was already dispatched")]
    AlreadyDispatched(String),

    #[error("cycle timing invariant violated: {slot} lands {actual:?} after its predecessor, expected {expected:?}")]
    TimingViolation {
        slot: &'static str,
        actual: Duration,
        expected: Duration,
    },

    #[error("{threads} weaken threads remove {removed:.4} hardening but {increase:.4} is added")]
    CompensationShortfall {
        threads: u32,
        removed: f64,
        increase: f64,
    },

    #[error("provider error: {0}")]
    Provider(#[from] anyhow::Error),
}

impl BatchError {
    /// Capacity and timing failures leave the system untouched and are safe
    /// to retry next wave with a fresh snapshot.
    pub fn is_pre_dispatch(&self) -> bool {
        matches!(
            self,
            BatchError::NoWorkers(_)
                | BatchError::InvalidSnapshot(_)
                | BatchError::Capacity { .. }
                | BatchError::TimingViolation { .. }
                | BatchError::CompensationShortfall { .. }
        )
    }
}

pub type BatchResult<T> = Result<T, BatchError>;
