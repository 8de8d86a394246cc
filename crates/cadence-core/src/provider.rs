//! Contracts of the external collaborators the scheduler consumes.
//!
//! ```text
//! WorkerInventory  ─┐
//! TargetProvider   ─┼─▶ snapshots ─▶ planner ─▶ ExecutionSink
//! OperationOracle  ─┘                    ▲
//!                                        └── Clock (wait loop)
//! ```
//!
//! All of these are in-process abstractions; implementations own any
//! I/O, caching or remote calls behind them.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{OpKind, TargetState};

/// Boxed future used by the object-safe async contracts.
pub type BoxFuture<'a, T = ()> =
    std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Raw worker figures as reported by the inventory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkerCapacity {
    pub total_memory: f64,
    pub used_memory: f64,
    pub parallelism: u32,
}

/// Raw target figures as reported by the target provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetMetrics {
    pub hardening: f64,
    pub hardening_floor: f64,
    pub resource_available: f64,
    pub resource_max: f64,
}

/// Reports per-worker capacity. Queried once per wave.
pub trait WorkerInventory: Send + Sync {
    fn worker(&self, name: &str) -> anyhow::Result<WorkerCapacity>;
}

/// Reports the target's metrics. Queried once per wave.
pub trait TargetProvider: Send + Sync {
    fn target(&self, name: &str) -> anyhow::Result<TargetMetrics>;
}

/// Numeric model of the operations against a target.
///
/// Hardening figures are magnitudes; the cost model applies the sign.
pub trait OperationOracle: Send + Sync {
    /// How long one `kind` operation against `target` runs right now.
    fn duration(&self, target: &TargetState, kind: OpKind) -> Duration;

    /// Hardening removed by `threads` weaken threads.
    fn weaken_effect(&self, threads: u32, parallelism: u32) -> f64;

    /// Threads (unrounded) needed to multiply the target's resource by
    /// `multiplier`.
    fn grow_threads(&self, target: &TargetState, multiplier: f64, parallelism: u32) -> f64;

    /// Hardening added by `threads` grow threads.
    fn grow_hardening(&self, threads: u32, parallelism: u32) -> f64;

    /// Fraction of the target's resource one hack thread extracts.
    fn hack_fraction(&self, target: &TargetState) -> f64;

    /// Hardening added by `threads` hack threads.
    fn hack_hardening(&self, threads: u32) -> f64;
}

/// Opaque handle of a launched operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecHandle(pub u64);

impl fmt::Display for ExecHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Everything the sink needs to launch one job.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchRequest<'a> {
    pub worker: &'a str,
    pub kind: OpKind,
    pub executable: &'a str,
    pub target: &'a str,
    pub threads: u32,
    /// The sink holds the operation back this long before it starts.
    pub start_delay: Duration,
}

/// Why the sink refused a launch.
#[derive(Debug, Error, PartialEq)]
pub enum LaunchError {
    #[error("worker {worker} has {available:.2} free memory, needs {needed:.2}")]
    InsufficientMemory {
        worker: String,
        needed: f64,
        available: f64,
    },

    #[error("unknown worker: {0}")]
    UnknownWorker(String),

    #[error("launch rejected: {0}")]
    Rejected(String),
}

/// Launches operations and reports their liveness.
///
/// Fire-and-forget: a handle that no longer resolves means the operation
/// finished. Success or failure of the operation itself is not observable.
pub trait ExecutionSink: Send + Sync {
    fn launch(&self, request: &LaunchRequest<'_>) -> Result<ExecHandle, LaunchError>;

    fn is_alive(&self, handle: ExecHandle) -> bool;

    /// Time the operation has been running, or `None` once it is gone.
    fn elapsed(&self, handle: ExecHandle) -> Option<Duration>;
}

/// Suspension primitive. Wakes after at least `duration`.
pub trait Clock: Send + Sync {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static>;
}
