//! cadence-core — shared types for the batch scheduler.
//!
//! Holds the snapshots the scheduler plans against (`TargetState`,
//! `WorkerSnapshot`), the per-operation tables, the contracts of the
//! external collaborators, and the `cadence.toml` config.

pub mod config;
pub mod provider;
pub mod types;

pub use config::{BatchConfig, CadenceConfig, WorkerConfig};
pub use provider::{
    BoxFuture, Clock, ExecHandle, ExecutionSink, LaunchError, LaunchRequest, OperationOracle,
    TargetMetrics, TargetProvider, WorkerCapacity, WorkerInventory,
};
pub use types::*;
