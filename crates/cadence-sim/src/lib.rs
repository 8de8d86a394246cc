//! cadence-sim — an in-process world to schedule against.
//!
//! `SimWorld` implements every collaborator contract (`WorkerInventory`,
//! `TargetProvider`, `OperationOracle`, `ExecutionSink`) over tokio time,
//! so the controller can be driven end to end without remote workers.
//! Under `tokio::time::pause` a full harden / saturate / steady-state run
//! completes instantly and deterministically.

pub mod config;
pub mod model;
pub mod world;

pub use config::{SimConfig, SimModel, SimTargetConfig, SimWorkerConfig};
pub use model::SimOracle;
pub use world::SimWorld;
