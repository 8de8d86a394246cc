//! cadence-scheduler — cost model, jobs, and three-phase wave planning.
//!
//! Plans waves of remote operations against a single target so that their
//! completions land in a fixed order, one gap apart.
//!
//! # Components
//!
//! - **`batch`** — Target + worker set, fresh snapshots per wave
//! - **`cost`** — Thread counts and hardening deltas per operation
//! - **`timing`** — Start delays that align completions
//! - **`planner`** — HardenFloor / SaturateCeiling / SteadyState waves
//! - **`job`** — One scheduled operation: dispatch once, poll until gone

pub mod batch;
pub mod cost;
pub mod error;
pub mod job;
pub mod planner;
pub mod timing;

#[cfg(test)]
mod testing;

pub use batch::{Batch, Snapshot};
pub use cost::{CostModel, HackPlan, compensation_threads};
pub use error::{BatchError, BatchResult};
pub use job::{Job, JobState, JobStatus};
pub use planner::{CyclePlan, Phase, Planner, Wave};
pub use timing::{CycleTimings, PrepTiming, Slot, SlotTiming, align_prep};
