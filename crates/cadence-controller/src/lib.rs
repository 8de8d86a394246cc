//! cadence-controller — runs a batch against live collaborators.
//!
//! # Components
//!
//! - **`controller`** — Phase state machine, wave dispatch, wait loop
//! - **`clock`** — `Clock` on the tokio timer

pub mod clock;
pub mod controller;

pub use clock::TokioClock;
pub use controller::{BatchController, BatchPhase, Collaborators, ControllerSettings, RunSummary};
