//! Closed-form operation formulas of the simulated world.
//!
//! ```text
//! bonus(p)        = 1 + (p - 1) / 16
//! weaken(t, p)    = t · w · bonus(p)
//! grow rate(p)    = 1 + g · bonus(p)            resource' = (r + t) · rate^t
//! hack fraction   = h · (100 - hardening) / 100
//! hack time       = k · hardening;  grow = 3.2 × hack;  weaken = 4 × hack
//! ```

use std::time::Duration;

use cadence_core::{OpKind, OperationOracle, TargetState};

use crate::config::SimModel;

/// Oracle backed by `SimModel`. The simulated world applies effects with
/// the same formulas it reports here.
#[derive(Debug, Clone)]
pub struct SimOracle {
    model: SimModel,
}

impl SimOracle {
    pub fn new(model: SimModel) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &SimModel {
        &self.model
    }

    pub fn grow_rate(&self, parallelism: u32) -> f64 {
        1.0 + self.model.growth_per_thread * core_bonus(parallelism)
    }

    /// Duration of `kind` at `hardening`, whole milliseconds.
    pub fn duration_at(&self, hardening: f64, kind: OpKind) -> Duration {
        let hack_ms = (self.model.hack_ms_per_hardening * hardening).round().max(1.0);
        let ms = match kind {
            OpKind::Hack => hack_ms,
            OpKind::Grow => (hack_ms * 3.2).round(),
            OpKind::Weaken => hack_ms * 4.0,
        };
        Duration::from_millis(ms as u64)
    }

    pub fn hack_fraction_at(&self, hardening: f64) -> f64 {
        (self.model.hack_fraction_per_thread * (100.0 - hardening) / 100.0).max(0.0)
    }
}

fn core_bonus(parallelism: u32) -> f64 {
    1.0 + f64::from(parallelism.saturating_sub(1)) / 16.0
}

impl OperationOracle for SimOracle {
    fn duration(&self, target: &TargetState, kind: OpKind) -> Duration {
        self.duration_at(target.hardening, kind)
    }

    fn weaken_effect(&self, threads: u32, parallelism: u32) -> f64 {
        f64::from(threads) * self.model.weaken_per_thread * core_bonus(parallelism)
    }

    fn grow_threads(&self, _target: &TargetState, multiplier: f64, parallelism: u32) -> f64 {
        multiplier.max(1.0).ln() / self.grow_rate(parallelism).ln()
    }

    fn grow_hardening(&self, threads: u32, _parallelism: u32) -> f64 {
        f64::from(threads) * self.model.grow_hardening_per_thread
    }

    fn hack_fraction(&self, target: &TargetState) -> f64 {
        self.hack_fraction_at(target.hardening)
    }

    fn hack_hardening(&self, threads: u32) -> f64 {
        f64::from(threads) * self.model.hack_hardening_per_thread
    }
}
