//! Operation cost model.
//!
//! Turns (target state, worker parallelism, thread count) into thread
//! counts, hardening deltas and durations. The numeric formulas live behind
//! the `OperationOracle`; this module only rounds, clamps and signs them.

use std::time::Duration;

use cadence_core::{OpKind, OperationOracle, TargetState};

/// Thread plan for extracting a fraction of the target's maximum resource.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HackPlan {
    pub threads: u32,
    /// Hardening the hack adds (positive).
    pub hardening_delta: f64,
    /// Resource the hack removes.
    pub resource_delta: f64,
    /// Growth factor that restores the resource afterwards.
    pub multiplier: f64,
}

/// Cost model bound to an oracle.
#[derive(Clone, Copy)]
pub struct CostModel<'a> {
    oracle: &'a dyn OperationOracle,
}

impl<'a> CostModel<'a> {
    pub fn new(oracle: &'a dyn OperationOracle) -> Self {
        Self { oracle }
    }

    /// Hardening delta of `threads` weaken threads. Always `<= 0`.
    pub fn weaken_effect(&self, threads: u32, parallelism: u32) -> f64 {
        -self.oracle.weaken_effect(threads, parallelism).abs()
    }

    /// Hardening one weaken thread removes (magnitude).
    pub fn weaken_per_thread(&self, parallelism: u32) -> f64 {
        self.oracle.weaken_effect(1, parallelism).abs()
    }

    /// Grow threads that multiply the target's resource by `multiplier`.
    /// Never less than one.
    pub fn grow_threads(&self, target: &TargetState, multiplier: f64, parallelism: u32) -> u32 {
        let raw = self.oracle.grow_threads(target, multiplier.max(1.0), parallelism);
        clamp_threads(raw.ceil())
    }

    /// Hardening added by `threads` grow threads. Always `>= 0`.
    pub fn grow_security_delta(&self, threads: u32, parallelism: u32) -> f64 {
        self.oracle.grow_hardening(threads, parallelism).abs()
    }

    /// Hack threads sized to extract `fraction` of the target's maximum.
    pub fn hack_threads(&self, target: &TargetState, fraction: f64) -> HackPlan {
        let per_thread = self.oracle.hack_fraction(target);
        let threads = if per_thread > 0.0 {
            clamp_threads((fraction / per_thread).floor())
        } else {
            1
        };

        let extracted = (per_thread.max(0.0) * f64::from(threads)).min(1.0);
        let resource_delta = target.resource_max * extracted;
        let remaining = (target.resource_max - resource_delta).max(1.0);
        let multiplier = (target.resource_max / remaining).max(1.0);

        HackPlan {
            threads,
            hardening_delta: self.oracle.hack_hardening(threads).abs(),
            resource_delta,
            multiplier,
        }
    }

    pub fn duration(&self, target: &TargetState, kind: OpKind) -> Duration {
        self.oracle.duration(target, kind)
    }
}

/// Weaken threads needed to offset `increase` hardening. Ceiling division,
/// never less than one.
pub fn compensation_threads(increase: f64, weaken_per_thread: f64) -> u32 {
    if weaken_per_thread <= 0.0 {
        return 1;
    }
    clamp_threads((increase.abs() / weaken_per_thread).ceil())
}

fn clamp_threads(raw: f64) -> u32 {
    if raw.is_nan() || raw < 1.0 {
        1
    } else if raw >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        raw as u32
    }
}
