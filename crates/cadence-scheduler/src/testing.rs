//! Fixed-number collaborators shared by the unit tests.

use std::time::Duration;

use cadence_core::*;

/// Oracle with linear, hardening-independent figures.
#[derive(Debug, Clone)]
pub struct FixedOracle {
    pub weaken_per_thread: f64,
    pub growth_per_thread: f64,
    pub grow_hardening_per_thread: f64,
    pub hack_fraction: f64,
    pub hack_hardening_per_thread: f64,
    pub durations: PerOp<Duration>,
}

impl Default for FixedOracle {
    fn default() -> Self {
        Self {
            weaken_per_thread: 0.05,
            growth_per_thread: 0.01,
            grow_hardening_per_thread: 0.004,
            hack_fraction: 0.002,
            hack_hardening_per_thread: 0.002,
            durations: PerOp {
                weaken: Duration::from_secs(40),
                grow: Duration::from_secs(32),
                hack: Duration::from_secs(10),
            },
        }
    }
}

fn core_bonus(parallelism: u32) -> f64 {
    1.0 + f64::from(parallelism.saturating_sub(1)) / 16.0
}

impl OperationOracle for FixedOracle {
    fn duration(&self, _target: &TargetState, kind: OpKind) -> Duration {
        self.durations[kind]
    }

    fn weaken_effect(&self, threads: u32, parallelism: u32) -> f64 {
        f64::from(threads) * self.weaken_per_thread * core_bonus(parallelism)
    }

    fn grow_threads(&self, _target: &TargetState, multiplier: f64, parallelism: u32) -> f64 {
        let rate = 1.0 + self.growth_per_thread * core_bonus(parallelism);
        multiplier.ln() / rate.ln()
    }

    fn grow_hardening(&self, threads: u32, _parallelism: u32) -> f64 {
        f64::from(threads) * self.grow_hardening_per_thread
    }

    fn hack_fraction(&self, _target: &TargetState) -> f64 {
        self.hack_fraction
    }

    fn hack_hardening(&self, threads: u32) -> f64 {
        f64::from(threads) * self.hack_hardening_per_thread
    }
}

pub fn test_target(hardening: f64, available: f64) -> TargetState {
    TargetState {
        name: "alpha".to_string(),
        hardening,
        hardening_floor: 1.0,
        resource_available: available,
        resource_max: 1_000_000.0,
        extraction_fraction: 0.5,
    }
}

pub fn test_worker(name: &str, total_memory: f64, parallelism: u32) -> WorkerSnapshot {
    WorkerSnapshot {
        name: name.to_string(),
        total_memory,
        used_memory: 0.0,
        reserved_memory: 0.0,
        parallelism,
        memory_per_thread: PerOp {
            weaken: 1.0,
            grow: 1.0,
            hack: 1.0,
        },
    }
}

pub fn test_profiles() -> OpProfiles {
    let profile = |executable: &str| OpProfile {
        executable: executable.to_string(),
        memory_per_thread: 1.0,
    };
    PerOp {
        weaken: profile("ops/weaken"),
        grow: profile("ops/grow"),
        hack: profile("ops/hack"),
    }
}
