//! `[simulation]` table: starting figures of the simulated world.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    pub target: SimTargetConfig,
    pub workers: Vec<SimWorkerConfig>,
    #[serde(default)]
    pub model: SimModel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimTargetConfig {
    pub name: String,
    pub hardening: f64,
    pub hardening_floor: f64,
    pub resource_available: f64,
    pub resource_max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimWorkerConfig {
    pub name: String,
    pub total_memory: f64,
    #[serde(default)]
    pub used_memory: f64,
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
}

/// Numeric constants of the simulated operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimModel {
    /// Hardening one weaken thread removes at parallelism 1.
    pub weaken_per_thread: f64,
    /// Per-thread growth rate at parallelism 1: each thread multiplies the
    /// resource by `1 + growth_per_thread`.
    pub growth_per_thread: f64,
    pub grow_hardening_per_thread: f64,
    /// Fraction of the resource one hack thread takes at zero hardening.
    pub hack_fraction_per_thread: f64,
    pub hack_hardening_per_thread: f64,
    /// Hack duration per unit of hardening; grow and weaken scale from it.
    pub hack_ms_per_hardening: f64,
}

impl Default for SimModel {
    fn default() -> Self {
        Self {
            weaken_per_thread: 0.05,
            growth_per_thread: 0.03,
            grow_hardening_per_thread: 0.004,
            hack_fraction_per_thread: 0.002,
            hack_hardening_per_thread: 0.002,
            hack_ms_per_hardening: 2000.0,
        }
    }
}

fn default_parallelism() -> u32 {
    1
}

impl SimConfig {
    /// A single target with `hardening` 10 over a fresh pool of workers.
    pub fn scaffold(target: &str, workers: &[&str]) -> Self {
        SimConfig {
            target: SimTargetConfig {
                name: target.to_string(),
                hardening: 10.0,
                hardening_floor: 1.0,
                resource_available: 10_000.0,
                resource_max: 1_000_000.0,
            },
            workers: workers
                .iter()
                .map(|w| SimWorkerConfig {
                    name: w.to_string(),
                    total_memory: 512.0,
                    used_memory: 0.0,
                    parallelism: default_parallelism(),
                })
                .collect(),
            model: SimModel::default(),
        }
    }
}
