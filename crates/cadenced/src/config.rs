//! Daemon config: the batch config plus a `[simulation]` table.

use std::path::Path;

use serde::{Deserialize, Serialize};

use cadence_core::CadenceConfig;
use cadence_sim::SimConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(flatten)]
    pub cadence: CadenceConfig,
    pub simulation: SimConfig,
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DaemonConfig = toml::from_str(&content)?;
        config.cadence.validate()?;
        config.validate_simulation()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Every configured worker and the target must exist in the simulation.
    fn validate_simulation(&self) -> anyhow::Result<()> {
        if self.simulation.target.name != self.cadence.batch.target {
            anyhow::bail!(
                "simulation target {} does not match batch target {}",
                self.simulation.target.name,
                self.cadence.batch.target
            );
        }
        for worker in &self.cadence.workers {
            if !self.simulation.workers.iter().any(|w| w.name == worker.name) {
                anyhow::bail!("worker {} is missing from [simulation]", worker.name);
            }
        }
        Ok(())
    }

    pub fn scaffold(name: &str, target: &str, workers: &[&str]) -> Self {
        Self {
            cadence: CadenceConfig::scaffold(name, target, workers),
            simulation: SimConfig::scaffold(target, workers),
        }
    }
}
