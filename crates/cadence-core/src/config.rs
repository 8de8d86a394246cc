//! cadence.toml configuration parser.

use std::path::Path;
use std::time::Duration;

use anyhow::bail;
use serde::{Deserialize, Serialize};

use crate::types::{OpProfile, OpProfiles, PerOp};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CadenceConfig {
    pub batch: BatchConfig,
    pub operations: OpProfiles,
    pub workers: Vec<WorkerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    pub name: String,
    pub target: String,
    #[serde(default = "default_extraction_fraction")]
    pub extraction_fraction: f64,
    /// Gap between consecutive completions inside a cycle.
    #[serde(default = "default_interval_ms")]
    pub gap_ms: u64,
    /// How often the wait loop polls job liveness.
    #[serde(default = "default_interval_ms")]
    pub poll_interval_ms: u64,
    /// Pause between steady-state iterations.
    #[serde(default = "default_interval_ms")]
    pub settle_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub name: String,
    #[serde(default)]
    pub reserved_memory: f64,
}

fn default_extraction_fraction() -> f64 {
    0.5
}

fn default_interval_ms() -> u64 {
    1000
}

impl BatchConfig {
    pub fn gap(&self) -> Duration {
        Duration::from_millis(self.gap_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl CadenceConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: CadenceConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.workers.is_empty() {
            bail!("batch {} has no workers configured", self.batch.name);
        }
        let fraction = self.batch.extraction_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            bail!("extraction_fraction {fraction} must be in (0, 1]");
        }
        if self.batch.gap_ms == 0 {
            bail!("gap_ms must be positive");
        }
        if self.batch.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be positive");
        }
        for (name, profile) in [
            ("weaken", &self.operations.weaken),
            ("grow", &self.operations.grow),
            ("hack", &self.operations.hack),
        ] {
            if profile.memory_per_thread <= 0.0 {
                bail!("operations.{name}.memory_per_thread must be positive");
            }
        }
        if let Some(w) = self.workers.iter().find(|w| w.reserved_memory < 0.0) {
            bail!("worker {} has negative reserved_memory", w.name);
        }
        Ok(())
    }

    /// Scaffold a config for one target and a list of workers.
    pub fn scaffold(name: &str, target: &str, workers: &[&str]) -> Self {
        let profile = |executable: &str, memory_per_thread: f64| OpProfile {
            executable: executable.to_string(),
            memory_per_thread,
        };
        CadenceConfig {
            batch: BatchConfig {
                name: name.to_string(),
                target: target.to_string(),
                extraction_fraction: default_extraction_fraction(),
                gap_ms: default_interval_ms(),
                poll_interval_ms: default_interval_ms(),
                settle_ms: default_interval_ms(),
            },
            operations: PerOp {
                weaken: profile("ops/weaken", 1.75),
                grow: profile("ops/grow", 1.75),
                hack: profile("ops/hack", 1.7),
            },
            workers: workers
                .iter()
                .map(|w| WorkerConfig {
                    name: w.to_string(),
                    reserved_memory: 0.0,
                })
                .collect(),
        }
    }
}
