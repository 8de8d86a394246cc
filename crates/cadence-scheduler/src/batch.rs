//! Batch — one target worked by a fixed set of workers.

use tracing::debug;

use cadence_core::{
    CadenceConfig, OpProfiles, TargetProvider, TargetState, WorkerConfig, WorkerInventory,
    WorkerSnapshot,
};

use crate::error::{BatchError, BatchResult};

/// Consistent view of the target and every worker, taken once per wave.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub target: TargetState,
    pub workers: Vec<WorkerSnapshot>,
}

/// A named batch: exactly one target and a non-empty worker set.
#[derive(Debug, Clone)]
pub struct Batch {
    name: String,
    target: String,
    extraction_fraction: f64,
    workers: Vec<WorkerConfig>,
    profiles: OpProfiles,
}

impl Batch {
    /// Create a batch. Fails if `workers` is empty.
    pub fn new(
        name: &str,
        target: &str,
        extraction_fraction: f64,
        workers: Vec<WorkerConfig>,
        profiles: OpProfiles,
    ) -> BatchResult<Self> {
        if workers.is_empty() {
            return Err(BatchError::NoWorkers(name.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            target: target.to_string(),
            extraction_fraction,
            workers,
            profiles,
        })
    }

    pub fn from_config(config: &CadenceConfig) -> BatchResult<Self> {
        Self::new(
            &config.batch.name,
            &config.batch.target,
            config.batch.extraction_fraction,
            config.workers.clone(),
            config.operations.clone(),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn workers(&self) -> &[WorkerConfig] {
        &self.workers
    }

    pub fn profiles(&self) -> &OpProfiles {
        &self.profiles
    }

    /// Query the collaborators for fresh target and worker figures.
    pub fn snapshot(
        &self,
        targets: &dyn TargetProvider,
        inventory: &dyn WorkerInventory,
    ) -> BatchResult<Snapshot> {
        let metrics = targets.target(&self.target)?;
        let target = TargetState::from_metrics(&self.target, metrics, self.extraction_fraction)?;

        let workers = self
            .workers
            .iter()
            .map(|w| -> BatchResult<WorkerSnapshot> {
                let capacity = inventory.worker(&w.name)?;
                Ok(WorkerSnapshot::from_capacity(
                    &w.name,
                    capacity,
                    w.reserved_memory,
                    &self.profiles,
                )?)
            })
            .collect::<BatchResult<Vec<_>>>()?;

        debug!(
            batch = %self.name,
            target = %target.name,
            hardening = target.hardening,
            resource = target.resource_available,
            workers = workers.len(),
            "snapshot taken"
        );
        Ok(Snapshot { target, workers })
    }
}
