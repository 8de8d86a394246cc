//! Simulated target, workers, and execution sink over tokio time.
//!
//! Launched operations occupy worker memory from launch until they
//! finish at `launch + delay + duration`. Effects land on the target at
//! the finish instant, in finish order, the next time anyone looks at the
//! world. Under a paused tokio clock the whole simulation is deterministic.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::anyhow;
use tokio::time::Instant;
use tracing::{debug, trace};

use cadence_core::{
    ExecHandle, ExecutionSink, LaunchError, LaunchRequest, OpKind, OpProfiles, OperationOracle,
    PerOp, TargetMetrics, TargetProvider, WorkerCapacity, WorkerInventory,
};

use crate::config::SimConfig;
use crate::model::SimOracle;

#[derive(Debug, Clone)]
struct SimTarget {
    name: String,
    hardening: f64,
    hardening_floor: f64,
    resource_available: f64,
    resource_max: f64,
}

#[derive(Debug, Clone)]
struct SimWorker {
    total_memory: f64,
    used_memory: f64,
    parallelism: u32,
}

#[derive(Debug, Clone)]
struct SimExec {
    worker: String,
    kind: OpKind,
    threads: u32,
    memory: f64,
    launched_at: Instant,
    finishes_at: Instant,
}

#[derive(Debug, Default)]
struct WorldState {
    target: Option<SimTarget>,
    workers: HashMap<String, SimWorker>,
    running: HashMap<ExecHandle, SimExec>,
    next_handle: u64,
    launches: u64,
}

/// Every collaborator in one in-process world.
pub struct SimWorld {
    oracle: SimOracle,
    memory_per_thread: PerOp<f64>,
    state: Mutex<WorldState>,
}

impl SimWorld {
    pub fn new(config: &SimConfig, profiles: &OpProfiles) -> Self {
        let target = SimTarget {
            name: config.target.name.clone(),
            hardening: config.target.hardening,
            hardening_floor: config.target.hardening_floor,
            resource_available: config.target.resource_available,
            resource_max: config.target.resource_max,
        };
        let workers = config
            .workers
            .iter()
            .map(|w| {
                (
                    w.name.clone(),
                    SimWorker {
                        total_memory: w.total_memory,
                        used_memory: w.used_memory,
                        parallelism: w.parallelism,
                    },
                )
            })
            .collect();

        Self {
            oracle: SimOracle::new(config.model.clone()),
            memory_per_thread: profiles.map(|p| p.memory_per_thread),
            state: Mutex::new(WorldState {
                target: Some(target),
                workers,
                ..WorldState::default()
            }),
        }
    }

    pub fn oracle(&self) -> &SimOracle {
        &self.oracle
    }

    /// Total launches accepted so far.
    pub fn launches(&self) -> u64 {
        self.lock().launches
    }

    /// Operations not finished yet.
    pub fn running(&self) -> usize {
        self.settled().running.len()
    }

    /// Current target figures, after applying every finished operation.
    pub fn target_metrics(&self) -> Option<TargetMetrics> {
        self.settled().target.as_ref().map(|t| TargetMetrics {
            hardening: t.hardening,
            hardening_floor: t.hardening_floor,
            resource_available: t.resource_available,
            resource_max: t.resource_max,
        })
    }

    fn lock(&self) -> MutexGuard<'_, WorldState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the world and apply every operation finished by now.
    fn settled(&self) -> MutexGuard<'_, WorldState> {
        let mut state = self.lock();
        self.settle(&mut state, Instant::now());
        state
    }

    fn settle(&self, state: &mut WorldState, now: Instant) {
        let mut done: Vec<(ExecHandle, SimExec)> = state
            .running
            .iter()
            .filter(|(_, exec)| exec.finishes_at <= now)
            .map(|(handle, exec)| (*handle, exec.clone()))
            .collect();
        done.sort_by_key(|(handle, exec)| (exec.finishes_at, handle.0));

        for (handle, exec) in done {
            state.running.remove(&handle);
            if let Some(worker) = state.workers.get_mut(&exec.worker) {
                worker.used_memory = (worker.used_memory - exec.memory).max(0.0);
            }
            let parallelism = state
                .workers
                .get(&exec.worker)
                .map(|w| w.parallelism)
                .unwrap_or(1);
            if let Some(target) = state.target.as_mut() {
                self.apply(target, &exec, parallelism);
                trace!(
                    %handle,
                    kind = %exec.kind,
                    threads = exec.threads,
                    hardening = target.hardening,
                    resource = target.resource_available,
                    "operation finished"
                );
            }
        }
    }

    fn apply(&self, target: &mut SimTarget, exec: &SimExec, parallelism: u32) {
        let threads = f64::from(exec.threads);
        match exec.kind {
            OpKind::Weaken => {
                let effect = self.oracle.weaken_effect(exec.threads, parallelism);
                target.hardening = (target.hardening - effect).max(target.hardening_floor);
            }
            OpKind::Grow => {
                let rate = self.oracle.grow_rate(parallelism);
                let grown = (target.resource_available + threads) * rate.powf(threads);
                target.resource_available = grown.min(target.resource_max);
                target.hardening += self.oracle.grow_hardening(exec.threads, parallelism);
            }
            OpKind::Hack => {
                let fraction = (self.oracle.hack_fraction_at(target.hardening) * threads).min(1.0);
                target.resource_available -= target.resource_available * fraction;
                target.hardening += self.oracle.hack_hardening(exec.threads);
            }
        }
    }
}

impl WorkerInventory for SimWorld {
    fn worker(&self, name: &str) -> anyhow::Result<WorkerCapacity> {
        let state = self.settled();
        let worker = state
            .workers
            .get(name)
            .ok_or_else(|| anyhow!("unknown worker: {name}"))?;
        Ok(WorkerCapacity {
            total_memory: worker.total_memory,
            used_memory: worker.used_memory,
            parallelism: worker.parallelism,
        })
    }
}

impl TargetProvider for SimWorld {
    fn target(&self, name: &str) -> anyhow::Result<TargetMetrics> {
        let state = self.settled();
        let target = state
            .target
            .as_ref()
            .filter(|t| t.name == name)
            .ok_or_else(|| anyhow!("unknown target: {name}"))?;
        Ok(TargetMetrics {
            hardening: target.hardening,
            hardening_floor: target.hardening_floor,
            resource_available: target.resource_available,
            resource_max: target.resource_max,
        })
    }
}

impl OperationOracle for SimWorld {
    fn duration(&self, target: &cadence_core::TargetState, kind: OpKind) -> Duration {
        self.oracle.duration(target, kind)
    }

    fn weaken_effect(&self, threads: u32, parallelism: u32) -> f64 {
        self.oracle.weaken_effect(threads, parallelism)
    }

    fn grow_threads(
        &self,
        target: &cadence_core::TargetState,
        multiplier: f64,
        parallelism: u32,
    ) -> f64 {
        self.oracle.grow_threads(target, multiplier, parallelism)
    }

    fn grow_hardening(&self, threads: u32, parallelism: u32) -> f64 {
        self.oracle.grow_hardening(threads, parallelism)
    }

    fn hack_fraction(&self, target: &cadence_core::TargetState) -> f64 {
        self.oracle.hack_fraction(target)
    }

    fn hack_hardening(&self, threads: u32) -> f64 {
        self.oracle.hack_hardening(threads)
    }
}

impl ExecutionSink for SimWorld {
    fn launch(&self, request: &LaunchRequest<'_>) -> Result<ExecHandle, LaunchError> {
        let now = Instant::now();
        let mut state = self.lock();
        self.settle(&mut state, now);

        let hardening = match state.target.as_ref() {
            Some(t) if t.name == request.target => t.hardening,
            _ => return Err(LaunchError::Rejected(format!("unknown target {}", request.target))),
        };

        let needed = f64::from(request.threads) * self.memory_per_thread[request.kind];
        let worker = state
            .workers
            .get_mut(request.worker)
            .ok_or_else(|| LaunchError::UnknownWorker(request.worker.to_string()))?;
        let available = worker.total_memory - worker.used_memory;
        if needed > available {
            return Err(LaunchError::InsufficientMemory {
                worker: request.worker.to_string(),
                needed,
                available,
            });
        }
        worker.used_memory += needed;

        state.next_handle += 1;
        state.launches += 1;
        let handle = ExecHandle(state.next_handle);
        let duration = self.oracle.duration_at(hardening, request.kind);
        state.running.insert(
            handle,
            SimExec {
                worker: request.worker.to_string(),
                kind: request.kind,
                threads: request.threads,
                memory: needed,
                launched_at: now,
                finishes_at: now + request.start_delay + duration,
            },
        );

        debug!(
            %handle,
            worker = request.worker,
            kind = %request.kind,
            threads = request.threads,
            finishes_in_ms = (request.start_delay + duration).as_millis() as u64,
            "simulated launch"
        );
        Ok(handle)
    }

    fn is_alive(&self, handle: ExecHandle) -> bool {
        self.settled().running.contains_key(&handle)
    }

    fn elapsed(&self, handle: ExecHandle) -> Option<Duration> {
        let now = Instant::now();
        let state = self.settled();
        state
            .running
            .get(&handle)
            .map(|exec| now.saturating_duration_since(exec.launched_at))
    }
}
