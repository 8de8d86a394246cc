//! Batch controller — drives the phase state machine.
//!
//! ```text
//! Init ─▶ HardenFloor ─▶ SaturateCeiling ─▶ SteadyState ─┐
//!                                              ▲          │ settle pause
//!                                              └──────────┘
//! ```
//!
//! Each phase takes a fresh snapshot, plans one wave, dispatches every job
//! of it, then polls until all of them are gone. Nothing but the external
//! target/worker figures carries over between waves. The steady-state loop
//! only stops on the shutdown signal, checked between iterations.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use cadence_core::{
    BatchConfig, Clock, ExecutionSink, OperationOracle, TargetProvider, WorkerInventory,
};
use cadence_scheduler::{Batch, BatchResult, Job, Phase, Planner, Wave};

/// The external collaborators the controller drives.
#[derive(Clone)]
pub struct Collaborators {
    pub inventory: Arc<dyn WorkerInventory>,
    pub targets: Arc<dyn TargetProvider>,
    pub oracle: Arc<dyn OperationOracle>,
    pub sink: Arc<dyn ExecutionSink>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// Use one backend for inventory, target, oracle and sink.
    pub fn from_backend<B>(backend: Arc<B>, clock: Arc<dyn Clock>) -> Self
    where
        B: WorkerInventory + TargetProvider + OperationOracle + ExecutionSink + 'static,
    {
        Self {
            inventory: backend.clone(),
            targets: backend.clone(),
            oracle: backend.clone(),
            sink: backend,
            clock,
        }
    }
}

/// Timing knobs of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Gap between consecutive completions inside a cycle.
    pub gap: Duration,
    /// Wait-loop poll interval.
    pub poll_interval: Duration,
    /// Pause between steady-state iterations.
    pub settle: Duration,
}

impl ControllerSettings {
    pub fn from_config(config: &BatchConfig) -> Self {
        Self {
            gap: config.gap(),
            poll_interval: config.poll_interval(),
            settle: config.settle(),
        }
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            gap: Duration::from_secs(1),
            poll_interval: Duration::from_secs(1),
            settle: Duration::from_secs(1),
        }
    }
}

/// Where the controller is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum BatchPhase {
    Init,
    HardenFloor,
    SaturateCeiling,
    SteadyState { iteration: u64 },
    Stopped,
}

impl fmt::Display for BatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchPhase::Init => f.write_str("init"),
            BatchPhase::HardenFloor => f.write_str("harden-floor"),
            BatchPhase::SaturateCeiling => f.write_str("saturate-ceiling"),
            BatchPhase::SteadyState { iteration } => write!(f, "steady-state #{iteration}"),
            BatchPhase::Stopped => f.write_str("stopped"),
        }
    }
}

/// Counters accumulated over a controller's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Non-empty waves dispatched, all phases.
    pub waves: u64,
    pub jobs_dispatched: u64,
    /// Steady-state iterations that drained completely.
    pub iterations: u64,
}

pub struct BatchController {
    batch: Batch,
    settings: ControllerSettings,
    deps: Collaborators,
    phase: BatchPhase,
    summary: RunSummary,
}

impl BatchController {
    pub fn new(batch: Batch, settings: ControllerSettings, deps: Collaborators) -> Self {
        Self {
            batch,
            settings,
            deps,
            phase: BatchPhase::Init,
            summary: RunSummary::default(),
        }
    }

    pub fn phase(&self) -> BatchPhase {
        self.phase
    }

    pub fn summary(&self) -> RunSummary {
        self.summary
    }

    pub fn batch(&self) -> &Batch {
        &self.batch
    }

    /// Plan the wave `phase` would dispatch right now, without dispatching.
    pub fn plan(&self, phase: Phase) -> BatchResult<Wave> {
        let snapshot = self
            .batch
            .snapshot(self.deps.targets.as_ref(), self.deps.inventory.as_ref())?;
        Planner::new(self.deps.oracle.as_ref(), self.settings.gap).plan(phase, &snapshot)
    }

    /// Run to completion: prepare the target, then loop the steady state
    /// until `shutdown` flips.
    pub async fn run(&mut self, shutdown: watch::Receiver<bool>) -> BatchResult<RunSummary> {
        info!(
            batch = %self.batch.name(),
            target = %self.batch.target(),
            workers = self.batch.workers().len(),
            "batch controller started"
        );
        if *shutdown.borrow() {
            info!(batch = %self.batch.name(), "stop requested before start");
            self.phase = BatchPhase::Stopped;
            return Ok(self.summary);
        }

        self.prepare().await?;
        self.run_steady(shutdown).await?;

        info!(
            batch = %self.batch.name(),
            waves = self.summary.waves,
            jobs = self.summary.jobs_dispatched,
            iterations = self.summary.iterations,
            "batch controller stopped"
        );
        Ok(self.summary)
    }

    /// Bring the target to its hardening floor, then its resource ceiling.
    /// One wave each; an empty wave means the phase is already satisfied.
    pub async fn prepare(&mut self) -> BatchResult<()> {
        self.transition(BatchPhase::HardenFloor);
        self.execute(Phase::HardenFloor).await?;

        self.transition(BatchPhase::SaturateCeiling);
        self.execute(Phase::SaturateCeiling).await?;
        Ok(())
    }

    /// Repeat steady-state waves until the shutdown signal. The signal is
    /// honoured between iterations only; a running wave always drains.
    pub async fn run_steady(&mut self, mut shutdown: watch::Receiver<bool>) -> BatchResult<()> {
        let mut iteration = 0;
        let mut signal_open = true;
        loop {
            if *shutdown.borrow() {
                info!(batch = %self.batch.name(), "stop signal received");
                break;
            }

            iteration += 1;
            self.transition(BatchPhase::SteadyState { iteration });
            self.execute(Phase::SteadyState).await?;
            self.summary.iterations += 1;

            if self.settle(&mut shutdown, &mut signal_open).await {
                info!(batch = %self.batch.name(), iteration, "stop signal received during settle");
                break;
            }
        }

        self.transition(BatchPhase::Stopped);
        Ok(())
    }

    /// Sleep the settle pause. Returns true if a stop was requested while
    /// waiting. A dropped sender can never request a stop, so from then on
    /// only the pause is awaited.
    async fn settle(&self, shutdown: &mut watch::Receiver<bool>, signal_open: &mut bool) -> bool {
        let mut pause = self.deps.clock.sleep(self.settings.settle);
        loop {
            tokio::select! {
                _ = &mut pause => return false,
                changed = shutdown.changed(), if *signal_open => match changed {
                    Ok(()) if *shutdown.borrow() => return true,
                    Ok(()) => {}
                    Err(_) => {
                        warn!(batch = %self.batch.name(), "stop signal sender dropped, running until killed");
                        *signal_open = false;
                    }
                },
            }
        }
    }

    fn transition(&mut self, next: BatchPhase) {
        let from = self.phase;
        self.phase = next;
        match next {
            BatchPhase::SteadyState { iteration } if iteration > 1 => {
                debug!(batch = %self.batch.name(), iteration, "next steady-state iteration");
            }
            _ => info!(batch = %self.batch.name(), %from, to = %next, "phase transition"),
        }
    }

    /// Plan, dispatch and await one wave. Returns the number of jobs run.
    async fn execute(&mut self, phase: Phase) -> BatchResult<usize> {
        let mut wave = self.plan(phase).inspect_err(|e| {
            warn!(batch = %self.batch.name(), %phase, error = %e, "planning failed");
        })?;

        if wave.is_empty() {
            info!(batch = %self.batch.name(), %phase, "nothing to do");
            return Ok(0);
        }

        self.dispatch(&mut wave)?;
        self.wait_for_jobs(&mut wave.jobs).await;

        info!(
            batch = %self.batch.name(),
            %phase,
            jobs = wave.jobs.len(),
            "wave drained"
        );
        Ok(wave.jobs.len())
    }

    /// Launch every job of the wave. The first refusal stops the wave and
    /// is returned; jobs already launched are left running.
    fn dispatch(&mut self, wave: &mut Wave) -> BatchResult<()> {
        let sink = self.deps.sink.as_ref();
        let profiles = self.batch.profiles();

        for (launched, job) in wave.jobs.iter_mut().enumerate() {
            if let Err(e) = job.dispatch(sink, profiles) {
                error!(
                    batch = %self.batch.name(),
                    phase = %wave.phase,
                    launched,
                    error = %e,
                    "dispatch failed, wave left partially launched"
                );
                self.summary.jobs_dispatched += launched as u64;
                self.summary.waves += 1;
                return Err(e);
            }
        }

        self.summary.waves += 1;
        self.summary.jobs_dispatched += wave.jobs.len() as u64;
        info!(
            batch = %self.batch.name(),
            phase = %wave.phase,
            jobs = wave.jobs.len(),
            cycles = wave.cycles,
            expected_ms = wave.expected_end().as_millis() as u64,
            "wave dispatched"
        );
        Ok(())
    }

    /// Poll until no job of the wave is alive.
    async fn wait_for_jobs(&self, jobs: &mut [Job]) {
        let sink = self.deps.sink.as_ref();
        loop {
            let mut live = 0usize;
            let mut longest = Duration::ZERO;
            for job in jobs.iter_mut() {
                let Some(remaining) = job.remaining_estimate(sink) else {
                    continue;
                };
                live += 1;
                longest = longest.max(remaining);
                debug!(
                    job = %job.id,
                    worker = %job.worker,
                    remaining_ms = remaining.as_millis() as u64,
                    "job running"
                );
            }
            if live == 0 {
                return;
            }

            self.log_target_status(live, longest);
            self.deps.clock.sleep(self.settings.poll_interval).await;
        }
    }

    fn log_target_status(&self, live: usize, longest: Duration) {
        match self.deps.targets.target(self.batch.target()) {
            Ok(m) => debug!(
                target = %self.batch.target(),
                live,
                longest_remaining_ms = longest.as_millis() as u64,
                resource = m.resource_available,
                resource_max = m.resource_max,
                hardening = m.hardening,
                hardening_floor = m.hardening_floor,
                "waiting for jobs"
            ),
            Err(e) => warn!(target = %self.batch.target(), error = %e, "target status unavailable"),
        }
    }
}
