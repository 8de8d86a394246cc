//! Wave planner — turns a snapshot into the job set for one phase.
//!
//! # Phases
//!
//! ```text
//! HardenFloor      one weaken job per worker, all at delay 0
//! SaturateCeiling  per worker: grow + compensating weaken, completions aligned
//! SteadyState      N concurrent hack / weaken / grow / weaken cycles, G apart
//! ```
//!
//! Planning is pure arithmetic over one snapshot: running it twice on the
//! same snapshot yields the same plan. Every wave is checked against each
//! worker's available memory before it is handed to the controller.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use cadence_core::{OpKind, OperationOracle, TargetState, WorkerSnapshot};

use crate::batch::Snapshot;
use crate::cost::{CostModel, HackPlan, compensation_threads};
use crate::error::{BatchError, BatchResult};
use crate::job::Job;
use crate::timing::{CycleTimings, Slot, align_prep};

/// Tolerance when comparing removed vs. added hardening.
const COMPENSATION_EPSILON: f64 = 1e-9;

/// The three planning phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    HardenFloor,
    SaturateCeiling,
    SteadyState,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::HardenFloor => "harden-floor",
            Phase::SaturateCeiling => "saturate-ceiling",
            Phase::SteadyState => "steady-state",
        })
    }
}

/// The jobs of one phase call, dispatched and awaited together.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Wave {
    pub phase: Phase,
    pub jobs: Vec<Job>,
    /// Concurrent cycles (steady state only; 0 otherwise).
    pub cycles: u32,
}

impl Wave {
    fn empty(phase: Phase) -> Self {
        Self {
            phase,
            jobs: Vec::new(),
            cycles: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn total_memory(&self) -> f64 {
        self.jobs.iter().map(|j| j.memory).sum()
    }

    /// Memory the wave claims on each worker.
    pub fn memory_by_worker(&self) -> BTreeMap<&str, f64> {
        let mut by_worker = BTreeMap::new();
        for job in &self.jobs {
            *by_worker.entry(job.worker.as_str()).or_insert(0.0) += job.memory;
        }
        by_worker
    }

    /// Latest expected completion relative to dispatch.
    pub fn expected_end(&self) -> Duration {
        self.jobs
            .iter()
            .map(Job::expected_end)
            .max()
            .unwrap_or_default()
    }
}

/// Thread counts of one steady-state cycle, before and after splitting
/// across the pool.
#[derive(Debug, Clone, PartialEq)]
pub struct CyclePlan {
    pub hack: HackPlan,
    /// Total threads per slot, in `Slot::ALL` order.
    pub total_threads: [u32; 4],
    /// Threads each worker runs per slot, in `Slot::ALL` order.
    pub worker_threads: [u32; 4],
    pub timings: CycleTimings,
    /// Memory one cycle claims across the whole pool.
    pub cost_per_cycle: f64,
    /// Sum of every worker's available memory.
    pub pool_memory: f64,
    pub memory_bound: u32,
    /// Cycles the tightest worker can hold.
    pub worker_bound: u32,
    /// The tightest worker and its share of one cycle.
    pub limiting_worker: String,
    pub limiting_cost: f64,
    pub time_bound: u32,
}

impl CyclePlan {
    pub fn cycles(&self) -> u32 {
        self.memory_bound.min(self.worker_bound).min(self.time_bound)
    }

    pub fn threads(&self, slot: Slot) -> u32 {
        self.worker_threads[slot.offset() as usize]
    }
}

/// Computes waves from snapshots.
pub struct Planner<'a> {
    cost: CostModel<'a>,
    gap: Duration,
}

impl<'a> Planner<'a> {
    pub fn new(oracle: &'a dyn OperationOracle, gap: Duration) -> Self {
        Self {
            cost: CostModel::new(oracle),
            gap,
        }
    }

    pub fn cost(&self) -> &CostModel<'a> {
        &self.cost
    }

    /// Plan the wave for `phase` from one snapshot.
    pub fn plan(&self, phase: Phase, snapshot: &Snapshot) -> BatchResult<Wave> {
        match phase {
            Phase::HardenFloor => self.plan_harden(&snapshot.target, &snapshot.workers),
            Phase::SaturateCeiling => self.plan_saturate(&snapshot.target, &snapshot.workers),
            Phase::SteadyState => self.plan_steady(&snapshot.target, &snapshot.workers),
        }
    }

    /// Phase 1: weaken the target down to its hardening floor.
    ///
    /// Sized for the least effective worker, so any assignment of the
    /// threads over-corrects rather than under-corrects.
    pub fn plan_harden(
        &self,
        target: &TargetState,
        workers: &[WorkerSnapshot],
    ) -> BatchResult<Wave> {
        check_workers(target, workers)?;
        if target.is_at_floor() {
            debug!(target = %target.name, "already at hardening floor");
            return Ok(Wave::empty(Phase::HardenFloor));
        }

        let per_thread = workers
            .iter()
            .map(|w| self.cost.weaken_per_thread(w.parallelism))
            .fold(f64::INFINITY, f64::min);
        let total = target.floor_threads(per_thread).max(1);
        let per_worker = total.div_ceil(workers.len() as u32).max(1);
        let duration = self.cost.duration(target, OpKind::Weaken);

        let jobs = workers
            .iter()
            .map(|w| {
                Job::new(
                    "prep weaken",
                    OpKind::Weaken,
                    &target.name,
                    &w.name,
                    per_worker,
                    w.memory_cost(OpKind::Weaken, per_worker),
                    Duration::ZERO,
                    duration,
                )
            })
            .collect();

        let wave = Wave {
            phase: Phase::HardenFloor,
            jobs,
            cycles: 0,
        };
        ensure_capacity(&wave, workers)?;

        info!(
            target = %target.name,
            gap = target.hardening_gap(),
            total_threads = total,
            per_worker,
            "planned harden wave"
        );
        Ok(wave)
    }

    /// Phase 2: grow the target's resource to its maximum while weaken
    /// offsets the hardening the growth adds.
    pub fn plan_saturate(
        &self,
        target: &TargetState,
        workers: &[WorkerSnapshot],
    ) -> BatchResult<Wave> {
        check_workers(target, workers)?;
        if target.is_at_ceiling() {
            debug!(target = %target.name, "already at resource ceiling");
            return Ok(Wave::empty(Phase::SaturateCeiling));
        }

        let multiplier = (target.growth_multiplier() / workers.len() as f64).max(1.0);

        struct PrepInfo {
            grow_threads: u32,
            weaken_threads: u32,
            weaken_time: Duration,
            grow_time: Duration,
        }

        let infos: Vec<PrepInfo> = workers
            .iter()
            .map(|w| {
                // Threads are sized at unit parallelism; the hardening they
                // add is evaluated at the worker's own parallelism.
                let grow_threads = self.cost.grow_threads(target, multiplier, 1);
                let increase = self.cost.grow_security_delta(grow_threads, w.parallelism);
                let weaken_threads =
                    compensation_threads(increase, self.cost.weaken_per_thread(w.parallelism));
                PrepInfo {
                    grow_threads,
                    weaken_threads,
                    weaken_time: self.cost.duration(target, OpKind::Weaken),
                    grow_time: self.cost.duration(target, OpKind::Grow),
                }
            })
            .collect();

        let durations: Vec<(Duration, Duration)> =
            infos.iter().map(|i| (i.weaken_time, i.grow_time)).collect();
        let timings = align_prep(&durations, self.gap);

        let mut jobs = Vec::with_capacity(workers.len() * 2);
        for ((w, info), timing) in workers.iter().zip(&infos).zip(&timings) {
            jobs.push(Job::new(
                "prep grow",
                OpKind::Grow,
                &target.name,
                &w.name,
                info.grow_threads,
                w.memory_cost(OpKind::Grow, info.grow_threads),
                timing.grow_delay,
                info.grow_time,
            ));
            jobs.push(Job::new(
                "prep weaken-grow",
                OpKind::Weaken,
                &target.name,
                &w.name,
                info.weaken_threads,
                w.memory_cost(OpKind::Weaken, info.weaken_threads),
                timing.weaken_delay,
                info.weaken_time,
            ));
        }

        let wave = Wave {
            phase: Phase::SaturateCeiling,
            jobs,
            cycles: 0,
        };
        ensure_capacity(&wave, workers)?;

        info!(
            target = %target.name,
            multiplier,
            jobs = wave.jobs.len(),
            "planned saturate wave"
        );
        Ok(wave)
    }

    /// Thread, timing and memory figures of one steady-state cycle.
    ///
    /// Per-thread figures use the first worker's parallelism for the whole
    /// pool.
    pub fn plan_cycle(
        &self,
        target: &TargetState,
        workers: &[WorkerSnapshot],
    ) -> BatchResult<CyclePlan> {
        check_workers(target, workers)?;
        let parallelism = workers[0].parallelism;
        let weaken_per_thread = self.cost.weaken_per_thread(parallelism);

        let hack = self.cost.hack_threads(target, target.extraction_fraction);
        let weaken_hack = compensation_threads(hack.hardening_delta, weaken_per_thread);
        self.verify_compensation(weaken_hack, parallelism, hack.hardening_delta)?;

        let grow = self.cost.grow_threads(target, hack.multiplier, parallelism);
        let grow_increase = self.cost.grow_security_delta(grow, parallelism);
        let weaken_grow = compensation_threads(grow_increase, weaken_per_thread);
        self.verify_compensation(weaken_grow, parallelism, grow_increase)?;

        let total_threads = [hack.threads, weaken_hack, grow, weaken_grow];
        let n = workers.len() as u32;
        let worker_threads = Slot::ALL.map(|slot| {
            let total = total_threads[slot.offset() as usize];
            let split = match slot {
                Slot::Hack => total / n,
                _ => total.div_ceil(n),
            };
            split.max(1)
        });

        let timings = CycleTimings::compute(
            self.cost.duration(target, OpKind::Hack),
            self.cost.duration(target, OpKind::Weaken),
            self.cost.duration(target, OpKind::Grow),
            self.gap,
        )?;

        let worker_costs: Vec<f64> = workers
            .iter()
            .map(|w| {
                Slot::ALL
                    .iter()
                    .map(|slot| w.memory_cost(slot.kind(), worker_threads[slot.offset() as usize]))
                    .sum::<f64>()
            })
            .collect();
        let cost_per_cycle: f64 = worker_costs.iter().sum();
        let pool_memory: f64 = workers.iter().map(|w| w.available_memory().max(0.0)).sum();
        let memory_bound = fit_cycles(pool_memory, cost_per_cycle);

        // Every worker carries its share of every cycle.
        let (limiting_worker, limiting_cost, worker_bound) = workers
            .iter()
            .zip(&worker_costs)
            .map(|(w, cost)| (w, *cost, fit_cycles(w.available_memory().max(0.0), *cost)))
            .min_by_key(|(_, _, bound)| *bound)
            .map(|(w, cost, bound)| (w.name.clone(), cost, bound))
            .unwrap_or_default();

        Ok(CyclePlan {
            hack,
            total_threads,
            worker_threads,
            time_bound: timings.time_bound(),
            timings,
            cost_per_cycle,
            pool_memory,
            memory_bound,
            worker_bound,
            limiting_worker,
            limiting_cost,
        })
    }

    /// Phase 3: as many concurrent extraction cycles as memory and time allow.
    pub fn plan_steady(
        &self,
        target: &TargetState,
        workers: &[WorkerSnapshot],
    ) -> BatchResult<Wave> {
        let cycle = self.plan_cycle(target, workers)?;
        if cycle.memory_bound == 0 {
            warn!(
                target = %target.name,
                cost_per_cycle = cycle.cost_per_cycle,
                pool_memory = cycle.pool_memory,
                "a single cycle does not fit the pool"
            );
            return Err(BatchError::Capacity {
                scope: "pool".to_string(),
                required: cycle.cost_per_cycle,
                available: cycle.pool_memory,
            });
        }
        if cycle.worker_bound == 0 {
            let available = workers
                .iter()
                .find(|w| w.name == cycle.limiting_worker)
                .map(|w| w.available_memory())
                .unwrap_or_default();
            warn!(
                target = %target.name,
                worker = %cycle.limiting_worker,
                required = cycle.limiting_cost,
                available,
                "a single cycle does not fit the worker"
            );
            return Err(BatchError::Capacity {
                scope: cycle.limiting_worker,
                required: cycle.limiting_cost,
                available,
            });
        }

        let cycles = cycle.cycles();
        let spacing = cycle.timings.cycle_spacing();
        let mut jobs = Vec::with_capacity(cycles as usize * Slot::ALL.len() * workers.len());
        for i in 0..cycles {
            let offset = spacing * i;
            for slot in Slot::ALL {
                let timing = cycle.timings.slot(slot);
                let threads = cycle.threads(slot);
                for w in workers {
                    jobs.push(Job::new(
                        format!("{} {i}", slot.label()),
                        slot.kind(),
                        &target.name,
                        &w.name,
                        threads,
                        w.memory_cost(slot.kind(), threads),
                        timing.delay + offset,
                        timing.duration,
                    ));
                }
            }
        }

        let wave = Wave {
            phase: Phase::SteadyState,
            jobs,
            cycles,
        };
        ensure_capacity(&wave, workers)?;

        info!(
            target = %target.name,
            cycles,
            memory_bound = cycle.memory_bound,
            worker_bound = cycle.worker_bound,
            time_bound = cycle.time_bound,
            hack_threads = cycle.hack.threads,
            jobs = wave.jobs.len(),
            "planned steady-state wave"
        );
        Ok(wave)
    }

    fn verify_compensation(&self, threads: u32, parallelism: u32, increase: f64) -> BatchResult<()> {
        let removed = self.cost.weaken_effect(threads, parallelism).abs();
        if removed + COMPENSATION_EPSILON < increase {
            return Err(BatchError::CompensationShortfall {
                threads,
                removed,
                increase,
            });
        }
        Ok(())
    }
}

/// Whole cycles of `cost` that fit in `memory`; unbounded when free.
fn fit_cycles(memory: f64, cost: f64) -> u32 {
    if cost > 0.0 {
        (memory / cost).floor().clamp(0.0, f64::from(u32::MAX)) as u32
    } else {
        u32::MAX
    }
}

/// The pool must be non-empty and no worker may already be eating into
/// its reservation.
fn check_workers(target: &TargetState, workers: &[WorkerSnapshot]) -> BatchResult<()> {
    if workers.is_empty() {
        return Err(BatchError::NoWorkers(target.name.clone()));
    }
    if let Some(w) = workers.iter().find(|w| w.available_memory() < 0.0) {
        return Err(BatchError::Capacity {
            scope: w.name.clone(),
            required: 0.0,
            available: w.available_memory(),
        });
    }
    Ok(())
}

/// Each worker's share of the wave must fit its available memory.
fn ensure_capacity(wave: &Wave, workers: &[WorkerSnapshot]) -> BatchResult<()> {
    let claimed = wave.memory_by_worker();
    for w in workers {
        let required = claimed.get(w.name.as_str()).copied().unwrap_or(0.0);
        if required > w.available_memory() {
            warn!(
                phase = %wave.phase,
                worker = %w.name,
                required,
                available = w.available_memory(),
                "wave does not fit worker"
            );
            return Err(BatchError::Capacity {
                scope: w.name.clone(),
                required,
                available: w.available_memory(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FixedOracle, test_target, test_worker};

    const GAP: Duration = Duration::from_secs(1);

    fn strong_weaken() -> FixedOracle {
        FixedOracle {
            weaken_per_thread: 0.25,
            ..FixedOracle::default()
        }
    }

    // ── Phase 1 ────────────────────────────────────────────────────

    #[test]
    fn harden_single_worker_scenario() {
        let oracle = strong_weaken();
        let planner = Planner::new(&oracle, GAP);
        let target = test_target(5.0, 0.0);
        let workers = vec![test_worker("w1", 64.0, 1)];

        let wave = planner.plan_harden(&target, &workers).unwrap();

        assert_eq!(wave.jobs.len(), 1);
        let job = &wave.jobs[0];
        assert_eq!(job.kind, OpKind::Weaken);
        // ceil((5 - 1) / 0.25)
        assert_eq!(job.threads, 16);
        assert_eq!(job.start_delay, Duration::ZERO);
        assert_eq!(job.memory, 16.0);
        assert_eq!(job.expected_duration, Duration::from_secs(40));
    }

    #[test]
    fn harden_at_floor_is_empty() {
        let oracle = strong_weaken();
        let planner = Planner::new(&oracle, GAP);
        let target = test_target(1.05, 0.0);
        let wave = planner
            .plan_harden(&target, &[test_worker("w1", 64.0, 1)])
            .unwrap();
        assert!(wave.is_empty());
    }

    #[test]
    fn harden_sizes_for_least_effective_worker() {
        let oracle = strong_weaken();
        let planner = Planner::new(&oracle, GAP);
        let target = test_target(9.0, 0.0);
        let workers = vec![
            test_worker("w1", 64.0, 1),
            test_worker("w2", 64.0, 8),
            test_worker("w3", 64.0, 4),
        ];

        let wave = planner.plan_harden(&target, &workers).unwrap();

        // Worst case is parallelism 1: ceil(8 / 0.25) = 32, split over 3 → 11.
        assert!(wave.jobs.iter().all(|j| j.threads == 11));
        let removed: f64 = wave
            .jobs
            .iter()
            .zip(&workers)
            .map(|(j, w)| planner.cost().weaken_effect(j.threads, w.parallelism).abs())
            .sum();
        assert!(removed >= target.hardening_gap());
    }

    #[test]
    fn harden_never_undershoots() {
        let oracle = FixedOracle::default();
        let planner = Planner::new(&oracle, GAP);
        for hardening in [1.2, 3.3, 7.77, 15.0, 42.5] {
            for n in 1..=5usize {
                let target = test_target(hardening, 0.0);
                let workers: Vec<_> = (0..n)
                    .map(|i| test_worker(&format!("w{i}"), 10_000.0, 1 + i as u32))
                    .collect();
                let wave = planner.plan_harden(&target, &workers).unwrap();
                let removed: f64 = wave
                    .jobs
                    .iter()
                    .zip(&workers)
                    .map(|(j, w)| planner.cost().weaken_effect(j.threads, w.parallelism).abs())
                    .sum();
                assert!(removed + 1e-9 >= target.hardening_gap());
            }
        }
    }

    #[test]
    fn harden_rejects_oversized_wave() {
        let oracle = FixedOracle::default();
        let planner = Planner::new(&oracle, GAP);
        let target = test_target(50.0, 0.0);
        let result = planner.plan_harden(&target, &[test_worker("w1", 64.0, 1)]);
        assert!(matches!(result, Err(BatchError::Capacity { ref scope, .. }) if scope == "w1"));
    }

    #[test]
    fn planning_rejects_overdrawn_reservation() {
        let oracle = FixedOracle::default();
        let planner = Planner::new(&oracle, GAP);
        let mut worker = test_worker("w1", 64.0, 1);
        worker.used_memory = 60.0;
        worker.reserved_memory = 8.0;
        let result = planner.plan_harden(&test_target(1.0, 0.0), &[worker]);
        assert!(matches!(result, Err(BatchError::Capacity { .. })));
    }

    // ── Phase 2 ────────────────────────────────────────────────────

    #[test]
    fn saturate_at_ceiling_is_empty() {
        let oracle = FixedOracle::default();
        let planner = Planner::new(&oracle, GAP);
        let target = test_target(1.0, 999_900.0);
        let wave = planner
            .plan_saturate(&target, &[test_worker("w1", 1_000.0, 1)])
            .unwrap();
        assert!(wave.is_empty());
    }

    #[test]
    fn saturate_pairs_grow_with_later_weaken() {
        let oracle = FixedOracle::default();
        let planner = Planner::new(&oracle, GAP);
        let target = test_target(1.0, 1_000.0);
        let workers = vec![test_worker("w1", 10_000.0, 1), test_worker("w2", 10_000.0, 4)];

        let wave = planner.plan_saturate(&target, &workers).unwrap();

        assert_eq!(wave.jobs.len(), 4);
        for pair in wave.jobs.chunks(2) {
            let (grow, weaken) = (&pair[0], &pair[1]);
            assert_eq!(grow.kind, OpKind::Grow);
            assert_eq!(weaken.kind, OpKind::Weaken);
            assert_eq!(grow.worker, weaken.worker);
            assert!(weaken.expected_end() >= grow.expected_end());
            // Weaken 40s, grow 32s: grow has slack, so it lands one gap early.
            assert_eq!(weaken.start_delay, Duration::ZERO);
            assert_eq!(grow.start_delay, Duration::from_secs(7));

            let increase = planner
                .cost()
                .grow_security_delta(grow.threads, if grow.worker == "w1" { 1 } else { 4 });
            let per_thread = planner
                .cost()
                .weaken_per_thread(if grow.worker == "w1" { 1 } else { 4 });
            assert!(f64::from(weaken.threads) * per_thread + 1e-9 >= increase);
        }
    }

    #[test]
    fn saturate_splits_multiplier_by_worker_count() {
        let oracle = FixedOracle::default();
        let planner = Planner::new(&oracle, GAP);
        let target = test_target(1.0, 9_999.0);

        let one = planner
            .plan_saturate(&target, &[test_worker("w1", 10_000.0, 1)])
            .unwrap();
        let two = planner
            .plan_saturate(
                &target,
                &[test_worker("w1", 10_000.0, 1), test_worker("w2", 10_000.0, 1)],
            )
            .unwrap();

        // Multiplier 100 for one worker, 50 each for two.
        let expected_one = (100f64.ln() / 1.01f64.ln()).ceil() as u32;
        let expected_two = (50f64.ln() / 1.01f64.ln()).ceil() as u32;
        assert_eq!(one.jobs[0].threads, expected_one);
        assert_eq!(two.jobs[0].threads, expected_two);
        assert_eq!(two.jobs[2].threads, expected_two);
    }

    // ── Phase 3 ────────────────────────────────────────────────────

    fn pool(n: usize, memory: f64) -> Vec<WorkerSnapshot> {
        (0..n)
            .map(|i| test_worker(&format!("w{i}"), memory, 1))
            .collect()
    }

    #[test]
    fn steady_cycle_completions_are_gap_apart() {
        let oracle = FixedOracle::default();
        let planner = Planner::new(&oracle, GAP);
        let target = test_target(1.0, 1_000_000.0);

        let wave = planner.plan_steady(&target, &pool(2, 100_000.0)).unwrap();
        assert!(wave.cycles >= 1);

        for i in 0..wave.cycles {
            let mut ends: Vec<Duration> = wave
                .jobs
                .iter()
                .filter(|j| j.id.ends_with(&format!(" {i}")) && j.worker == "w0")
                .map(Job::expected_end)
                .collect();
            assert_eq!(ends.len(), 4);
            ends.sort();
            for pair in ends.windows(2) {
                assert_eq!(pair[1] - pair[0], GAP);
            }
        }
    }

    #[test]
    fn steady_cycles_are_offset_by_four_gaps() {
        let oracle = FixedOracle::default();
        let planner = Planner::new(&oracle, GAP);
        let target = test_target(1.0, 1_000_000.0);

        let wave = planner.plan_steady(&target, &pool(1, 100_000.0)).unwrap();
        let first_hacks: Vec<Duration> = wave
            .jobs
            .iter()
            .filter(|j| j.kind == OpKind::Hack)
            .map(|j| j.start_delay)
            .collect();
        for pair in first_hacks.windows(2) {
            assert_eq!(pair[1] - pair[0], GAP * 4);
        }
    }

    #[test]
    fn steady_cycles_limited_by_time() {
        let oracle = FixedOracle::default();
        let planner = Planner::new(&oracle, GAP);
        let target = test_target(1.0, 1_000_000.0);

        // Weaken takes 40s, a cycle spans 4s: at most 10 cycles.
        let wave = planner.plan_steady(&target, &pool(1, 1_000_000.0)).unwrap();
        assert_eq!(wave.cycles, 10);
        assert_eq!(wave.jobs.len(), 40);
    }

    #[test]
    fn steady_cycles_limited_by_memory() {
        let oracle = FixedOracle::default();
        let planner = Planner::new(&oracle, GAP);
        let target = test_target(1.0, 1_000_000.0);
        let workers = pool(2, 1_000.0);

        let cycle = planner.plan_cycle(&target, &workers).unwrap();
        let wave = planner.plan_steady(&target, &workers).unwrap();

        let bound = (cycle.pool_memory / cycle.cost_per_cycle).floor() as u32;
        assert!(bound < cycle.time_bound);
        assert_eq!(wave.cycles, bound);
        assert!(wave.total_memory() <= cycle.pool_memory);
    }

    #[test]
    fn steady_cycles_limited_by_smallest_worker() {
        let oracle = FixedOracle::default();
        let planner = Planner::new(&oracle, GAP);
        let target = test_target(1.0, 1_000_000.0);
        let workers = vec![
            test_worker("w0", 100_000.0, 1),
            test_worker("w1", 400.0, 1),
        ];

        let cycle = planner.plan_cycle(&target, &workers).unwrap();
        assert_eq!(cycle.limiting_worker, "w1");
        assert!(cycle.worker_bound < cycle.memory_bound);
        assert!(cycle.worker_bound < cycle.time_bound);

        let wave = planner.plan_steady(&target, &workers).unwrap();
        assert_eq!(wave.cycles, 2);
        assert_eq!(wave.cycles, (400.0 / cycle.limiting_cost).floor() as u32);
        assert!(wave.memory_by_worker()["w1"] <= 400.0);
    }

    #[test]
    fn steady_fails_when_one_cycle_exceeds_a_worker() {
        let oracle = FixedOracle::default();
        let planner = Planner::new(&oracle, GAP);
        let target = test_target(1.0, 1_000_000.0);
        let roomy = vec![
            test_worker("w0", 100_000.0, 1),
            test_worker("w1", 100_000.0, 1),
        ];
        let share = planner.plan_cycle(&target, &roomy).unwrap().limiting_cost;
        let workers = vec![
            test_worker("w0", 100_000.0, 1),
            test_worker("w1", share / 2.0, 1),
        ];

        let err = planner.plan_steady(&target, &workers).unwrap_err();
        assert!(matches!(
            err,
            BatchError::Capacity { ref scope, required, .. } if scope == "w1" && required == share
        ));
    }

    #[test]
    fn steady_plans_one_cycle_when_it_just_fits() {
        let oracle = FixedOracle::default();
        let planner = Planner::new(&oracle, GAP);
        let target = test_target(1.0, 1_000_000.0);

        let probe = planner.plan_cycle(&target, &pool(1, 1_000_000.0)).unwrap();
        let workers = pool(1, probe.cost_per_cycle);
        let wave = planner.plan_steady(&target, &workers).unwrap();
        assert_eq!(wave.cycles, 1);
    }

    #[test]
    fn steady_fails_when_one_cycle_exceeds_pool() {
        let oracle = FixedOracle::default();
        let planner = Planner::new(&oracle, GAP);
        let target = test_target(1.0, 1_000_000.0);

        let result = planner.plan_steady(&target, &pool(2, 8.0));
        assert!(matches!(
            result,
            Err(BatchError::Capacity { ref scope, .. }) if scope == "pool"
        ));
    }

    #[test]
    fn steady_splits_threads_across_workers() {
        let oracle = FixedOracle::default();
        let planner = Planner::new(&oracle, GAP);
        let target = test_target(1.0, 1_000_000.0);

        let cycle = planner.plan_cycle(&target, &pool(3, 100_000.0)).unwrap();
        let [hack, weaken_hack, grow, weaken_grow] = cycle.total_threads;

        // 0.5 / 0.002 = 250 hack threads.
        assert_eq!(hack, 250);
        assert_eq!(cycle.threads(Slot::Hack), 250 / 3);
        assert_eq!(cycle.threads(Slot::WeakenHack), weaken_hack.div_ceil(3).max(1));
        assert_eq!(cycle.threads(Slot::Grow), grow.div_ceil(3));
        assert_eq!(cycle.threads(Slot::WeakenGrow), weaken_grow.div_ceil(3).max(1));
    }

    #[test]
    fn steady_every_worker_runs_every_slot() {
        let oracle = FixedOracle {
            hack_fraction: 0.2,
            ..FixedOracle::default()
        };
        let planner = Planner::new(&oracle, GAP);
        let target = test_target(1.0, 1_000_000.0);

        // Two hack threads over five workers still gives each worker one.
        let wave = planner.plan_steady(&target, &pool(5, 100_000.0)).unwrap();
        for w in 0..5 {
            let name = format!("w{w}");
            for kind in OpKind::ALL {
                assert!(
                    wave.jobs
                        .iter()
                        .any(|j| j.worker == name && j.kind == kind && j.threads >= 1)
                );
            }
        }
    }

    #[test]
    fn steady_weaken_covers_hack_and_grow() {
        let oracle = FixedOracle::default();
        let planner = Planner::new(&oracle, GAP);
        let target = test_target(1.0, 1_000_000.0);

        let cycle = planner.plan_cycle(&target, &pool(1, 100_000.0)).unwrap();
        let [hack, weaken_hack, grow, weaken_grow] = cycle.total_threads;
        let cost = planner.cost();
        assert!(cost.weaken_effect(weaken_hack, 1).abs() + 1e-9 >= oracle.hack_hardening(hack));
        assert!(cost.weaken_effect(weaken_grow, 1).abs() + 1e-9 >= oracle.grow_hardening(grow, 1));
    }

    #[test]
    fn nonlinear_weaken_is_a_compensation_shortfall() {
        /// Weaken whose multi-thread effect falls short of the per-thread figure.
        struct DiminishingOracle(FixedOracle);

        impl OperationOracle for DiminishingOracle {
            fn duration(&self, target: &TargetState, kind: OpKind) -> Duration {
                self.0.duration(target, kind)
            }
            fn weaken_effect(&self, threads: u32, parallelism: u32) -> f64 {
                self.0.weaken_effect(threads, parallelism).sqrt() * 0.05_f64.sqrt()
            }
            fn grow_threads(&self, target: &TargetState, m: f64, p: u32) -> f64 {
                self.0.grow_threads(target, m, p)
            }
            fn grow_hardening(&self, threads: u32, p: u32) -> f64 {
                self.0.grow_hardening(threads, p)
            }
            fn hack_fraction(&self, target: &TargetState) -> f64 {
                self.0.hack_fraction(target)
            }
            fn hack_hardening(&self, threads: u32) -> f64 {
                self.0.hack_hardening(threads)
            }
        }

        let oracle = DiminishingOracle(FixedOracle::default());
        let planner = Planner::new(&oracle, GAP);
        let result = planner.plan_steady(&test_target(1.0, 1_000_000.0), &pool(1, 100_000.0));
        assert!(matches!(result, Err(BatchError::CompensationShortfall { .. })));
    }

    #[test]
    fn planning_is_deterministic() {
        let oracle = FixedOracle::default();
        let planner = Planner::new(&oracle, GAP);
        let snapshot = Snapshot {
            target: test_target(1.0, 1_000_000.0),
            workers: pool(3, 5_000.0),
        };

        for phase in [Phase::HardenFloor, Phase::SaturateCeiling, Phase::SteadyState] {
            let a = planner.plan(phase, &snapshot).unwrap();
            let b = planner.plan(phase, &snapshot).unwrap();
            assert_eq!(a, b);
        }

        let mut unprepared = snapshot.clone();
        unprepared.target = test_target(3.0, 50_000.0);
        let a = planner.plan(Phase::SaturateCeiling, &unprepared).unwrap();
        let b = planner.plan(Phase::SaturateCeiling, &unprepared).unwrap();
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }
}
