//! Domain types shared by the planner and the controller.
//!
//! Snapshots are plain values: they are rebuilt from the collaborators at
//! the start of every wave and never mutated by the scheduler.

use std::fmt;
use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::provider::{TargetMetrics, WorkerCapacity};

/// Hardening values closer than this are considered equal.
pub const SECURITY_DELTA: f64 = 0.1;

/// Resource values closer than this are considered equal.
pub const MONEY_DELTA: f64 = 1000.0;

// ── Operations ─────────────────────────────────────────────────────

/// The three remote operations a job can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    /// Lowers the target's hardening.
    Weaken,
    /// Raises the target's available resource (and its hardening).
    Grow,
    /// Extracts resource from the target (and raises its hardening).
    Hack,
}

impl OpKind {
    pub const ALL: [OpKind; 3] = [OpKind::Weaken, OpKind::Grow, OpKind::Hack];

    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Weaken => "weaken",
            OpKind::Grow => "grow",
            OpKind::Hack => "hack",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One value per operation kind, indexable by `OpKind`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PerOp<T> {
    pub weaken: T,
    pub grow: T,
    pub hack: T,
}

impl<T> PerOp<T> {
    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> PerOp<U> {
        PerOp {
            weaken: f(&self.weaken),
            grow: f(&self.grow),
            hack: f(&self.hack),
        }
    }
}

impl<T> Index<OpKind> for PerOp<T> {
    type Output = T;

    fn index(&self, kind: OpKind) -> &T {
        match kind {
            OpKind::Weaken => &self.weaken,
            OpKind::Grow => &self.grow,
            OpKind::Hack => &self.hack,
        }
    }
}

impl<T> IndexMut<OpKind> for PerOp<T> {
    fn index_mut(&mut self, kind: OpKind) -> &mut T {
        match kind {
            OpKind::Weaken => &mut self.weaken,
            OpKind::Grow => &mut self.grow,
            OpKind::Hack => &mut self.hack,
        }
    }
}

/// The executable unit behind an operation and its fixed footprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpProfile {
    /// Reference the execution sink launches (script path, binary, ...).
    pub executable: String,
    /// Memory one thread of this operation occupies on a worker.
    pub memory_per_thread: f64,
}

/// Profiles for all three operation kinds.
pub type OpProfiles = PerOp<OpProfile>;

// ── Snapshot errors ────────────────────────────────────────────────

/// A collaborator returned values that violate a snapshot invariant.
#[derive(Debug, Error, PartialEq)]
pub enum SnapshotError {
    #[error("target {target}: hardening {hardening} is below its floor {floor}")]
    HardeningBelowFloor {
        target: String,
        hardening: f64,
        floor: f64,
    },

    #[error("target {target}: resource {available} outside 0..={max}")]
    ResourceOutOfRange {
        target: String,
        available: f64,
        max: f64,
    },

    #[error("target {target}: extraction fraction {fraction} must be in (0, 1]")]
    ExtractionFraction { target: String, fraction: f64 },

    #[error("target {target}: metric {metric} is not a finite number")]
    NotFinite { target: String, metric: &'static str },

    #[error("worker {worker}: parallelism must be at least 1")]
    ZeroParallelism { worker: String },

    #[error("worker {worker}: negative memory figure")]
    NegativeMemory { worker: String },
}

// ── Target ─────────────────────────────────────────────────────────

/// Snapshot of the target's mutable metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetState {
    pub name: String,
    pub hardening: f64,
    pub hardening_floor: f64,
    pub resource_available: f64,
    pub resource_max: f64,
    /// Fraction of `resource_max` each steady-state cycle extracts.
    pub extraction_fraction: f64,
}

impl TargetState {
    /// Build a snapshot from provider metrics, enforcing the invariants
    /// `floor <= hardening` and `0 <= available <= max`.
    pub fn from_metrics(
        name: &str,
        metrics: TargetMetrics,
        extraction_fraction: f64,
    ) -> Result<Self, SnapshotError> {
        let finite = [
            ("hardening", metrics.hardening),
            ("hardening_floor", metrics.hardening_floor),
            ("resource_available", metrics.resource_available),
            ("resource_max", metrics.resource_max),
        ];
        for (metric, value) in finite {
            if !value.is_finite() {
                return Err(SnapshotError::NotFinite {
                    target: name.to_string(),
                    metric,
                });
            }
        }

        if metrics.hardening < metrics.hardening_floor {
            return Err(SnapshotError::HardeningBelowFloor {
                target: name.to_string(),
                hardening: metrics.hardening,
                floor: metrics.hardening_floor,
            });
        }

        if metrics.resource_available < 0.0 || metrics.resource_available > metrics.resource_max {
            return Err(SnapshotError::ResourceOutOfRange {
                target: name.to_string(),
                available: metrics.resource_available,
                max: metrics.resource_max,
            });
        }

        if !(extraction_fraction > 0.0 && extraction_fraction <= 1.0) {
            return Err(SnapshotError::ExtractionFraction {
                target: name.to_string(),
                fraction: extraction_fraction,
            });
        }

        Ok(Self {
            name: name.to_string(),
            hardening: metrics.hardening,
            hardening_floor: metrics.hardening_floor,
            resource_available: metrics.resource_available,
            resource_max: metrics.resource_max,
            extraction_fraction,
        })
    }

    /// Hardening that weaken still has to remove to reach the floor.
    pub fn hardening_gap(&self) -> f64 {
        self.hardening - self.hardening_floor
    }

    /// Growth factor that restores the resource to its maximum, never below 1.
    pub fn growth_multiplier(&self) -> f64 {
        (self.resource_max / (self.resource_available + 1.0)).max(1.0)
    }

    pub fn is_at_floor(&self) -> bool {
        (self.hardening_floor - self.hardening).abs() < SECURITY_DELTA
    }

    pub fn is_at_ceiling(&self) -> bool {
        (self.resource_available - self.resource_max).abs() < MONEY_DELTA
    }

    /// Weaken threads that close the whole hardening gap, given the
    /// hardening one thread removes.
    pub fn floor_threads(&self, weaken_per_thread: f64) -> u32 {
        if self.hardening_gap() <= 0.0 || weaken_per_thread <= 0.0 {
            return 0;
        }
        (self.hardening_gap() / weaken_per_thread).ceil() as u32
    }
}

// ── Worker ─────────────────────────────────────────────────────────

/// Snapshot of one compute node's capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    pub name: String,
    pub total_memory: f64,
    pub used_memory: f64,
    /// Floor the scheduler never consumes.
    pub reserved_memory: f64,
    /// Multiplies grow/weaken effectiveness.
    pub parallelism: u32,
    pub memory_per_thread: PerOp<f64>,
}

impl WorkerSnapshot {
    pub fn from_capacity(
        name: &str,
        capacity: WorkerCapacity,
        reserved_memory: f64,
        profiles: &OpProfiles,
    ) -> Result<Self, SnapshotError> {
        if capacity.parallelism == 0 {
            return Err(SnapshotError::ZeroParallelism {
                worker: name.to_string(),
            });
        }
        if capacity.total_memory < 0.0 || capacity.used_memory < 0.0 || reserved_memory < 0.0 {
            return Err(SnapshotError::NegativeMemory {
                worker: name.to_string(),
            });
        }

        Ok(Self {
            name: name.to_string(),
            total_memory: capacity.total_memory,
            used_memory: capacity.used_memory,
            reserved_memory,
            parallelism: capacity.parallelism,
            memory_per_thread: profiles.map(|p| p.memory_per_thread),
        })
    }

    /// `total - used - reserved`. May be negative when the reservation is
    /// already eaten into; callers check before allocating.
    pub fn available_memory(&self) -> f64 {
        self.total_memory - self.used_memory - self.reserved_memory
    }

    /// Memory `threads` threads of `kind` occupy on this worker.
    pub fn memory_cost(&self, kind: OpKind, threads: u32) -> f64 {
        f64::from(threads) * self.memory_per_thread[kind]
    }

    /// How many threads of `kind` fit into the available memory.
    pub fn max_threads(&self, kind: OpKind) -> u32 {
        let per_thread = self.memory_per_thread[kind];
        if per_thread <= 0.0 {
            return 0;
        }
        (self.available_memory() / per_thread).floor().max(0.0) as u32
    }
}
