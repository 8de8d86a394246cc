//! Completion-time arithmetic for waves.
//!
//! A steady-state cycle lands its four operations on a fixed timeline:
//!
//! ```text
//!            L (longest natural duration)
//! |──────────────────────────────|
//! hack          ─────────────────▶|            completes at T
//! weaken-hack ────────────────────▶ +G         completes at T + G
//! grow              ───────────────▶ +2G       completes at T + 2G
//! weaken-grow   ─────────────────────▶ +3G     completes at T + 3G
//! ```
//!
//! All values are `Duration`s so the gap check is exact.

use std::time::Duration;

use cadence_core::OpKind;

use crate::error::{BatchError, BatchResult};

/// Position of an operation within a steady-state cycle, in completion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Hack,
    WeakenHack,
    Grow,
    WeakenGrow,
}

impl Slot {
    pub const ALL: [Slot; 4] = [Slot::Hack, Slot::WeakenHack, Slot::Grow, Slot::WeakenGrow];

    /// Number of gap units after the first completion.
    pub fn offset(&self) -> u32 {
        match self {
            Slot::Hack => 0,
            Slot::WeakenHack => 1,
            Slot::Grow => 2,
            Slot::WeakenGrow => 3,
        }
    }

    pub fn kind(&self) -> OpKind {
        match self {
            Slot::Hack => OpKind::Hack,
            Slot::WeakenHack | Slot::WeakenGrow => OpKind::Weaken,
            Slot::Grow => OpKind::Grow,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Slot::Hack => "hack",
            Slot::WeakenHack => "weaken-hack",
            Slot::Grow => "grow",
            Slot::WeakenGrow => "weaken-grow",
        }
    }
}

/// Number of completions per cycle.
pub const SLOTS_PER_CYCLE: u32 = Slot::ALL.len() as u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotTiming {
    pub delay: Duration,
    pub duration: Duration,
}

impl SlotTiming {
    pub fn end(&self) -> Duration {
        self.delay + self.duration
    }
}

/// Delays and durations of one cycle, normalized so the earliest start is 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleTimings {
    slots: [SlotTiming; 4],
    gap: Duration,
    longest: Duration,
}

impl CycleTimings {
    /// Place the four completions `gap` apart and validate the result.
    pub fn compute(
        hack: Duration,
        weaken: Duration,
        grow: Duration,
        gap: Duration,
    ) -> BatchResult<Self> {
        let duration_of = |slot: Slot| match slot.kind() {
            OpKind::Hack => hack,
            OpKind::Weaken => weaken,
            OpKind::Grow => grow,
        };
        let longest = hack.max(weaken).max(grow);

        let raw: [Duration; 4] =
            Slot::ALL.map(|slot| longest - duration_of(slot) + gap * slot.offset());
        let min_delay = raw.iter().copied().min().unwrap_or_default();

        let mut slots = [SlotTiming {
            delay: Duration::ZERO,
            duration: Duration::ZERO,
        }; 4];
        for (i, slot) in Slot::ALL.iter().enumerate() {
            slots[i] = SlotTiming {
                delay: raw[i] - min_delay,
                duration: duration_of(*slot),
            };
        }

        let timings = Self {
            slots,
            gap,
            longest,
        };
        timings.validate()?;
        Ok(timings)
    }

    /// Every consecutive pair of completions must be exactly one gap apart.
    pub fn validate(&self) -> BatchResult<()> {
        for pair in Slot::ALL.windows(2) {
            let (prev, next) = (self.slot(pair[0]).end(), self.slot(pair[1]).end());
            let actual = next.saturating_sub(prev);
            if next < prev || actual != self.gap {
                return Err(BatchError::TimingViolation {
                    slot: pair[1].label(),
                    actual,
                    expected: self.gap,
                });
            }
        }
        Ok(())
    }

    pub fn slot(&self, slot: Slot) -> SlotTiming {
        self.slots[slot.offset() as usize]
    }

    /// `L`: the longest natural duration of the three operations.
    pub fn longest(&self) -> Duration {
        self.longest
    }

    pub fn gap(&self) -> Duration {
        self.gap
    }

    /// Spacing between the dispatch offsets of consecutive cycles.
    pub fn cycle_spacing(&self) -> Duration {
        self.gap * SLOTS_PER_CYCLE
    }

    /// How many cycles can be started inside `L`. At least one.
    pub fn time_bound(&self) -> u32 {
        let spacing = self.cycle_spacing().as_nanos();
        if spacing == 0 {
            return 1;
        }
        let bound = self.longest.as_nanos() / spacing;
        bound.clamp(1, u128::from(u32::MAX)) as u32
    }
}

/// Delays for one worker's grow/weaken pair in the saturate phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepTiming {
    pub weaken_delay: Duration,
    pub grow_delay: Duration,
}

/// Align completion times of per-worker `(weaken, grow)` duration pairs.
///
/// Every pair finishes around the pool-wide longest duration, with grow
/// landing before its weaken companion. When a grow has at least one gap of
/// slack it is pulled forward; otherwise the weaken is pushed back instead.
pub fn align_prep(durations: &[(Duration, Duration)], gap: Duration) -> Vec<PrepTiming> {
    let max_finish = durations
        .iter()
        .map(|(weaken, grow)| *weaken.max(grow))
        .max()
        .unwrap_or_default();

    durations
        .iter()
        .map(|(weaken, grow)| {
            let mut weaken_delay = max_finish - *weaken;
            let mut grow_delay = max_finish - *grow;
            if grow_delay >= gap {
                grow_delay -= gap;
            } else {
                weaken_delay += gap;
            }
            PrepTiming {
                weaken_delay,
                grow_delay,
            }
        })
        .collect()
}
