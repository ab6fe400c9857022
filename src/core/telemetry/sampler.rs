//! Raw cumulative counter sampling and delta computation.
//!
//! Counters are monotonic since boot but can reset (reboot, radio reset, wrap)
//! or be reported as unavailable. Every delta goes through [`delta`], which
//! never returns a negative or implausible value.

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::platform::CounterSource;

/// Largest byte delta accepted for a single counter in a single step.
pub const SANITY_CEILING_BYTES: u64 = 2_000_000_000;

/// One reading of the four raw counters. `None` is the "unavailable" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub total_rx: Option<u64>,
    pub total_tx: Option<u64>,
    pub cellular_rx: Option<u64>,
    pub cellular_tx: Option<u64>,
    pub captured_at: DateTime<Local>,
}

impl CounterSnapshot {
    pub fn has_totals(&self) -> bool {
        self.total_rx.is_some() && self.total_tx.is_some()
    }
}

/// Why a field's delta was forced to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterAnomaly {
    Unavailable,
    Reset { prev: u64, curr: u64 },
    SanityViolation { delta: u64 },
}

/// Byte deltas between two snapshots, all non-negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterDeltas {
    pub total_rx: u64,
    pub total_tx: u64,
    pub cellular_rx: u64,
    pub cellular_tx: u64,
}

impl CounterDeltas {
    pub fn total(&self) -> (u64, u64) {
        (self.total_rx, self.total_tx)
    }

    pub fn cellular(&self) -> (u64, u64) {
        (self.cellular_rx, self.cellular_tx)
    }
}

/// Delta of a single counter field.
pub fn delta(prev: Option<u64>, curr: Option<u64>) -> (u64, Option<CounterAnomaly>) {
    let (Some(prev), Some(curr)) = (prev, curr) else {
        return (0, Some(CounterAnomaly::Unavailable));
    };

    if curr < prev {
        return (0, Some(CounterAnomaly::Reset { prev, curr }));
    }

    let diff = curr - prev;
    if diff > SANITY_CEILING_BYTES {
        return (0, Some(CounterAnomaly::SanityViolation { delta: diff }));
    }

    (diff, None)
}

/// Holds the last snapshot so consecutive readings can be turned into deltas.
#[derive(Debug, Default)]
pub struct CounterSampler {
    baseline: Option<CounterSnapshot>,
}

impl CounterSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read all four counters from the source.
    pub fn sample(source: &dyn CounterSource, at: DateTime<Local>) -> CounterSnapshot {
        source.refresh();
        let total = source.read_total_bytes();
        let cellular = source.read_cellular_bytes();

        CounterSnapshot {
            total_rx: total.map(|(rx, _)| rx),
            total_tx: total.map(|(_, tx)| tx),
            cellular_rx: cellular.map(|(rx, _)| rx),
            cellular_tx: cellular.map(|(_, tx)| tx),
            captured_at: at,
        }
    }

    pub fn baseline(&self) -> Option<&CounterSnapshot> {
        self.baseline.as_ref()
    }

    /// Deltas from the stored baseline to `curr`, without moving the baseline.
    /// Returns `None` when there is no baseline yet.
    pub fn peek(&self, curr: &CounterSnapshot) -> Option<CounterDeltas> {
        let prev = self.baseline.as_ref()?;

        let fields = [
            ("total_rx", prev.total_rx, curr.total_rx),
            ("total_tx", prev.total_tx, curr.total_tx),
            ("cellular_rx", prev.cellular_rx, curr.cellular_rx),
            ("cellular_tx", prev.cellular_tx, curr.cellular_tx),
        ];

        let mut out = [0u64; 4];
        for (slot, (name, prev_value, curr_value)) in out.iter_mut().zip(fields) {
            let (value, anomaly) = delta(prev_value, curr_value);
            match anomaly {
                Some(CounterAnomaly::Reset { prev, curr }) => {
                    log::debug!("{} counter reset ({} -> {}), rebasing", name, prev, curr);
                }
                Some(CounterAnomaly::SanityViolation { delta }) => {
                    log::warn!(
                        "{} delta of {} bytes exceeds sanity ceiling, clamped to 0",
                        name,
                        delta
                    );
                }
                Some(CounterAnomaly::Unavailable) => {
                    log::trace!("{} counter unavailable", name);
                }
                None => {}
            }
            *slot = value;
        }

        Some(CounterDeltas {
            total_rx: out[0],
            total_tx: out[1],
            cellular_rx: out[2],
            cellular_tx: out[3],
        })
    }

    /// Replace the baseline with `curr`, whatever it holds.
    pub fn resync(&mut self, curr: CounterSnapshot) {
        self.baseline = Some(curr);
    }

    /// `peek` followed by `resync`: the baseline always ends up at `curr`,
    /// including after a reset.
    pub fn advance(&mut self, curr: CounterSnapshot) -> Option<CounterDeltas> {
        let deltas = self.peek(&curr);
        self.resync(curr);
        deltas
    }
}
