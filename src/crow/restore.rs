//! Decides, when a cached row closes, whether its copy must be fully
//! restored before it may be evicted.

use serde::Serialize;

use crate::dram::Standard;
use crate::Cycle;

/// Fraction of the refresh window beyond which a row's next refresh is
/// considered too far away to rely on.
const REFRESH_RISK_FRACTION: f64 = 0.4;

/// Per-rank position of the refresh sweep through the rows of a bank.
#[derive(Debug, Clone)]
pub struct RefreshRotation {
    counters: Vec<usize>,
    rows_at_once: usize,
    rows_per_bank: usize,
}

impl RefreshRotation {
    pub fn new(ranks: usize, rows_at_once: usize, rows_per_bank: usize) -> Self {
        Self {
            counters: vec![0; ranks],
            rows_at_once,
            rows_per_bank,
        }
    }

    pub fn rows_at_once(&self) -> usize {
        self.rows_at_once
    }

    /// Next row the rank's refresh will reach.
    pub fn position(&self, rank: usize) -> usize {
        self.counters[rank]
    }

    pub fn advance(&mut self, rank: usize) {
        let c = &mut self.counters[rank];
        *c += self.rows_at_once;
        if *c >= self.rows_per_bank {
            *c = 0;
        }
    }
}

/// Outcome of both checks; FR is their conjunction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RestoreCheck {
    pub refresh_risky: bool,
    pub under_restored: bool,
}

impl RestoreCheck {
    pub fn needs_full_restore(&self) -> bool {
        self.refresh_risky && self.under_restored
    }
}

#[derive(Debug, Clone)]
pub struct RestoreHeuristic {
    trefi_ns: f64,
    window_ns: f64,
    n_ras: Cycle,
    sa_size: usize,
    num_sas: usize,
    rotation: RefreshRotation,
}

impl RestoreHeuristic {
    /// `n_refi` is the refresh interval already scaled by `refresh_mult`.
    pub fn new(spec: &Standard, n_refi: Cycle, refresh_mult: f64, ranks: usize, subarrays: usize) -> Self {
        let tck = spec.speed.tck;
        let window_ms = spec.refresh_window_ms * refresh_mult;
        let ticks_in_window = (window_ms * 1_000_000.0 / tck) as u64;
        let num_refs = (ticks_in_window / n_refi).max(1);
        let rows_per_bank = spec.rows_per_bank();
        let rows_at_once = (rows_per_bank as f64 / num_refs as f64).ceil() as usize;
        Self {
            trefi_ns: n_refi as f64 * tck,
            window_ns: window_ms * 1_000_000.0,
            n_ras: spec.speed.n_ras,
            sa_size: rows_per_bank / subarrays,
            num_sas: subarrays,
            rotation: RefreshRotation::new(ranks, rows_at_once, rows_per_bank),
        }
    }

    pub fn rotation(&self) -> &RefreshRotation {
        &self.rotation
    }

    pub fn on_refresh(&mut self, rank: usize) {
        self.rotation.advance(rank);
    }

    /// Subarrays the refresh sweep still has to pass before reaching
    /// `row`'s subarray.
    pub fn subarray_distance(&self, rank: usize, row: usize) -> usize {
        let next = self.rotation.position(rank) / self.sa_size;
        let sa = row / self.sa_size;
        if next > sa {
            self.num_sas - (next - sa)
        } else {
            sa - next
        }
    }

    pub fn evaluate(&self, rank: usize, row: usize, cycles_since_act: Cycle) -> RestoreCheck {
        let sa_diff = self.subarray_distance(rank, row) as f64;
        let refs_per_sa = self.sa_size as f64 / self.rotation.rows_at_once() as f64;
        let time_to_refresh_ns = sa_diff * self.trefi_ns * refs_per_sa;
        RestoreCheck {
            refresh_risky: time_to_refresh_ns > self.window_ns * REFRESH_RISK_FRACTION,
            under_restored: cycles_since_act < self.n_ras,
        }
    }
}
