use serde::Serialize;

use crate::crow::policy::CrowTimingFactors;
use crate::dram::{Command, Level, Standard, TimingTable};

/// How an activation or write relates to the row-copy cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CrowHit {
    Miss,
    /// Hit on a copy that still needs a full restore.
    Partial,
    /// Hit on a fully restored copy.
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TimingProfile {
    Baseline,
    PartialHitPartialRestore,
    PartialHitFullRestore,
    FullHitPartialRestore,
    FullHitFullRestore,
    Copy,
}

impl TimingProfile {
    pub fn select(hit: CrowHit, full_restore: bool, copy: bool) -> Self {
        match hit {
            CrowHit::Miss if copy => TimingProfile::Copy,
            CrowHit::Miss => TimingProfile::Baseline,
            CrowHit::Partial | CrowHit::Full => {
                assert!(!copy, "a cached row is never copied again");
                match (hit, full_restore) {
                    (CrowHit::Partial, false) => TimingProfile::PartialHitPartialRestore,
                    (CrowHit::Partial, true) => TimingProfile::PartialHitFullRestore,
                    (_, false) => TimingProfile::FullHitPartialRestore,
                    (_, true) => TimingProfile::FullHitFullRestore,
                }
            }
        }
    }
}

/// The baseline table and the five copy-aware variants derived from it.
#[derive(Debug, Clone)]
pub struct TimingProfiles {
    baseline: TimingTable,
    partial_hit_partial_restore: TimingTable,
    partial_hit_full_restore: TimingTable,
    full_hit_partial_restore: TimingTable,
    full_hit_full_restore: TimingTable,
    copy: TimingTable,
}

fn scale(val: u64, factor: f64) -> u64 {
    (val as f64 * factor).ceil() as u64
}

/// Copies `spec`'s baseline and rescales the activation, restoration and
/// write-recovery spacings.
pub fn derive_table(spec: &Standard, trcd_factor: f64, tras_factor: f64, twr_factor: f64, tfaw_factor: f64) -> TimingTable {
    let s = &spec.speed;
    let rank = spec.level_index(Level::Rank);
    let bank = spec.level_index(Level::Bank);
    let mut t = spec.timing.clone();
    let mut trcd = 0;
    let mut tras = 0;

    for e in t.entries_mut(bank, Command::Act) {
        if matches!(e.cmd, Command::Rd | Command::Rda) {
            e.val = scale(e.val, trcd_factor);
            trcd = e.val;
        }
        if matches!(e.cmd, Command::Wr | Command::Wra) {
            e.val = scale(e.val, trcd_factor);
        }
    }

    for e in t.entries_mut(rank, Command::Act) {
        if e.cmd == Command::Prea {
            e.val = scale(e.val, tras_factor);
            tras = e.val;
        }
    }
    for e in t.entries_mut(bank, Command::Act) {
        if e.cmd == Command::Pre {
            e.val = scale(e.val, tras_factor);
        }
    }

    assert!(trcd != 0 && tras != 0, "baseline has no tRCD or tRAS rule");
    for e in t.entries_mut(bank, Command::Act) {
        if e.cmd == Command::Act {
            e.val = trcd + tras;
        }
    }

    let write_recovery = s.n_cwl + s.n_bl + scale(s.n_wr, twr_factor);
    for e in t.entries_mut(rank, Command::Wr) {
        if e.cmd == Command::Prea {
            e.val = write_recovery;
        }
    }
    for e in t.entries_mut(bank, Command::Wr) {
        if e.cmd == Command::Pre {
            e.val = write_recovery;
        }
    }
    for e in t.entries_mut(bank, Command::Wra) {
        if e.cmd == Command::Act {
            e.val = write_recovery + s.n_rp;
        }
    }

    for e in t.entries_mut(rank, Command::Act) {
        if e.cmd == Command::Act && e.dist == 4 {
            e.val = scale(e.val, tfaw_factor);
        }
    }
    t
}

impl TimingProfiles {
    pub fn derive(spec: &Standard, f: &CrowTimingFactors) -> Self {
        Self {
            baseline: spec.timing.clone(),
            partial_hit_partial_restore: derive_table(
                spec,
                f.trcd_partial_hit,
                f.tras_partial_hit_partial_restore,
                f.twr_partial_restore,
                1.0,
            ),
            partial_hit_full_restore: derive_table(
                spec,
                f.trcd_partial_hit,
                f.tras_partial_hit_full_restore,
                f.twr_full_restore,
                1.0,
            ),
            full_hit_partial_restore: derive_table(
                spec,
                f.trcd_full_hit,
                f.tras_full_hit_partial_restore,
                f.twr_partial_restore,
                1.0,
            ),
            full_hit_full_restore: derive_table(
                spec,
                f.trcd_full_hit,
                f.tras_full_hit_full_restore,
                f.twr_full_restore,
                1.0,
            ),
            copy: derive_table(spec, 1.0, f.tras_copy_full_restore, f.twr_full_restore, 1.0),
        }
    }

    /// Only the baseline; every profile resolves to it.
    pub fn baseline_only(spec: &Standard) -> Self {
        let t = spec.timing.clone();
        Self {
            baseline: t.clone(),
            partial_hit_partial_restore: t.clone(),
            partial_hit_full_restore: t.clone(),
            full_hit_partial_restore: t.clone(),
            full_hit_full_restore: t.clone(),
            copy: t,
        }
    }

    pub fn get(&self, profile: TimingProfile) -> &TimingTable {
        match profile {
            TimingProfile::Baseline => &self.baseline,
            TimingProfile::PartialHitPartialRestore => &self.partial_hit_partial_restore,
            TimingProfile::PartialHitFullRestore => &self.partial_hit_full_restore,
            TimingProfile::FullHitPartialRestore => &self.full_hit_partial_restore,
            TimingProfile::FullHitFullRestore => &self.full_hit_full_restore,
            TimingProfile::Copy => &self.copy,
        }
    }
}
