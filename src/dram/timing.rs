use crate::dram::standard::{Command, Level, Standard, NUM_COMMANDS};

/// One spacing rule: after the owning command, `cmd` may not issue until
/// `val` cycles have passed since the `dist`-th most recent owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingEntry {
    pub cmd: Command,
    pub dist: usize,
    pub val: u64,
    /// Applies to siblings of the addressed node instead of the node itself.
    pub sibling: bool,
}

/// Per-level, per-command spacing rules. Read-only once built; the controller
/// chooses which table governs each issued command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimingTable {
    levels: Vec<Vec<Vec<TimingEntry>>>,
}

impl TimingTable {
    pub fn new(num_levels: usize) -> Self {
        Self {
            levels: (0..num_levels)
                .map(|_| (0..NUM_COMMANDS).map(|_| Vec::new()).collect())
                .collect(),
        }
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn entries(&self, level: usize, cmd: Command) -> &[TimingEntry] {
        &self.levels[level][cmd.index()]
    }

    pub fn entries_mut(&mut self, level: usize, cmd: Command) -> &mut Vec<TimingEntry> {
        &mut self.levels[level][cmd.index()]
    }

    /// Longest history window any rule of `cmd` at `level` looks back over.
    pub fn max_dist(&self, level: usize, cmd: Command) -> usize {
        self.entries(level, cmd)
            .iter()
            .map(|t| t.dist)
            .max()
            .unwrap_or(0)
    }

    fn add(&mut self, level: usize, prev: &[Command], next: &[Command], dist: usize, val: u64, sibling: bool) {
        for &p in prev {
            for &n in next {
                self.entries_mut(level, p).push(TimingEntry {
                    cmd: n,
                    dist,
                    val,
                    sibling,
                });
            }
        }
    }

    /// Baseline JEDEC-style table for `spec`.
    pub fn baseline(spec: &Standard) -> Self {
        use Command::*;

        let s = &spec.speed;
        let mut t = TimingTable::new(spec.num_levels());
        let channel = spec.level_index(Level::Channel);
        let rank = spec.level_index(Level::Rank);
        let bank = spec.level_index(Level::Bank);
        let bank_group = spec
            .has_level(Level::BankGroup)
            .then(|| spec.level_index(Level::BankGroup));

        let reads = [Rd, Rda];
        let writes = [Wr, Wra];

        // channel: data bus occupancy
        t.add(channel, &reads, &reads, 1, s.n_bl, false);
        t.add(channel, &writes, &writes, 1, s.n_bl, false);

        // rank: column to column
        t.add(rank, &reads, &reads, 1, s.n_ccds, false);
        t.add(rank, &writes, &writes, 1, s.n_ccds, false);
        t.add(rank, &reads, &writes, 1, (s.n_cl + s.n_bl + 2).saturating_sub(s.n_cwl), false);
        t.add(rank, &writes, &reads, 1, s.n_cwl + s.n_bl + s.n_wtrs, false);

        // rank: switching to another rank
        t.add(rank, &reads, &reads, 1, s.n_bl + s.n_rtrs, true);
        t.add(rank, &reads, &writes, 1, (s.n_cl + s.n_bl + s.n_rtrs).saturating_sub(s.n_cwl), true);
        t.add(rank, &writes, &reads, 1, (s.n_cwl + s.n_bl + s.n_rtrs).saturating_sub(s.n_cl), true);
        t.add(rank, &writes, &writes, 1, s.n_bl + s.n_rtrs, true);

        // rank: column to precharge-all
        t.add(rank, &[Rd], &[Prea], 1, s.n_rtp, false);
        t.add(rank, &[Wr], &[Prea], 1, s.n_cwl + s.n_bl + s.n_wr, false);

        // rank: row commands
        t.add(rank, &[Act], &[Act], 1, s.n_rrds, false);
        t.add(rank, &[Act], &[Act], 4, s.n_faw, false);
        t.add(rank, &[Act], &[Prea], 1, s.n_ras, false);
        t.add(rank, &[Prea], &[Act], 1, s.n_rp, false);

        // rank: refresh
        t.add(rank, &[Act], &[Ref], 1, s.n_rc, false);
        t.add(rank, &[Pre, Prea], &[Ref], 1, s.n_rp, false);
        t.add(rank, &[Rda], &[Ref], 1, s.n_rtp + s.n_rp, false);
        t.add(rank, &[Wra], &[Ref], 1, s.n_cwl + s.n_bl + s.n_wr + s.n_rp, false);
        t.add(rank, &[Ref], &[Act, Ref, Pde, Sre], 1, s.n_rfc, false);

        // rank: power-down and self-refresh
        t.add(rank, &reads, &[Pde], 1, s.n_cl + s.n_bl + 1, false);
        t.add(rank, &writes, &[Pde], 1, s.n_cwl + s.n_bl + s.n_wr, false);
        t.add(rank, &[Act, Pre, Prea], &[Pde], 1, 1, false);
        t.add(rank, &[Pde], &[Pdx], 1, s.n_pd, false);
        t.add(rank, &[Pdx], &[Act, Pre, Prea, Rd, Rda, Wr, Wra, Ref, Pde, Sre], 1, s.n_xp, false);
        t.add(rank, &[Sre], &[Srx], 1, s.n_ckesr, false);
        t.add(rank, &[Srx], &[Act, Pre, Prea, Rd, Rda, Wr, Wra, Ref, Pde, Sre], 1, s.n_xs, false);

        // bank group: long column and activation spacing
        if let Some(bg) = bank_group {
            t.add(bg, &reads, &reads, 1, s.n_ccdl, false);
            t.add(bg, &writes, &writes, 1, s.n_ccdl, false);
            t.add(bg, &writes, &reads, 1, s.n_cwl + s.n_bl + s.n_wtrl, false);
            t.add(bg, &[Act], &[Act], 1, s.n_rrdl, false);
        }

        // bank
        t.add(bank, &[Act], &[Act], 1, s.n_rc, false);
        t.add(bank, &[Act], &[Rd, Rda, Wr, Wra], 1, s.n_rcd, false);
        t.add(bank, &[Act], &[Pre], 1, s.n_ras, false);
        t.add(bank, &[Pre], &[Act], 1, s.n_rp, false);
        t.add(bank, &[Rd], &[Pre], 1, s.n_rtp, false);
        t.add(bank, &[Wr], &[Pre], 1, s.n_cwl + s.n_bl + s.n_wr, false);
        t.add(bank, &[Rda], &[Act], 1, s.n_rtp + s.n_rp, false);
        t.add(bank, &[Wra], &[Act], 1, s.n_cwl + s.n_bl + s.n_wr + s.n_rp, false);

        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dram::standard::{OrgPreset, SpeedPreset, StandardKind};

    fn ddr4() -> Standard {
        Standard::new(StandardKind::Ddr4, OrgPreset::Ddr4_4Gb_x8, SpeedPreset::Ddr4_2400R, 1, 1)
    }

    #[test]
    fn baseline_has_act_to_read_at_bank() {
        let spec = ddr4();
        let bank = spec.level_index(Level::Bank);
        let trcd = spec
            .timing
            .entries(bank, Command::Act)
            .iter()
            .find(|t| t.cmd == Command::Rd)
            .map(|t| t.val);
        assert_eq!(trcd, Some(spec.speed.n_rcd));
    }

    #[test]
    fn faw_window_uses_distance_four() {
        let spec = ddr4();
        let rank = spec.level_index(Level::Rank);
        assert_eq!(spec.timing.max_dist(rank, Command::Act), 4);
        assert_eq!(spec.timing.max_dist(rank, Command::Srx), 1);
    }

    #[test]
    fn ddr3_has_no_bank_group_rules() {
        let spec = Standard::new(StandardKind::Ddr3, OrgPreset::Ddr3_2Gb_x8, SpeedPreset::Ddr3_1600K, 1, 1);
        assert_eq!(spec.timing.num_levels(), 5);
        let bank = spec.level_index(Level::Bank);
        assert!(spec
            .timing
            .entries(bank, Command::Act)
            .iter()
            .any(|t| t.cmd == Command::Pre && t.val == spec.speed.n_ras));
    }
}
