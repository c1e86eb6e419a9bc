use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::ctrl::request::ReqKind;
use crate::dram::timing::TimingTable;

/// Topology levels an address vector can carry. A standard picks an ordered
/// subset; `Row` and `Column` are always the last two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Level {
    Channel,
    Rank,
    BankGroup,
    Bank,
    Row,
    Column,
}

pub const NUM_COMMANDS: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, FromPrimitive, Serialize)]
pub enum Command {
    Act,
    Pre,
    Prea,
    Rd,
    Wr,
    Rda,
    Wra,
    Ref,
    Pde,
    Pdx,
    Sre,
    Srx,
}

impl Command {
    pub const ALL: [Command; NUM_COMMANDS] = [
        Command::Act,
        Command::Pre,
        Command::Prea,
        Command::Rd,
        Command::Wr,
        Command::Rda,
        Command::Wra,
        Command::Ref,
        Command::Pde,
        Command::Pdx,
        Command::Sre,
        Command::Srx,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(idx: usize) -> Option<Self> {
        Self::from_usize(idx)
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Command::Act => "ACT",
            Command::Pre => "PRE",
            Command::Prea => "PREA",
            Command::Rd => "RD",
            Command::Wr => "WR",
            Command::Rda => "RDA",
            Command::Wra => "WRA",
            Command::Ref => "REF",
            Command::Pde => "PDE",
            Command::Pdx => "PDX",
            Command::Sre => "SRE",
            Command::Srx => "SRX",
        }
    }

    pub fn is_opening(self) -> bool {
        matches!(self, Command::Act)
    }

    pub fn is_closing(self) -> bool {
        matches!(self, Command::Pre | Command::Prea | Command::Rda | Command::Wra)
    }

    pub fn is_accessing(self) -> bool {
        matches!(self, Command::Rd | Command::Wr | Command::Rda | Command::Wra)
    }

    pub fn is_refreshing(self) -> bool {
        matches!(self, Command::Ref)
    }

    pub fn is_write(self) -> bool {
        matches!(self, Command::Wr | Command::Wra)
    }

    /// Deepest level whose state the command touches.
    pub fn scope(self) -> Level {
        match self {
            Command::Act => Level::Row,
            Command::Pre => Level::Bank,
            Command::Rd | Command::Wr | Command::Rda | Command::Wra => Level::Column,
            Command::Prea
            | Command::Ref
            | Command::Pde
            | Command::Pdx
            | Command::Sre
            | Command::Srx => Level::Rank,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StandardKind {
    Ddr3,
    #[default]
    Ddr4,
}

#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
pub enum OrgPreset {
    #[serde(rename = "DDR3_2Gb_x8")]
    Ddr3_2Gb_x8,
    #[default]
    #[serde(rename = "DDR4_4Gb_x8")]
    Ddr4_4Gb_x8,
}

#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
pub enum SpeedPreset {
    #[serde(rename = "DDR3_1600K")]
    Ddr3_1600K,
    #[default]
    #[serde(rename = "DDR4_2400R")]
    Ddr4_2400R,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SpeedEntry {
    pub rate: u64,
    pub freq: f64,
    /// Clock period in nanoseconds.
    pub tck: f64,
    pub n_bl: u64,
    pub n_ccds: u64,
    pub n_ccdl: u64,
    pub n_rtrs: u64,
    pub n_cl: u64,
    pub n_rcd: u64,
    pub n_rp: u64,
    pub n_cwl: u64,
    pub n_ras: u64,
    pub n_rc: u64,
    pub n_rtp: u64,
    pub n_wtrs: u64,
    pub n_wtrl: u64,
    pub n_wr: u64,
    pub n_rrds: u64,
    pub n_rrdl: u64,
    pub n_faw: u64,
    pub n_rfc: u64,
    pub n_refi: u64,
    pub n_pd: u64,
    pub n_xp: u64,
    pub n_ckesr: u64,
    pub n_xs: u64,
}

impl SpeedPreset {
    pub fn entry(self) -> SpeedEntry {
        match self {
            SpeedPreset::Ddr3_1600K => SpeedEntry {
                rate: 1600,
                freq: 800.0,
                tck: 1.25,
                n_bl: 4,
                n_ccds: 4,
                n_ccdl: 4,
                n_rtrs: 2,
                n_cl: 11,
                n_rcd: 11,
                n_rp: 11,
                n_cwl: 8,
                n_ras: 28,
                n_rc: 39,
                n_rtp: 6,
                n_wtrs: 6,
                n_wtrl: 6,
                n_wr: 12,
                n_rrds: 5,
                n_rrdl: 5,
                n_faw: 24,
                n_rfc: 128,
                n_refi: 6240,
                n_pd: 4,
                n_xp: 5,
                n_ckesr: 5,
                n_xs: 136,
            },
            SpeedPreset::Ddr4_2400R => SpeedEntry {
                rate: 2400,
                freq: 1200.0,
                tck: 0.833,
                n_bl: 4,
                n_ccds: 4,
                n_ccdl: 6,
                n_rtrs: 2,
                n_cl: 16,
                n_rcd: 16,
                n_rp: 16,
                n_cwl: 12,
                n_ras: 39,
                n_rc: 55,
                n_rtp: 9,
                n_wtrs: 3,
                n_wtrl: 9,
                n_wr: 18,
                n_rrds: 4,
                n_rrdl: 6,
                n_faw: 26,
                n_rfc: 313,
                n_refi: 9363,
                n_pd: 6,
                n_xp: 8,
                n_ckesr: 7,
                n_xs: 325,
            },
        }
    }
}

/// Runtime description of a DRAM standard: topology, speed bin, command
/// translation and the baseline timing table.
#[derive(Debug, Clone)]
pub struct Standard {
    pub kind: StandardKind,
    pub name: &'static str,
    pub levels: Vec<Level>,
    /// Child count per level, indexed like `levels`.
    pub count: Vec<usize>,
    pub speed: SpeedEntry,
    pub channel_width: u64,
    pub prefetch_size: u64,
    pub read_latency: u64,
    pub refresh_window_ms: f64,
    pub timing: TimingTable,
}

impl Standard {
    pub fn new(
        kind: StandardKind,
        org: OrgPreset,
        speed: SpeedPreset,
        channels: usize,
        ranks: usize,
    ) -> Self {
        let (name, levels, banks): (&'static str, Vec<Level>, Vec<usize>) = match kind {
            StandardKind::Ddr3 => (
                "DDR3",
                vec![Level::Channel, Level::Rank, Level::Bank, Level::Row, Level::Column],
                vec![8],
            ),
            StandardKind::Ddr4 => (
                "DDR4",
                vec![
                    Level::Channel,
                    Level::Rank,
                    Level::BankGroup,
                    Level::Bank,
                    Level::Row,
                    Level::Column,
                ],
                vec![4, 4],
            ),
        };
        let (rows, columns) = match org {
            OrgPreset::Ddr3_2Gb_x8 => (1usize << 15, 1usize << 10),
            OrgPreset::Ddr4_4Gb_x8 => (1usize << 15, 1usize << 10),
        };
        let mut count = vec![channels.max(1), ranks.max(1)];
        count.extend(banks);
        count.push(rows);
        count.push(columns);

        let speed = speed.entry();
        let mut spec = Self {
            kind,
            name,
            levels,
            count,
            speed,
            channel_width: 64,
            prefetch_size: 8,
            read_latency: speed.n_cl + speed.n_bl,
            refresh_window_ms: 64.0,
            timing: TimingTable::default(),
        };
        spec.timing = TimingTable::baseline(&spec);
        spec
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn has_level(&self, level: Level) -> bool {
        self.levels.contains(&level)
    }

    /// Position of `level` in the address vector. Panics on a level the
    /// standard does not have.
    pub fn level_index(&self, level: Level) -> usize {
        self.levels
            .iter()
            .position(|&l| l == level)
            .unwrap_or_else(|| panic!("{} has no {:?} level", self.name, level))
    }

    pub fn count_of(&self, level: Level) -> usize {
        self.count[self.level_index(level)]
    }

    pub fn rows_per_bank(&self) -> usize {
        self.count_of(Level::Row)
    }

    /// Bytes moved by one column command.
    pub fn transaction_bytes(&self) -> u64 {
        self.prefetch_size * self.channel_width / 8
    }

    pub fn translate(&self, kind: ReqKind) -> Command {
        match kind {
            ReqKind::Read | ReqKind::Prefetch => Command::Rd,
            ReqKind::Write => Command::Wr,
            ReqKind::Refresh => Command::Ref,
            ReqKind::PowerDown => Command::Pde,
            ReqKind::SelfRefresh => Command::Sre,
            ReqKind::Extension => Command::Rd,
        }
    }

    /// Flat bank id within a rank, as written to command traces.
    pub fn flat_bank_id(&self, addr: &[i64]) -> i64 {
        let bank = addr[self.level_index(Level::Bank)];
        if self.has_level(Level::BankGroup) {
            addr[self.level_index(Level::BankGroup)] * self.count_of(Level::Bank) as i64 + bank
        } else {
            bank
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ddr4_levels_and_counts() {
        let spec = Standard::new(StandardKind::Ddr4, OrgPreset::Ddr4_4Gb_x8, SpeedPreset::Ddr4_2400R, 2, 1);
        assert_eq!(spec.num_levels(), 6);
        assert_eq!(spec.count_of(Level::Channel), 2);
        assert_eq!(spec.count_of(Level::BankGroup), 4);
        assert_eq!(spec.level_index(Level::Row), 4);
        assert_eq!(spec.read_latency, 20);
        assert_eq!(spec.transaction_bytes(), 64);
    }

    #[test]
    fn command_index_round_trips() {
        for cmd in Command::ALL {
            assert_eq!(Command::from_index(cmd.index()), Some(cmd));
        }
        assert_eq!(Command::from_index(NUM_COMMANDS), None);
    }

    #[test]
    fn flat_bank_id_folds_bank_groups() {
        let spec = Standard::new(StandardKind::Ddr4, OrgPreset::Ddr4_4Gb_x8, SpeedPreset::Ddr4_2400R, 1, 1);
        assert_eq!(spec.flat_bank_id(&[0, 0, 2, 3, 10, 0]), 11);
        let ddr3 = Standard::new(StandardKind::Ddr3, OrgPreset::Ddr3_2Gb_x8, SpeedPreset::Ddr3_1600K, 1, 1);
        assert_eq!(ddr3.flat_bank_id(&[0, 0, 5, 10, 0]), 5);
    }

    #[test]
    fn closing_and_opening_are_disjoint() {
        for cmd in Command::ALL {
            assert!(!(cmd.is_opening() && cmd.is_closing()), "{cmd:?}");
        }
    }
}
