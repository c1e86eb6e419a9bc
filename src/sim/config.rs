use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use log::warn;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use toml::*;

use crate::ctrl::config::ControllerConfig;
use crate::dram::{MappingScheme, OrgPreset, SpeedPreset, Standard, StandardKind};
use crate::sim::traffic::TrafficConfig;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SimMode {
    /// Replay a `<hex addr> <R|W>` trace file.
    #[default]
    Dram,
    /// Generate requests from `[sim.traffic]`.
    Synthetic,
}

impl FromStr for SimMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "dram" => Ok(Self::Dram),
            "synthetic" => Ok(Self::Synthetic),
            _ => Err(format!(
                "unsupported mode '{}', expected one of: dram, synthetic",
                value
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimConfig {
    pub mode: SimMode,
    pub trace: PathBuf,
    /// Requests sent before statistics start counting; zero disables warm-up.
    pub warmup_requests: u64,
    /// Cycle limit.
    pub timeout: u64,
    pub stats_out: Option<PathBuf>,
    pub traffic: TrafficConfig,
}

pub trait Config: DeserializeOwned + Default {
    fn from_section(section: Option<&Value>) -> Self {
        match section {
            Some(value) => value.clone().try_into().expect("cannot deserialize config"),
            None => {
                warn!("config section not found");
                Self::default()
            }
        }
    }
}

impl Config for SimConfig {}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            mode: SimMode::Dram,
            trace: PathBuf::new(),
            warmup_requests: 0,
            timeout: 10000000,
            stats_out: None,
            traffic: TrafficConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct DramConfig {
    pub standard: StandardKind,
    pub org: OrgPreset,
    pub speed: SpeedPreset,
    pub channels: usize,
    pub ranks: usize,
    pub subarrays: usize,
    pub mapping: MappingScheme,
}

impl Config for DramConfig {}

impl Default for DramConfig {
    fn default() -> Self {
        Self {
            standard: StandardKind::Ddr4,
            org: OrgPreset::Ddr4_4Gb_x8,
            speed: SpeedPreset::Ddr4_2400R,
            channels: 1,
            ranks: 1,
            subarrays: 64,
            mapping: MappingScheme::ChRaBaRoCo,
        }
    }
}

impl DramConfig {
    pub fn ensure_valid(&self) {
        assert!(self.channels.is_power_of_two(), "channels must be a power of two");
        assert!(self.ranks.is_power_of_two(), "ranks must be a power of two");
        assert!(self.subarrays > 0, "subarrays must be > 0");
        let ddr3 = matches!(self.org, OrgPreset::Ddr3_2Gb_x8) && matches!(self.speed, SpeedPreset::Ddr3_1600K);
        let ddr4 = matches!(self.org, OrgPreset::Ddr4_4Gb_x8) && matches!(self.speed, SpeedPreset::Ddr4_2400R);
        match self.standard {
            StandardKind::Ddr3 => assert!(ddr3, "DDR3 needs DDR3 org and speed presets"),
            StandardKind::Ddr4 => assert!(ddr4, "DDR4 needs DDR4 org and speed presets"),
        }
    }

    pub fn build_standard(&self) -> Standard {
        Standard::new(self.standard, self.org, self.speed, self.channels, self.ranks)
    }
}

/// Every section of a run configuration file.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    pub sim: SimConfig,
    pub dram: DramConfig,
    pub controller: ControllerConfig,
}

impl RunConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let table: Table = toml::from_str(text).context("cannot parse config toml")?;
        let config = Self {
            sim: SimConfig::from_section(table.get("sim")),
            dram: DramConfig::from_section(table.get("dram")),
            controller: ControllerConfig::from_section(table.get("controller")),
        };
        config.dram.ensure_valid();
        config.controller.ensure_valid();
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&text)
    }
}
