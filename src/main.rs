use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use crowsim::sim::config::{RunConfig, SimMode};
use crowsim::sim::top::Sim;

#[derive(Parser)]
#[command(version, about)]
struct CrowsimArgs {
    #[arg(help="Path to config.toml")]
    config_path: PathBuf,
    #[arg(long, help="Override DRAM trace path")]
    trace: Option<PathBuf>,
    #[arg(long, help="Override run mode (dram, synthetic)")]
    mode: Option<SimMode>,
    #[arg(long, help="Override summary JSON output path")]
    stats_out: Option<PathBuf>,
    #[arg(long, help="Override cycle limit")]
    timeout: Option<u64>,
}

pub fn main() -> Result<()> {
    env_logger::init();

    let argv = CrowsimArgs::parse();
    let mut run = RunConfig::load(&argv.config_path)?;

    // override toml configs with argv
    if let Some(trace) = argv.trace {
        run.sim.trace = trace;
    }
    run.sim.mode = argv.mode.unwrap_or(run.sim.mode);
    run.sim.stats_out = argv.stats_out.or(run.sim.stats_out);
    run.sim.timeout = argv.timeout.unwrap_or(run.sim.timeout);

    let mut sim = Sim::new(run)?;
    let summary = sim.simulate()?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
