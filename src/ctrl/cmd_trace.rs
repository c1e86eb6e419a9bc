use std::fs::File;
use std::io::{BufWriter, Write};

use anyhow::{Context, Result};

/// Per-rank command trace sinks, one `cycle,CMD[,bank]` line per command.
pub struct CmdTrace {
    sinks: Vec<Box<dyn Write>>,
}

impl CmdTrace {
    /// Opens `<prefix>chan-<channel>-rank-<r>.cmdtrace` for every rank.
    pub fn create(prefix: &str, channel: usize, ranks: usize) -> Result<Self> {
        let sinks = (0..ranks)
            .map(|rank| {
                let path = format!("{prefix}chan-{channel}-rank-{rank}.cmdtrace");
                File::create(&path)
                    .map(|f| Box::new(BufWriter::new(f)) as Box<dyn Write>)
                    .with_context(|| format!("cannot create command trace {path}"))
            })
            .collect::<Result<_>>()?;
        Ok(Self { sinks })
    }

    pub fn from_writers(sinks: Vec<Box<dyn Write>>) -> Self {
        Self { sinks }
    }

    /// Rank-wide commands (`bank == None`) carry no bank field.
    pub fn record(&mut self, rank: usize, clk: u64, name: &str, bank: Option<i64>) -> Result<()> {
        let sink = self
            .sinks
            .get_mut(rank)
            .with_context(|| format!("no command trace for rank {rank}"))?;
        match bank {
            Some(bank) => writeln!(sink, "{clk},{name},{bank}")?,
            None => writeln!(sink, "{clk},{name}")?,
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        for sink in self.sinks.iter_mut() {
            sink.flush().context("cannot flush command trace")?;
        }
        Ok(())
    }
}
