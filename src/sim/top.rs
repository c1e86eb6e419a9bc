use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;
use log::{info, warn};

use crate::ctrl::request::{ReqKind, Request};
use crate::memory::Memory;
use crate::sim::config::{RunConfig, SimConfig, SimMode};
use crate::sim::perf_log::{write_summary, LatencyHistogram, RunSummary};
use crate::sim::phase::SimPhase;
use crate::sim::trace::{DramTrace, RequestSource};
use crate::sim::traffic::TrafficGen;
use crate::Cycle;

/// Drives a request source into the memory system one request per cycle.
pub struct Sim {
    config: SimConfig,
    memory: Memory,
    source: Box<dyn RequestSource>,
    latencies: Rc<RefCell<LatencyHistogram>>,
    stalled: Option<Request>,
    sent: u64,
    clk: Cycle,
}

impl Sim {
    pub fn new(run: RunConfig) -> Result<Self> {
        let source: Box<dyn RequestSource> = match run.sim.mode {
            SimMode::Dram => Box::new(DramTrace::open(&run.sim.trace)?),
            SimMode::Synthetic => Box::new(TrafficGen::new(run.sim.traffic.clone())),
        };
        Self::with_source(run, source)
    }

    pub fn with_source(run: RunConfig, source: Box<dyn RequestSource>) -> Result<Self> {
        let mut memory = Memory::new(&run.dram, &run.controller)?;
        if run.sim.warmup_requests > 0 {
            memory.set_phase(SimPhase::Warmup);
        }
        Ok(Self {
            config: run.sim,
            memory,
            source,
            latencies: Rc::new(RefCell::new(LatencyHistogram::default())),
            stalled: None,
            sent: 0,
            clk: 0,
        })
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    fn make_request(&self, addr: u64, kind: ReqKind) -> Request {
        let req = Request::new(addr, kind, 0);
        if kind == ReqKind::Write {
            return req;
        }
        let hist = Rc::clone(&self.latencies);
        req.with_callback(Rc::new(move |r: &Request| hist.borrow_mut().record(r.latency())))
    }

    /// Offers at most one request to the memory this cycle. Returns `false`
    /// once the source is exhausted and nothing is waiting to be retried.
    fn feed(&mut self) -> Result<bool> {
        let req = match self.stalled.take() {
            Some(req) => req,
            None => match self.source.next_request()? {
                Some((addr, kind)) => self.make_request(addr, kind),
                None => return Ok(false),
            },
        };
        if !self.memory.send(req.clone()) {
            self.stalled = Some(req);
            return Ok(true);
        }
        self.sent += 1;
        if self.sent == self.config.warmup_requests {
            info!("warm-up finished after {} requests at cycle {}", self.sent, self.clk);
            self.memory.end_warmup();
            *self.latencies.borrow_mut() = LatencyHistogram::default();
        }
        Ok(true)
    }

    pub fn simulate(&mut self) -> Result<RunSummary> {
        let mut feeding = true;
        let mut timed_out = false;
        loop {
            if feeding {
                feeding = self.feed()?;
                if !feeding {
                    info!("input exhausted after {} requests at cycle {}", self.sent, self.clk);
                    self.memory.drain();
                }
            }
            if !feeding && self.memory.pending_requests() == 0 {
                break;
            }
            if self.clk >= self.config.timeout {
                warn!("cycle limit {} reached with {} requests pending", self.config.timeout, self.memory.pending_requests());
                timed_out = true;
                break;
            }
            self.memory.tick();
            self.clk += 1;
        }

        let summary = RunSummary {
            cycles: self.clk,
            requests_sent: self.sent,
            timed_out,
            read_latency_hist: *self.latencies.borrow(),
            memory: self.memory.finish()?,
        };
        if let Some(path) = &self.config.stats_out {
            write_summary(path, &summary)?;
            info!("summary written to {}", path.display());
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::traffic::{TrafficConfig, TrafficPattern};
    use std::io::Cursor;

    fn run_config() -> RunConfig {
        let mut run = RunConfig::default();
        run.controller.disable_refresh = true;
        run
    }

    #[test]
    fn trace_run_serves_every_request() {
        let text = "0x0 R\n0x40 R\n0x80 W\n0x10000000 R\n";
        let source = Box::new(DramTrace::from_reader(Cursor::new(text.as_bytes().to_vec())));
        let mut sim = Sim::with_source(run_config(), source).unwrap();
        let summary = sim.simulate().unwrap();
        assert!(!summary.timed_out);
        assert_eq!(summary.requests_sent, 4);
        assert_eq!(summary.read_latency_hist.total(), 3);
        let stats = &summary.memory.total.stats;
        assert_eq!(stats.reads_served, 3);
        assert_eq!(stats.write_transaction_bytes, 64);
        assert_eq!(sim.memory().pending_requests(), 0);
    }

    #[test]
    fn warmup_discards_early_statistics() {
        let mut run = run_config();
        run.sim.warmup_requests = 2;
        let text = "0x0 R\n0x40 R\n0x80 R\n";
        let source = Box::new(DramTrace::from_reader(Cursor::new(text.as_bytes().to_vec())));
        let mut sim = Sim::with_source(run, source).unwrap();
        let summary = sim.simulate().unwrap();
        assert_eq!(summary.requests_sent, 3);
        // both warm-up reads retire after the reset, but only the second
        // issues its first command after it
        let stats = &summary.memory.total.stats;
        assert_eq!(stats.reads_served, 3);
        assert_eq!(stats.row.total(), 2);
        assert_eq!(stats.row.hits, 2);
    }

    #[test]
    fn synthetic_run_with_row_copies_finishes() {
        let mut run = run_config();
        run.sim.mode = SimMode::Synthetic;
        run.sim.traffic = TrafficConfig {
            pattern: TrafficPattern::HotRow,
            requests: 2000,
            seed: 3,
            ..TrafficConfig::default()
        };
        run.controller.crow.copy_rows_per_sa = 4;
        let mut sim = Sim::new(run).unwrap();
        let summary = sim.simulate().unwrap();
        assert!(!summary.timed_out);
        assert_eq!(summary.requests_sent, 2000);
        let crow = summary.memory.total.stats.crow;
        assert!(crow.copies > 0);
        assert!(crow.all_hits > 0);
    }

    #[test]
    fn cycle_limit_stops_run() {
        let mut run = run_config();
        run.sim.mode = SimMode::Synthetic;
        run.sim.timeout = 50;
        run.sim.traffic.requests = 10_000;
        let summary = Sim::new(run).unwrap().simulate().unwrap();
        assert!(summary.timed_out);
        assert_eq!(summary.cycles, 50);
    }
}
