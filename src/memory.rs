use std::sync::Arc;

use anyhow::Result;
use log::info;
use serde::Serialize;

use crate::ctrl::config::ControllerConfig;
use crate::ctrl::controller::Controller;
use crate::ctrl::request::Request;
use crate::ctrl::stats::{ControllerStats, ControllerSummary};
use crate::dram::{AddressMapper, Channel, Standard};
use crate::sim::config::DramConfig;
use crate::sim::phase::SimPhase;

/// Front end over one controller per channel.
pub struct Memory {
    spec: Arc<Standard>,
    mapper: AddressMapper,
    ctrls: Vec<Controller>,
}

#[derive(Debug, Serialize)]
pub struct MemorySummary {
    pub per_channel: Vec<ControllerSummary>,
    pub total: ControllerSummary,
}

impl Memory {
    pub fn new(dram: &DramConfig, controller: &ControllerConfig) -> Result<Self> {
        dram.ensure_valid();
        let spec = Arc::new(dram.build_standard());
        let mapper = AddressMapper::new(&spec, dram.mapping);
        let ctrls = (0..dram.channels)
            .map(|id| {
                let channel = Channel::new(Arc::clone(&spec), id);
                Controller::new(controller.clone(), channel, dram.subarrays)
            })
            .collect::<Result<Vec<_>>>()?;
        info!(
            "{} memory: {} channel(s), {} rank(s), {:?} mapping",
            spec.name, dram.channels, dram.ranks, dram.mapping
        );
        Ok(Self { spec, mapper, ctrls })
    }

    pub fn spec(&self) -> &Standard {
        &self.spec
    }

    pub fn controllers(&self) -> &[Controller] {
        &self.ctrls
    }

    fn route(&self, req: &mut Request) -> usize {
        req.addr_vec = self.mapper.map(req.addr);
        req.addr_vec[0] as usize
    }

    /// Maps `req` and queues it at its channel. `false` when that queue is
    /// full; the caller retries later.
    pub fn send(&mut self, mut req: Request) -> bool {
        let ch = self.route(&mut req);
        self.ctrls[ch].enqueue(req)
    }

    pub fn upgrade_prefetch(&mut self, req: &Request) -> bool {
        let mut req = req.clone();
        let ch = self.route(&mut req);
        self.ctrls[ch].upgrade_prefetch(&req)
    }

    pub fn tick(&mut self) {
        self.ctrls.iter_mut().for_each(Controller::tick);
    }

    pub fn pending_requests(&self) -> usize {
        self.ctrls.iter().map(Controller::pending_requests).sum()
    }

    pub fn set_phase(&mut self, phase: SimPhase) {
        self.ctrls.iter_mut().for_each(|c| c.set_phase(phase));
    }

    pub fn end_warmup(&mut self) {
        self.ctrls.iter_mut().for_each(Controller::end_warmup);
    }

    pub fn drain(&mut self) {
        self.ctrls.iter_mut().for_each(Controller::drain);
    }

    pub fn finish(&mut self) -> Result<MemorySummary> {
        let per_channel = self
            .ctrls
            .iter_mut()
            .map(Controller::finish)
            .collect::<Result<Vec<_>>>()?;
        let mut total = ControllerStats::default();
        for summary in &per_channel {
            total += &summary.stats;
        }
        Ok(MemorySummary {
            total: total.summary(),
            per_channel,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctrl::request::ReqKind;
    use std::cell::Cell;
    use std::rc::Rc;

    fn memory(channels: usize) -> Memory {
        let dram = DramConfig {
            channels,
            ..DramConfig::default()
        };
        let ctrl = ControllerConfig {
            disable_refresh: true,
            ..ControllerConfig::default()
        };
        Memory::new(&dram, &ctrl).unwrap()
    }

    #[test]
    fn requests_route_by_channel_bits() {
        let mut mem = memory(2);
        // channel is the most significant field under the default mapping
        let top = 1u64 << 32;
        assert!(mem.send(Request::new(0x40, ReqKind::Read, 0)));
        assert!(mem.send(Request::new(top | 0x40, ReqKind::Read, 0)));
        assert!(mem.send(Request::new(top | 0x80, ReqKind::Read, 0)));
        assert_eq!(mem.controllers()[0].read_queue_len(), 1);
        assert_eq!(mem.controllers()[1].read_queue_len(), 2);
    }

    #[test]
    fn reads_complete_and_totals_aggregate() {
        let mut mem = memory(2);
        let done = Rc::new(Cell::new(0));
        for addr in [0x0u64, 1 << 32] {
            let d = Rc::clone(&done);
            let req = Request::new(addr, ReqKind::Read, 0).with_callback(Rc::new(move |_: &Request| d.set(d.get() + 1)));
            assert!(mem.send(req));
        }
        for _ in 0..200 {
            mem.tick();
        }
        assert_eq!(done.get(), 2);
        assert_eq!(mem.pending_requests(), 0);
        let summary = mem.finish().unwrap();
        assert_eq!(summary.per_channel.len(), 2);
        assert_eq!(summary.total.stats.reads_served, 2);
        assert_eq!(summary.total.stats.cycles, 200);
        assert_eq!(summary.total.read_latency_avg, summary.per_channel[0].read_latency_avg);
    }

    #[test]
    fn prefetch_upgrade_reaches_owning_channel() {
        let mut mem = memory(2);
        let addr = (1u64 << 32) | 0x1000;
        assert!(mem.send(Request::new(addr, ReqKind::Prefetch, 0)));
        assert!(mem.upgrade_prefetch(&Request::new(addr, ReqKind::Read, 0)));
        assert!(!mem.upgrade_prefetch(&Request::new(0x1000, ReqKind::Read, 0)));
    }
}
