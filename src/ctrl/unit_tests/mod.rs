use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use crate::ctrl::cmd_trace::tests::SharedBuf;
use crate::ctrl::cmd_trace::CmdTrace;
use crate::ctrl::config::ControllerConfig;
use crate::ctrl::controller::Controller;
use crate::ctrl::request::{ReqKind, Request};
use crate::dram::{AddrVec, Channel, OrgPreset, SpeedPreset, Standard, StandardKind};

#[cfg(test)]
mod controller_tests;

pub(super) const SUBARRAYS: usize = 64;

pub(super) fn ddr4_channel() -> Channel {
    let spec = Standard::new(StandardKind::Ddr4, OrgPreset::Ddr4_4Gb_x8, SpeedPreset::Ddr4_2400R, 1, 1);
    Channel::new(Arc::new(spec), 0)
}

pub(super) fn quiet_config() -> ControllerConfig {
    ControllerConfig {
        disable_refresh: true,
        ..ControllerConfig::default()
    }
}

pub(super) fn controller(config: ControllerConfig) -> Controller {
    Controller::new(config, ddr4_channel(), SUBARRAYS).unwrap()
}

/// Controller whose rank-0 command trace lands in the returned buffer.
pub(super) fn traced_controller(config: ControllerConfig) -> (Controller, SharedBuf) {
    let mut ctrl = controller(config);
    let buf = SharedBuf::default();
    ctrl.set_cmd_trace(CmdTrace::from_writers(vec![Box::new(buf.clone())]));
    (ctrl, buf)
}

/// Request to (bank group 0, bank 0, `row`, `col`) of rank 0.
pub(super) fn request(kind: ReqKind, row: i64, col: i64) -> Request {
    bank_request(kind, 0, 0, row, col)
}

pub(super) fn bank_request(kind: ReqKind, bg: i64, bank: i64, row: i64, col: i64) -> Request {
    let mut req = Request::new(((bg * 4 + bank) << 32 | row << 10 | col) as u64, kind, 0);
    req.addr_vec = AddrVec::from_slice(&[0, 0, bg, bank, row, col]);
    req
}

pub(super) fn counter() -> (Rc<Cell<u32>>, crate::ctrl::request::Callback) {
    let count = Rc::new(Cell::new(0));
    let c = Rc::clone(&count);
    (count, Rc::new(move |_: &Request| c.set(c.get() + 1)))
}

pub(super) fn run(ctrl: &mut Controller, cycles: u64) {
    for _ in 0..cycles {
        ctrl.tick();
    }
}

/// Enqueues `req` and ticks until the controller is empty again.
pub(super) fn serve(ctrl: &mut Controller, req: Request) {
    assert!(ctrl.enqueue(req));
    for _ in 0..1000 {
        if ctrl.pending_requests() == 0 {
            // let closing policies act on the now idle bank
            run(ctrl, 100);
            return;
        }
        ctrl.tick();
    }
    panic!("request not served within 1000 cycles");
}

pub(super) fn activations(trace: &SharedBuf) -> Vec<String> {
    trace
        .lines()
        .into_iter()
        .filter(|l| l.split(',').nth(1).is_some_and(|c| c.starts_with("ACT")))
        .collect()
}
