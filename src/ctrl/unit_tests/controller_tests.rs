use super::*;
use crate::ctrl::row_policy::RowPolicyKind;
use crate::dram::{RowStatus, TimingChecker};
use crate::sim::phase::SimPhase;

#[test]
fn enqueue_rejects_when_queue_full() {
    let mut ctrl = controller(ControllerConfig {
        queue_capacity: 2,
        ..quiet_config()
    });
    assert!(ctrl.enqueue(request(ReqKind::Read, 1, 0)));
    assert!(ctrl.enqueue(request(ReqKind::Read, 2, 0)));
    assert!(!ctrl.enqueue(request(ReqKind::Read, 3, 0)));
    // the write queue is separate
    assert!(ctrl.enqueue(request(ReqKind::Write, 3, 0)));
    assert_eq!(ctrl.pending_requests(), 3);
}

#[test]
fn read_after_queued_write_is_forwarded() {
    let mut ctrl = controller(quiet_config());
    let (done, cb) = counter();
    assert!(ctrl.enqueue(request(ReqKind::Write, 7, 3)));
    assert!(ctrl.enqueue(request(ReqKind::Read, 7, 3).with_callback(cb)));
    assert_eq!(ctrl.read_queue_len(), 0);

    ctrl.tick();
    assert_eq!(done.get(), 1);
    // answered without touching the DRAM
    assert!(ctrl.row_table().is_empty());
    assert_eq!(ctrl.stats().reads_served, 0);
    assert_eq!(ctrl.write_queue_len(), 1);
}

#[test]
fn read_completes_after_activate_and_read_latency() {
    let mut ctrl = controller(quiet_config());
    let (done, cb) = counter();
    assert!(ctrl.enqueue(request(ReqKind::Read, 42, 8).with_callback(cb)));
    run(&mut ctrl, 200);
    assert_eq!(done.get(), 1);
    let s = ctrl.stats();
    assert_eq!(s.reads_served, 1);
    assert_eq!(s.row.misses, 1);
    assert_eq!(s.read_transaction_bytes, 64);
    let spec = ctrl.channel().spec();
    // ACT on cycle 1, RD after tRCD, data after the read latency
    assert_eq!(s.read_latency_sum, 1 + spec.speed.n_rcd + spec.read_latency);
    assert!(!ctrl.is_active());
}

#[test]
fn second_read_to_open_row_is_a_hit() {
    let mut ctrl = controller(quiet_config());
    serve(&mut ctrl, request(ReqKind::Read, 42, 0));
    serve(&mut ctrl, request(ReqKind::Read, 42, 8));
    serve(&mut ctrl, request(ReqKind::Read, 43, 0));
    let row = ctrl.stats().row;
    assert_eq!((row.misses, row.hits, row.conflicts), (1, 1, 1));
    assert_eq!(ctrl.row_table().classify(&[0, 0, 0, 0, 43, 0]), RowStatus::Hit);
}

#[test]
fn lone_write_is_served_once_draining() {
    let mut ctrl = controller(quiet_config());
    assert!(ctrl.enqueue(request(ReqKind::Write, 9, 0)));
    run(&mut ctrl, 100);
    assert_eq!(ctrl.write_queue_len(), 1);

    ctrl.drain();
    run(&mut ctrl, 100);
    assert_eq!(ctrl.pending_requests(), 0);
    let s = ctrl.stats();
    assert_eq!(s.per_core[0].write.misses, 1);
    assert_eq!(s.write_transaction_bytes, 64);
    assert!(!ctrl.is_active());
}

#[test]
fn write_mode_follows_watermarks() {
    let mut ctrl = controller(ControllerConfig {
        queue_capacity: 10,
        ..quiet_config()
    });
    for col in 0..8 {
        assert!(ctrl.enqueue(request(ReqKind::Write, 5, col * 8)));
    }
    assert!(ctrl.enqueue(bank_request(ReqKind::Read, 1, 0, 77, 0)));
    assert!(!ctrl.write_mode());

    ctrl.tick();
    assert!(ctrl.write_mode());

    for _ in 0..1000 {
        if !ctrl.write_mode() {
            break;
        }
        // reads wait while writes have priority
        assert_eq!(ctrl.read_queue_len(), 1);
        ctrl.tick();
    }
    assert!(!ctrl.write_mode());
    assert_eq!(ctrl.write_queue_len(), 2);
}

#[test]
fn write_mode_holds_while_no_read_waits() {
    let mut ctrl = controller(ControllerConfig {
        queue_capacity: 10,
        ..quiet_config()
    });
    for col in 0..8 {
        assert!(ctrl.enqueue(request(ReqKind::Write, 5, col * 8)));
    }
    ctrl.tick();
    assert!(ctrl.write_mode());

    // the write queue empties below the low watermark but no read waits
    for _ in 0..1000 {
        if ctrl.pending_requests() == 0 {
            break;
        }
        ctrl.tick();
        assert!(ctrl.write_mode());
    }
    assert_eq!(ctrl.pending_requests(), 0);
    run(&mut ctrl, 10);
    assert!(ctrl.write_mode());

    // refill between the watermarks, then let a read arrive
    for col in 0..4 {
        assert!(ctrl.enqueue(request(ReqKind::Write, 6, col * 8)));
    }
    assert!(ctrl.enqueue(bank_request(ReqKind::Read, 1, 0, 77, 0)));
    ctrl.tick();
    assert!(ctrl.write_mode());

    for _ in 0..1000 {
        if !ctrl.write_mode() {
            break;
        }
        assert_eq!(ctrl.read_queue_len(), 1);
        ctrl.tick();
    }
    assert!(!ctrl.write_mode());
    assert_eq!(ctrl.write_queue_len(), 2);
}

#[test]
fn write_mode_not_entered_below_high_watermark() {
    let mut ctrl = controller(ControllerConfig {
        queue_capacity: 10,
        ..quiet_config()
    });
    for col in 0..7 {
        assert!(ctrl.enqueue(request(ReqKind::Write, 5, col * 8)));
    }
    assert!(ctrl.enqueue(bank_request(ReqKind::Read, 1, 0, 77, 0)));
    for _ in 0..300 {
        ctrl.tick();
        assert!(!ctrl.write_mode());
    }
    assert_eq!(ctrl.stats().reads_served, 1);
    // reads had the bus and nothing forced the writes out
    assert_eq!(ctrl.write_queue_len(), 7);
}

#[test]
fn write_then_read_same_address_forwards_and_write_misses() {
    let mut ctrl = controller(quiet_config());
    let latency = Rc::new(Cell::new(0));
    let seen = Rc::clone(&latency);
    let cb: crate::ctrl::request::Callback = Rc::new(move |r: &Request| seen.set(r.latency()));
    assert!(ctrl.enqueue(request(ReqKind::Write, 12, 16)));
    assert!(ctrl.enqueue(request(ReqKind::Read, 12, 16).with_callback(cb)));

    ctrl.tick();
    assert_eq!(latency.get(), 1);

    ctrl.drain();
    run(&mut ctrl, 200);
    assert_eq!(ctrl.pending_requests(), 0);
    let s = ctrl.stats();
    assert_eq!(s.reads_served, 0);
    let row = s.row;
    assert_eq!((row.misses, row.hits, row.conflicts), (1, 0, 0));
    let write = s.per_core[0].write;
    assert_eq!((write.misses, write.hits, write.conflicts), (1, 0, 0));
    assert_eq!(s.write_transaction_bytes, 64);
}

#[test]
fn refresh_retries_while_other_queue_is_full() {
    let (mut ctrl, trace) = traced_controller(ControllerConfig {
        queue_capacity: 1,
        ..ControllerConfig::default()
    });
    let n_refi = ctrl.channel().spec().speed.n_refi;
    let num_levels = ctrl.channel().spec().num_levels();
    run(&mut ctrl, n_refi - 20);
    assert!(ctrl.enqueue(request(ReqKind::Read, 11, 0)));
    ctrl.tick();
    // held behind tRAS of the open row past the periodic refresh
    assert!(ctrl.enqueue(Request::for_rank(ReqKind::Refresh, 0, 0, num_levels)));
    run(&mut ctrl, 1000);

    let refreshes: Vec<_> = trace.lines().into_iter().filter(|l| l.ends_with(",REF")).collect();
    assert_eq!(refreshes.len(), 2);
    let first: u64 = refreshes[0].split(',').next().unwrap().parse().unwrap();
    assert!(first > n_refi);
    assert_eq!(ctrl.pending_requests(), 0);
}

#[test]
fn refresh_is_injected_every_interval() {
    let (mut ctrl, trace) = traced_controller(ControllerConfig::default());
    let n_refi = ctrl.channel().spec().speed.n_refi;
    run(&mut ctrl, 2 * n_refi + 10);
    let refreshes: Vec<_> = trace.lines().into_iter().filter(|l| l.ends_with(",REF")).collect();
    assert_eq!(refreshes.len(), 2);
    assert_eq!(refreshes[0], format!("{n_refi},REF"));
    assert_eq!(ctrl.pending_requests(), 0);
}

#[test]
fn refresh_closes_open_rows_first() {
    let (mut ctrl, trace) = traced_controller(ControllerConfig::default());
    serve(&mut ctrl, request(ReqKind::Read, 11, 0));
    let n_refi = ctrl.channel().spec().speed.n_refi;
    run(&mut ctrl, n_refi);
    let names: Vec<String> = trace
        .lines()
        .iter()
        .map(|l| l.split(',').nth(1).unwrap_or_default().to_string())
        .collect();
    assert_eq!(names, vec!["ACT", "RD", "PREA", "REF"]);
    assert!(ctrl.row_table().is_empty());
}

#[test]
fn closed_policy_precharges_idle_rows() {
    let (mut ctrl, trace) = traced_controller(ControllerConfig {
        row_policy: RowPolicyKind::Closed,
        ..quiet_config()
    });
    serve(&mut ctrl, bank_request(ReqKind::Read, 2, 3, 100, 0));
    let lines = trace.lines();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].ends_with(",ACT,11"));
    assert!(lines[2].ends_with(",PRE,11"));
    assert!(ctrl.row_table().is_empty());
    assert_eq!(ctrl.stats().useless_activates, 0);
}

#[test]
fn prefetch_upgrade_switches_callback() {
    let mut ctrl = controller(quiet_config());
    let (prefetched, pf_cb) = counter();
    let (demanded, demand_cb) = counter();
    let pf = request(ReqKind::Prefetch, 30, 0)
        .with_callback(pf_cb)
        .with_proc_callback(demand_cb);
    let addr = pf.addr;
    assert!(ctrl.enqueue(pf));

    assert!(!ctrl.upgrade_prefetch(&Request::new(addr + 64, ReqKind::Read, 0)));
    assert!(ctrl.upgrade_prefetch(&Request::new(addr, ReqKind::Read, 0)));
    // already a demand read
    assert!(!ctrl.upgrade_prefetch(&Request::new(addr, ReqKind::Read, 0)));

    run(&mut ctrl, 200);
    assert_eq!(prefetched.get(), 0);
    assert_eq!(demanded.get(), 1);
}

#[test]
fn activation_histogram_skips_warmup() {
    let mut ctrl = controller(ControllerConfig {
        collect_row_activation_histogram: true,
        ..quiet_config()
    });
    ctrl.set_phase(SimPhase::Warmup);
    serve(&mut ctrl, bank_request(ReqKind::Read, 1, 2, 1000, 0));
    assert!(ctrl.stats().row_act_hist.is_empty());
    assert_eq!(ctrl.stats().reads_served, 1);

    ctrl.end_warmup();
    assert_eq!(ctrl.stats().reads_served, 0);
    serve(&mut ctrl, bank_request(ReqKind::Read, 1, 2, 1001, 0));
    let hist = &ctrl.stats().row_act_hist;
    // 512 rows per subarray
    assert_eq!(hist[&6][&1][&489], 1);
    assert_eq!(hist.len(), 1);
}

#[test]
fn finish_reports_averages() {
    let mut ctrl = controller(quiet_config());
    serve(&mut ctrl, request(ReqKind::Read, 1, 0));
    serve(&mut ctrl, request(ReqKind::Read, 1, 8));
    let summary = ctrl.finish().unwrap();
    assert_eq!(summary.stats.reads_served, 2);
    assert!(summary.read_latency_avg > ctrl.channel().spec().read_latency as f64);
    assert_eq!(summary.read_latency_avg_per_core.len(), 1);
}
