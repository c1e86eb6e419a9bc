use std::collections::VecDeque;

use anyhow::Result;
use log::{debug, info, warn};

use crate::crow::{CrowHit, CrowTable, RestoreHeuristic, TimingProfile, TimingProfiles};
use crate::ctrl::cmd_trace::CmdTrace;
use crate::ctrl::config::ControllerConfig;
use crate::ctrl::queue::{ReqHandle, RequestQueue};
use crate::ctrl::refresh::RefreshTrigger;
use crate::ctrl::request::{ReqKind, Request};
use crate::ctrl::row_policy::RowPolicy;
use crate::ctrl::row_table::RowTable;
use crate::ctrl::scheduler::{SchedView, Scheduler};
use crate::ctrl::stats::{ControllerStats, ControllerSummary};
use crate::dram::{AddrVec, Channel, Command, Level, TimingChecker};
use crate::sim::phase::SimPhase;
use crate::Cycle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueueId {
    Read,
    Write,
    Act,
    Other,
}

impl QueueId {
    fn for_kind(kind: ReqKind) -> Self {
        match kind {
            ReqKind::Read | ReqKind::Prefetch => QueueId::Read,
            ReqKind::Write => QueueId::Write,
            _ => QueueId::Other,
        }
    }
}

enum Intercept {
    Proceed { make_copy: bool },
    /// Re-activate the evicted copy's row with full restoration first.
    FullRestore(AddrVec),
    /// Close the open cached row before the write may go ahead.
    PrechargeCached(AddrVec),
}

/// Row-copy cache state. `table` is absent in upper-bound mode, where every
/// activation counts as a hit on a fully restored copy.
struct CrowState {
    table: Option<CrowTable>,
    restore: RestoreHeuristic,
    tl_dram: bool,
    evict_threshold: u64,
}

/// One channel's command scheduler.
pub struct Controller<C: TimingChecker = Channel> {
    clk: Cycle,
    channel: C,
    config: ControllerConfig,
    phase: SimPhase,
    scheduler: Box<dyn Scheduler>,
    row_policy: Box<dyn RowPolicy>,
    row_table: RowTable,
    refresh: Option<RefreshTrigger>,
    readq: RequestQueue,
    writeq: RequestQueue,
    actq: RequestQueue,
    otherq: RequestQueue,
    pending: VecDeque<Request>,
    write_mode: bool,
    write_enter: usize,
    write_exit: usize,
    draining: bool,
    row_level: usize,
    subarrays: usize,
    crow: Option<CrowState>,
    profiles: TimingProfiles,
    cmd_trace: Option<CmdTrace>,
    stats: ControllerStats,
}

impl<C: TimingChecker> Controller<C> {
    pub fn new(config: ControllerConfig, channel: C, subarrays: usize) -> Result<Self> {
        config.ensure_valid();
        let spec = channel.spec();
        let row_level = spec.level_index(Level::Row);
        let ranks = spec.count_of(Level::Rank);
        let rows = spec.rows_per_bank();
        assert!(
            subarrays > 0 && rows % subarrays == 0,
            "{rows} rows per bank do not split into {subarrays} subarrays"
        );

        let crow_cfg = config.crow;
        let (crow, profiles, n_refi) = if crow_cfg.timing_enabled() {
            let n_refi = (spec.speed.n_refi as f64 * crow_cfg.refresh_mult) as Cycle;
            let table = crow_cfg
                .table_enabled()
                .then(|| CrowTable::new(&crow_cfg, row_level, rows, subarrays));
            let state = CrowState {
                table,
                restore: RestoreHeuristic::new(spec, n_refi, crow_cfg.refresh_mult, ranks, subarrays),
                tl_dram: crow_cfg.tl_dram,
                evict_threshold: crow_cfg.evict_hit_threshold,
            };
            (Some(state), TimingProfiles::derive(spec, &crow_cfg.timing), n_refi)
        } else {
            (None, TimingProfiles::baseline_only(spec), spec.speed.n_refi)
        };

        let refresh = (!config.disable_refresh)
            .then(|| RefreshTrigger::new(n_refi, ranks));
        let cmd_trace = if config.record_cmd_trace {
            Some(CmdTrace::create(&config.cmd_trace_prefix, channel.id(), ranks)?)
        } else {
            None
        };
        let (write_enter, write_exit) = config.write_thresholds();
        let cap = config.queue_capacity;

        info!(
            "channel {}: {} {} ranks, scheduler {:?}, row policy {:?}, row copies {}",
            channel.id(),
            spec.name,
            ranks,
            config.scheduler,
            config.row_policy,
            match &crow {
                Some(c) if c.table.is_some() => "on",
                Some(_) => "upper bound",
                None => "off",
            }
        );

        Ok(Self {
            clk: 0,
            scheduler: config.scheduler.build(config.scheduler_cap),
            row_policy: config.row_policy.build(config.row_policy_timeout),
            row_table: RowTable::new(row_level),
            refresh,
            readq: RequestQueue::new(cap),
            writeq: RequestQueue::new(cap),
            // holds requests from both read and write queues
            actq: RequestQueue::new(2 * cap),
            otherq: RequestQueue::new(cap),
            pending: VecDeque::new(),
            write_mode: false,
            write_enter,
            write_exit,
            draining: false,
            row_level,
            subarrays,
            crow,
            profiles,
            cmd_trace,
            stats: ControllerStats::new(config.cores),
            phase: SimPhase::Measure,
            channel,
            config,
        })
    }

    pub fn clk(&self) -> Cycle {
        self.clk
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn row_table(&self) -> &RowTable {
        &self.row_table
    }

    pub fn crow_table(&self) -> Option<&CrowTable> {
        self.crow.as_ref().and_then(|c| c.table.as_ref())
    }

    pub fn stats(&self) -> &ControllerStats {
        &self.stats
    }

    pub fn write_mode(&self) -> bool {
        self.write_mode
    }

    pub fn read_queue_len(&self) -> usize {
        self.readq.len()
    }

    pub fn write_queue_len(&self) -> usize {
        self.writeq.len()
    }

    pub fn set_cmd_trace(&mut self, trace: CmdTrace) {
        self.cmd_trace = Some(trace);
    }

    pub fn set_phase(&mut self, phase: SimPhase) {
        self.phase = phase;
    }

    /// Input has ended: writes may go whenever no read is waiting.
    pub fn drain(&mut self) {
        self.draining = true;
    }

    pub fn end_warmup(&mut self) {
        info!("channel {}: warm-up done at cycle {}", self.channel.id(), self.clk);
        self.phase = SimPhase::Measure;
        self.stats = ControllerStats::new(self.config.cores);
    }

    pub fn pending_requests(&self) -> usize {
        self.readq.len() + self.writeq.len() + self.actq.len() + self.otherq.len() + self.pending.len()
    }

    /// The channel is serving at least one read or write.
    pub fn is_active(&self) -> bool {
        self.channel.serving_requests() > 0
    }

    pub fn is_refresh(&self) -> bool {
        self.clk <= self.channel.end_of_refreshing()
    }

    pub fn finish(&mut self) -> Result<ControllerSummary> {
        if let Some(trace) = self.cmd_trace.as_mut() {
            trace.flush()?;
        }
        Ok(self.stats.summary())
    }

    fn queue(&self, id: QueueId) -> &RequestQueue {
        match id {
            QueueId::Read => &self.readq,
            QueueId::Write => &self.writeq,
            QueueId::Act => &self.actq,
            QueueId::Other => &self.otherq,
        }
    }

    fn queue_mut(&mut self, id: QueueId) -> &mut RequestQueue {
        match id {
            QueueId::Read => &mut self.readq,
            QueueId::Write => &mut self.writeq,
            QueueId::Act => &mut self.actq,
            QueueId::Other => &mut self.otherq,
        }
    }

    fn view(&self) -> SchedView<'_> {
        SchedView {
            channel: &self.channel,
            row_table: &self.row_table,
            clk: self.clk,
        }
    }

    /// Queues `req`. Fails when its queue is full. A read to an address with
    /// a queued write is answered from the write on the next cycle.
    pub fn enqueue(&mut self, mut req: Request) -> bool {
        let id = QueueId::for_kind(req.kind);
        if self.queue(id).is_full() {
            return false;
        }
        req.arrive = self.clk;
        if req.kind.is_read_like() && self.writeq.iter().any(|(_, w)| w.addr == req.addr) {
            req.depart = self.clk + 1;
            self.pending.push_back(req);
            return true;
        }
        self.queue_mut(id).push(req).is_ok()
    }

    /// Turns a queued or in-flight prefetch of `req.addr` into a demand read.
    pub fn upgrade_prefetch(&mut self, req: &Request) -> bool {
        assert_eq!(req.kind, ReqKind::Read, "only a demand read upgrades a prefetch");
        let upgrade = |p: &mut Request| {
            p.kind = ReqKind::Read;
            p.callback = p.proc_callback.clone();
        };
        for q in [&mut self.readq, &mut self.actq] {
            if let Some((_, p)) = q
                .iter_mut()
                .find(|(_, p)| p.addr == req.addr && p.kind == ReqKind::Prefetch)
            {
                upgrade(p);
                return true;
            }
        }
        if let Some(p) = self
            .pending
            .iter_mut()
            .find(|p| p.addr == req.addr && p.kind == ReqKind::Prefetch)
        {
            upgrade(p);
            return true;
        }
        false
    }

    fn candidate(&self, id: QueueId) -> Option<(ReqHandle, Command)> {
        let q = self.queue(id);
        let view = self.view();
        let handle = self.scheduler.get_head(q, &view)?;
        let req = q.get(handle)?;
        let cmd = view.first_cmd(req);
        self.channel
            .is_ready(cmd, &req.addr_vec, self.clk)
            .then_some((handle, cmd))
    }

    fn select(&self) -> Option<(QueueId, ReqHandle, Command)> {
        if let Some((h, cmd)) = self.candidate(QueueId::Act) {
            return Some((QueueId::Act, h, cmd));
        }
        let id = if !self.otherq.is_empty() {
            QueueId::Other
        } else if self.write_mode || (self.draining && self.readq.is_empty()) {
            QueueId::Write
        } else {
            QueueId::Read
        };
        self.candidate(id).map(|(h, cmd)| (id, h, cmd))
    }

    fn tick_refresh(&mut self) {
        let Some(refresh) = self.refresh.as_mut() else {
            return;
        };
        let due = refresh.tick();
        let num_levels = self.channel.spec().num_levels();
        for rank in due {
            let req = Request::for_rank(ReqKind::Refresh, self.channel.id(), rank, num_levels);
            if self.enqueue(req) {
                if let Some(refresh) = self.refresh.as_mut() {
                    refresh.acknowledge(rank);
                }
            } else {
                debug!(
                    "channel {} rank {rank}: refresh not queued at cycle {}, retrying",
                    self.channel.id(),
                    self.clk
                );
            }
        }
    }

    fn retire_completed_read(&mut self) {
        let due = self.pending.front().is_some_and(|r| r.depart <= self.clk);
        if !due {
            return;
        }
        if let Some(req) = self.pending.pop_front() {
            // forwarded reads never reached the DRAM
            if req.depart - req.arrive > 1 {
                self.stats.record_read_latency(req.core_id, req.latency());
                self.channel.update_serving_requests(&req.addr_vec, -1);
            }
            req.complete();
        }
    }

    fn update_write_mode(&mut self) {
        if !self.write_mode {
            if self.writeq.len() >= self.write_enter {
                self.write_mode = true;
            }
        } else if self.writeq.len() <= self.write_exit && !self.readq.is_empty() {
            self.write_mode = false;
        }
    }

    fn record_first_command(&mut self, id: QueueId, handle: ReqHandle) {
        let bytes = self.channel.spec().transaction_bytes();
        let Some(req) = self.queue_mut(id).get_mut(handle) else {
            return;
        };
        if !req.is_first_command {
            return;
        }
        req.is_first_command = false;
        let (kind, core_id, addr) = (req.kind, req.core_id, req.addr_vec.clone());
        if !matches!(kind, ReqKind::Read | ReqKind::Prefetch | ReqKind::Write) {
            return;
        }
        self.channel.update_serving_requests(&addr, 1);
        let status = self.row_table.classify(&addr);
        if kind == ReqKind::Write {
            self.stats.record_first_write(core_id, status, bytes);
        } else {
            self.stats.record_first_read(core_id, status, bytes);
        }
    }

    /// Row-copy decisions taken before the scheduled command issues. Only
    /// an activation that misses a full set or a write under timing-gain
    /// mode can be diverted.
    fn crow_intercept(&mut self, cmd: Command, kind: ReqKind, addr: &[i64]) -> Intercept {
        let proceed = Intercept::Proceed { make_copy: true };
        let row_level = self.row_level;
        let Some(crow) = self.crow.as_mut() else {
            return proceed;
        };
        let (tl_dram, threshold) = (crow.tl_dram, crow.evict_threshold);
        let Some(table) = crow.table.as_mut() else {
            return proceed;
        };
        let stats = &mut self.stats.crow;

        let mut make_copy = true;
        if cmd.is_opening() {
            if !table.is_hit(addr) && table.is_full(addr) {
                match table.get_lru_entry(addr, threshold) {
                    None => {
                        assert!(!tl_dram, "timing-gain mode must always find a copy to evict");
                        make_copy = false;
                        stats.bypass_copying += 1;
                    }
                    Some(victim) if victim.fr && !tl_dram => {
                        let mut restore = AddrVec::from_slice(addr);
                        restore[row_level] = victim.row;
                        return Intercept::FullRestore(restore);
                    }
                    Some(victim) => {
                        let mut victim_addr = AddrVec::from_slice(addr);
                        victim_addr[row_level] = victim.row;
                        table.make_lru(&victim_addr, &victim);
                        stats.skip_full_restore += 1;
                    }
                }
            } else if tl_dram && kind == ReqKind::Write && table.is_cached(addr) {
                table.invalidate(addr);
                stats.tl_dram_invalidate_due_to_write += 1;
            }
        }

        if tl_dram && cmd.is_write() {
            if let Some(open_row) = self.row_table.get_open_row(addr) {
                let mut open = AddrVec::from_slice(addr);
                open[row_level] = open_row;
                // weak rows stay put; only regular copies go stale
                if table.get_cached_entry(&open).is_some_and(|e| e.total_hits != 0) {
                    return Intercept::PrechargeCached(open);
                }
            }
        }
        Intercept::Proceed { make_copy }
    }

    pub fn tick(&mut self) {
        self.clk += 1;
        self.stats
            .record_queue_lengths(self.readq.len(), self.writeq.len(), self.pending.len());

        self.retire_completed_read();

        self.tick_refresh();

        self.update_write_mode();

        let Some((id, handle, cmd)) = self.select() else {
            let victim = self.row_policy.get_victim(Command::Pre, &self.view());
            if let Some(victim) = victim {
                self.issue_cmd(Command::Pre, &victim, false, true);
            }
            return;
        };

        self.record_first_command(id, handle);

        let Some(req) = self.queue(id).get(handle) else {
            return;
        };
        let kind = req.kind;
        let addr = req.addr_vec.clone();

        let make_copy = match self.crow_intercept(cmd, kind, &addr) {
            Intercept::Proceed { make_copy } => make_copy,
            Intercept::FullRestore(victim) => {
                self.issue_cmd(cmd, &victim, true, true);
                self.stats.crow.full_restore += 1;
                return;
            }
            Intercept::PrechargeCached(open) => {
                if self.channel.is_ready(Command::Pre, &open, self.clk) {
                    self.issue_cmd(Command::Pre, &open, true, true);
                    self.stats.crow.tl_dram_precharge_cached_row_due_to_write += 1;
                } else {
                    self.stats.crow.tl_dram_precharge_failed_due_to_timing += 1;
                }
                return;
            }
        };

        self.issue_cmd(cmd, &addr, false, make_copy);

        if cmd != self.channel.spec().translate(kind) {
            if cmd.is_opening() {
                if let Some(req) = self.queue_mut(id).remove(handle) {
                    if self.actq.push(req).is_err() {
                        panic!("activated queue overflow on channel {}", self.channel.id());
                    }
                }
            }
            return;
        }

        let Some(mut req) = self.queue_mut(id).remove(handle) else {
            return;
        };
        match req.kind {
            ReqKind::Read | ReqKind::Prefetch => {
                req.depart = self.clk + self.channel.spec().read_latency;
                self.pending.push_back(req);
            }
            ReqKind::Write => self.channel.update_serving_requests(&req.addr_vec, -1),
            _ => {}
        }
    }

    /// Classifies `cmd` against the row-copy cache, updates the cache and
    /// issues `cmd` under the matching timing profile.
    fn issue_cmd(&mut self, cmd: Command, addr: &[i64], full_restore: bool, make_copy: bool) {
        assert!(
            self.channel.is_ready(cmd, addr, self.clk),
            "{} to {:?} is not legal at cycle {}",
            cmd.mnemonic(),
            addr,
            self.clk
        );

        if cmd.is_opening() && self.phase.is_measuring() && self.config.collect_row_activation_histogram {
            let sa_size = self.channel.spec().rows_per_bank() / self.subarrays;
            let row = addr[self.row_level] as usize;
            let bank = self.channel.spec().flat_bank_id(addr);
            self.stats.record_activation(bank, row / sa_size, row % sa_size);
        }

        let mut hit = CrowHit::Miss;
        let mut copy = false;
        let upperbound = self.crow.as_ref().is_some_and(|c| c.table.is_none());

        if let Some(crow) = self.crow.as_mut() {
            if cmd.is_opening() {
                let cached = match crow.table.as_ref() {
                    Some(table) => table.get_hit_entry(addr).copied(),
                    None => None,
                };
                if upperbound || cached.is_some() {
                    assert!(make_copy, "an activation that skips copying hit a cached row");
                    let fr = cached.is_some_and(|e| e.fr);
                    hit = if fr { CrowHit::Partial } else { CrowHit::Full };
                    if let Some(table) = crow.table.as_mut() {
                        table.access(addr, full_restore);
                    }
                    if !full_restore {
                        self.stats.crow.hits += 1;
                    }
                    self.stats.crow.all_hits += 1;
                    if fr {
                        self.stats.crow.hits_with_fr += 1;
                    }
                } else if let Some(table) = crow.table.as_mut() {
                    assert!(!full_restore, "full restore of a row that is not cached");
                    assert!(!crow.tl_dram || make_copy, "timing-gain mode always copies on activation");
                    if make_copy {
                        copy = true;
                        table.add_entry(addr, false);
                        self.stats.crow.copies += 1;
                    } else {
                        table.access(addr, false);
                    }
                    self.stats.crow.misses += 1;
                }
            }

            if cmd.is_write() {
                hit = match crow.table.as_ref() {
                    None => CrowHit::Full,
                    Some(table) => match table.get_hit_entry(addr) {
                        Some(e) if e.fr => CrowHit::Partial,
                        Some(_) => CrowHit::Full,
                        // a row opened before the table saw it
                        None => CrowHit::Miss,
                    },
                };
            }

            if !upperbound && cmd.is_refreshing() {
                crow.restore.on_refresh(addr[1] as usize);
            }
        }

        let tracks_fr = self.crow.as_ref().is_some_and(|c| c.table.is_some() && !c.tl_dram);
        if tracks_fr && cmd.is_closing() {
            self.set_fr_on_close(cmd, addr);
        }

        let profile = TimingProfile::select(hit, full_restore, copy);
        self.channel
            .issue(cmd, addr, self.clk, self.profiles.get(profile));

        if cmd == Command::Pre && self.row_table.get_hits(addr, true) == 0 {
            self.stats.useless_activates += 1;
        }

        self.row_table.update(cmd, addr, self.clk);

        if let Some(trace) = self.cmd_trace.as_mut() {
            let name = if cmd == Command::Act && (copy || hit != CrowHit::Miss) && !upperbound {
                "ACTD"
            } else {
                cmd.mnemonic()
            };
            let bank = (cmd.scope() != Level::Rank).then(|| self.channel.spec().flat_bank_id(addr));
            if let Err(err) = trace.record(addr[1] as usize, self.clk, name, bank) {
                warn!("command trace: {err:#}");
            }
        }

        if self.config.print_cmd_trace {
            debug!("{:>5} {:>10}: {:?}", cmd.mnemonic(), self.clk, addr);
        }
    }

    /// Decides the FR flag of every cached row `cmd` is about to close.
    fn set_fr_on_close(&mut self, cmd: Command, addr: &[i64]) {
        let banks: Vec<AddrVec> = match cmd {
            Command::Prea => self.row_table.open_rows_under(&addr[..2]),
            _ => vec![AddrVec::from_slice(addr)],
        };
        for bank in banks {
            self.set_fr_single_bank(&bank);
        }
    }

    fn set_fr_single_bank(&mut self, addr: &[i64]) {
        let Some(open_row) = self.row_table.get_open_row(addr) else {
            return;
        };
        let since_act = self.row_table.cycles_since_open(addr, self.clk).unwrap_or(0);
        let Some(crow) = self.crow.as_mut() else {
            return;
        };
        let Some(table) = crow.table.as_mut() else {
            return;
        };
        let mut cached = AddrVec::from_slice(addr);
        cached[self.row_level] = open_row;
        // rows opened before the table existed are not tracked
        if !table.is_hit(&cached) {
            return;
        }

        let check = crow.restore.evaluate(addr[1] as usize, open_row as usize, since_act);
        let fr = check.needs_full_restore();
        let s = &mut self.stats.crow;
        if fr {
            s.fr_set += 1;
        } else {
            s.fr_notset += 1;
        }
        if check.refresh_risky {
            s.fr_ref += 1;
        }
        if check.under_restored {
            s.fr_restore += 1;
        }
        table.set_fr(&cached, fr);
    }
}
