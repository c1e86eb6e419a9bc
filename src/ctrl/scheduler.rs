use serde::{Deserialize, Serialize};

use crate::ctrl::queue::{ReqHandle, RequestQueue};
use crate::ctrl::request::Request;
use crate::ctrl::row_table::RowTable;
use crate::dram::{Command, Level, RowStatus, TimingChecker};
use crate::Cycle;

/// Read-only view of controller state handed to the pluggable policies.
pub struct SchedView<'a> {
    pub channel: &'a dyn TimingChecker,
    pub row_table: &'a RowTable,
    pub clk: Cycle,
}

impl SchedView<'_> {
    pub fn first_cmd(&self, req: &Request) -> Command {
        let cmd = self.channel.spec().translate(req.kind);
        self.channel.decode(cmd, &req.addr_vec)
    }

    pub fn is_ready(&self, req: &Request) -> bool {
        self.channel.is_ready(self.first_cmd(req), &req.addr_vec, self.clk)
    }

    fn row_status(&self, req: &Request) -> RowStatus {
        let cmd = self.channel.spec().translate(req.kind);
        self.channel.row_status(cmd, &req.addr_vec)
    }

    pub fn is_row_hit(&self, req: &Request) -> bool {
        self.row_status(req) == RowStatus::Hit
    }

    pub fn is_row_open(&self, req: &Request) -> bool {
        self.row_status(req) != RowStatus::Miss
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerKind {
    Fcfs,
    Frfcfs,
    FrfcfsCap,
    #[default]
    FrfcfsPriorHit,
}

impl SchedulerKind {
    pub fn build(self, cap: u64) -> Box<dyn Scheduler> {
        match self {
            SchedulerKind::Fcfs => Box::new(Fcfs),
            SchedulerKind::Frfcfs => Box::new(Frfcfs),
            SchedulerKind::FrfcfsCap => Box::new(FrfcfsCap { cap }),
            SchedulerKind::FrfcfsPriorHit => Box::new(FrfcfsPriorHit),
        }
    }
}

/// Picks the request whose next command the controller should try.
pub trait Scheduler {
    fn get_head(&self, q: &RequestQueue, view: &SchedView) -> Option<ReqHandle>;
}

/// Fold `q` with a pairwise preference; `prefer(a, b)` is true when `a`
/// wins. Ties keep the earlier arrival.
fn pick(
    q: &RequestQueue,
    mut prefer: impl FnMut(&Request, &Request) -> Option<bool>,
) -> Option<ReqHandle> {
    let mut iter = q.iter();
    let (mut head, mut head_req) = iter.next()?;
    for (h, r) in iter {
        let head_wins = prefer(head_req, r).unwrap_or(head_req.arrive <= r.arrive);
        if !head_wins {
            head = h;
            head_req = r;
        }
    }
    Some(head)
}

fn ready_first(a: bool, b: bool) -> Option<bool> {
    (a != b).then_some(a)
}

pub struct Fcfs;

impl Scheduler for Fcfs {
    fn get_head(&self, q: &RequestQueue, _view: &SchedView) -> Option<ReqHandle> {
        pick(q, |_, _| None)
    }
}

/// Ready requests first, then oldest.
pub struct Frfcfs;

impl Scheduler for Frfcfs {
    fn get_head(&self, q: &RequestQueue, view: &SchedView) -> Option<ReqHandle> {
        pick(q, |a, b| ready_first(view.is_ready(a), view.is_ready(b)))
    }
}

/// Like FR-FCFS, but a row that has already served `cap` hits loses its
/// readiness advantage.
pub struct FrfcfsCap {
    pub cap: u64,
}

impl Scheduler for FrfcfsCap {
    fn get_head(&self, q: &RequestQueue, view: &SchedView) -> Option<ReqHandle> {
        let ready = |r: &Request| view.is_ready(r) && view.row_table.get_hits(&r.addr_vec, false) <= self.cap;
        pick(q, |a, b| ready_first(ready(a), ready(b)))
    }
}

/// Ready row hits first. Failing that, never pick a request whose
/// precharge would close a row another queued request still hits.
pub struct FrfcfsPriorHit;

impl Scheduler for FrfcfsPriorHit {
    fn get_head(&self, q: &RequestQueue, view: &SchedView) -> Option<ReqHandle> {
        let ready_hit = |r: &Request| view.is_ready(r) && view.is_row_hit(r);
        let head = pick(q, |a, b| ready_first(ready_hit(a), ready_hit(b)))?;
        if q.get(head).is_some_and(|r| ready_hit(r)) {
            return Some(head);
        }

        let bank_end = view.channel.spec().level_index(Level::Bank) + 1;
        let hit_banks: Vec<&[i64]> = q
            .iter()
            .filter(|(_, r)| view.is_row_hit(r))
            .map(|(_, r)| &r.addr_vec[..bank_end])
            .collect();

        let mut best: Option<(ReqHandle, &Request)> = None;
        for (h, r) in q.iter() {
            let would_close_hit = !view.is_row_hit(r)
                && view.is_row_open(r)
                && hit_banks.contains(&&r.addr_vec[..bank_end]);
            if would_close_hit {
                continue;
            }
            best = match best {
                None => Some((h, r)),
                Some((bh, br)) => {
                    let keep = ready_first(view.is_ready(br), view.is_ready(r)).unwrap_or(br.arrive <= r.arrive);
                    if keep {
                        Some((bh, br))
                    } else {
                        Some((h, r))
                    }
                }
            };
        }
        best.map(|(h, _)| h)
    }
}
